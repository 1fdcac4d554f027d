//! Minimal class-file writer
//!
//! Produces structurally valid class files with just the attributes the
//! decoder reads. Bytecode is never verified, so method bodies only need to
//! contain the instructions a test wants to observe.

use std::collections::HashMap;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_ANNOTATION: u16 = 0x2000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Int(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(String),
    String(String),
    NameAndType(String, String),
    Member(u8, String, String, String),
}

struct PoolWriter {
    bytes: Vec<u8>,
    next: u16,
    indices: HashMap<PoolKey, u16>,
}

impl PoolWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            next: 1,
            indices: HashMap::new(),
        }
    }

    fn intern(&mut self, key: PoolKey) -> u16 {
        if let Some(index) = self.indices.get(&key) {
            return *index;
        }
        let mut entry = Vec::new();
        let mut slots = 1;
        match &key {
            PoolKey::Utf8(s) => {
                entry.push(1);
                let encoded = encode_modified_utf8(s);
                entry.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
                entry.extend_from_slice(&encoded);
            }
            PoolKey::Int(v) => {
                entry.push(3);
                entry.extend_from_slice(&v.to_be_bytes());
            }
            PoolKey::Float(bits) => {
                entry.push(4);
                entry.extend_from_slice(&bits.to_be_bytes());
            }
            PoolKey::Long(v) => {
                entry.push(5);
                entry.extend_from_slice(&v.to_be_bytes());
                slots = 2;
            }
            PoolKey::Double(bits) => {
                entry.push(6);
                entry.extend_from_slice(&bits.to_be_bytes());
                slots = 2;
            }
            PoolKey::Class(name) => {
                let name_index = self.utf8(name);
                entry.push(7);
                entry.extend_from_slice(&name_index.to_be_bytes());
            }
            PoolKey::String(value) => {
                let value_index = self.utf8(value);
                entry.push(8);
                entry.extend_from_slice(&value_index.to_be_bytes());
            }
            PoolKey::NameAndType(name, descriptor) => {
                let name_index = self.utf8(name);
                let descriptor_index = self.utf8(descriptor);
                entry.push(12);
                entry.extend_from_slice(&name_index.to_be_bytes());
                entry.extend_from_slice(&descriptor_index.to_be_bytes());
            }
            PoolKey::Member(tag, owner, name, descriptor) => {
                let class_index = self.class(owner);
                let nat_index = self.intern(PoolKey::NameAndType(name.clone(), descriptor.clone()));
                entry.push(*tag);
                entry.extend_from_slice(&class_index.to_be_bytes());
                entry.extend_from_slice(&nat_index.to_be_bytes());
            }
        }
        let index = self.next;
        self.next += slots;
        self.bytes.extend_from_slice(&entry);
        self.indices.insert(key, index);
        index
    }

    fn utf8(&mut self, s: &str) -> u16 {
        self.intern(PoolKey::Utf8(s.to_string()))
    }

    fn class(&mut self, name: &str) -> u16 {
        self.intern(PoolKey::Class(name.to_string()))
    }
}

fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Field constant values
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

/// Annotation element values for `AnnotationDefault`
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Int(i32),
    Boolean(bool),
    Char(char),
    Long(i64),
    String(String),
    Enum { descriptor: String, constant: String },
    Class(String),
    Annotation(String),
    Array(Vec<ElementValue>),
}

/// Instructions understood by the writer
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Nop,
    AloadZero,
    Dup,
    Pop,
    Return,
    New(String),
    CheckCast(String),
    InstanceOf(String),
    ANewArray(String),
    LdcClass(String),
    LdcString(String),
    GetStatic { owner: String, name: String, descriptor: String },
    InvokeSpecial { owner: String, name: String, descriptor: String },
    InvokeVirtual { owner: String, name: String, descriptor: String },
    InvokeStatic { owner: String, name: String, descriptor: String },
    /// `tableswitch` with every target pointing at the next instruction
    TableSwitch { low: i32, high: i32 },
    /// `lookupswitch` with every target pointing at the next instruction
    LookupSwitch { keys: Vec<i32> },
    /// `wide iinc`
    WideIinc { local: u16, delta: i16 },
}

impl Insn {
    pub fn invoke_special(owner: &str, name: &str, descriptor: &str) -> Self {
        Self::InvokeSpecial {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn invoke_virtual(owner: &str, name: &str, descriptor: &str) -> Self {
        Self::InvokeVirtual {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// A field to write
#[derive(Debug, Clone, Default)]
pub struct FieldSpec {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub signature: Option<String>,
    pub constant: Option<Constant>,
    pub deprecated: bool,
}

impl FieldSpec {
    pub fn new(name: &str, descriptor: &str, access: u16) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access,
            ..Default::default()
        }
    }

    pub fn constant(mut self, value: Constant) -> Self {
        self.constant = Some(value);
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}

/// A method to write
#[derive(Debug, Clone, Default)]
pub struct MethodSpec {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub code: Option<Vec<Insn>>,
    /// `(instruction index, source line)`
    pub lines: Vec<(usize, u16)>,
    pub annotation_default: Option<ElementValue>,
    pub visible_annotations: Vec<String>,
    pub deprecated: bool,
}

impl MethodSpec {
    pub fn new(name: &str, descriptor: &str, access: u16) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access,
            ..Default::default()
        }
    }

    pub fn code(mut self, code: Vec<Insn>) -> Self {
        self.code = Some(code);
        self
    }

    pub fn lines(mut self, lines: Vec<(usize, u16)>) -> Self {
        self.lines = lines;
        self
    }

    pub fn throws(mut self, exception: &str) -> Self {
        self.exceptions.push(exception.into());
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn default_value(mut self, value: ElementValue) -> Self {
        self.annotation_default = Some(value);
        self
    }

    pub fn annotated(mut self, descriptor: &str) -> Self {
        self.visible_annotations.push(descriptor.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}

#[derive(Debug, Clone)]
struct InnerClass {
    inner: String,
    outer: Option<String>,
    simple: Option<String>,
    access: u16,
}

/// Builder for one class file
#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    name: String,
    access: u16,
    superclass: Option<String>,
    interfaces: Vec<String>,
    signature: Option<String>,
    deprecated: bool,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
    inner_classes: Vec<InnerClass>,
    enclosing_method: Option<(String, Option<(String, String)>)>,
    unknown_attribute: bool,
}

impl ClassFileBuilder {
    /// Starts a public class with internal name `name` extending `java/lang/Object`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            access: ACC_PUBLIC | ACC_SUPER,
            superclass: Some("java/lang/Object".into()),
            interfaces: Vec::new(),
            signature: None,
            deprecated: false,
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            enclosing_method: None,
            unknown_attribute: false,
        }
    }

    /// Internal name such as `com/x/A`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn superclass(mut self, superclass: Option<&str>) -> Self {
        self.superclass = superclass.map(str::to_string);
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    /// Adds an `InnerClasses` record
    pub fn inner_class(
        mut self,
        inner: &str,
        outer: Option<&str>,
        simple: Option<&str>,
        access: u16,
    ) -> Self {
        self.inner_classes.push(InnerClass {
            inner: inner.into(),
            outer: outer.map(str::to_string),
            simple: simple.map(str::to_string),
            access,
        });
        self
    }

    /// Adds an `EnclosingMethod` record
    pub fn enclosing_method(mut self, class: &str, method: Option<(&str, &str)>) -> Self {
        self.enclosing_method = Some((
            class.into(),
            method.map(|(n, d)| (n.to_string(), d.to_string())),
        ));
        self
    }

    /// Adds an attribute the decoder does not know about
    pub fn unknown_attribute(mut self) -> Self {
        self.unknown_attribute = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolWriter::new();
        let mut body = Vec::new();

        let this_index = pool.class(&self.name);
        let super_index = self.superclass.as_deref().map(|s| pool.class(s)).unwrap_or(0);
        put_u2(&mut body, self.access);
        put_u2(&mut body, this_index);
        put_u2(&mut body, super_index);
        put_u2(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            let index = pool.class(interface);
            put_u2(&mut body, index);
        }

        put_u2(&mut body, self.fields.len() as u16);
        for field in &self.fields {
            write_field(&mut pool, &mut body, field);
        }

        put_u2(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            write_method(&mut pool, &mut body, method);
        }

        let mut attributes: Vec<(u16, Vec<u8>)> = Vec::new();
        if let Some(signature) = &self.signature {
            let index = pool.utf8(signature);
            attributes.push((pool.utf8("Signature"), index.to_be_bytes().to_vec()));
        }
        if self.deprecated {
            attributes.push((pool.utf8("Deprecated"), Vec::new()));
        }
        if !self.inner_classes.is_empty() {
            let mut data = Vec::new();
            put_u2(&mut data, self.inner_classes.len() as u16);
            for record in &self.inner_classes {
                let inner = pool.class(&record.inner);
                let outer = record.outer.as_deref().map(|o| pool.class(o)).unwrap_or(0);
                let simple = record.simple.as_deref().map(|s| pool.utf8(s)).unwrap_or(0);
                put_u2(&mut data, inner);
                put_u2(&mut data, outer);
                put_u2(&mut data, simple);
                put_u2(&mut data, record.access);
            }
            attributes.push((pool.utf8("InnerClasses"), data));
        }
        if let Some((class, method)) = &self.enclosing_method {
            let mut data = Vec::new();
            let class_index = pool.class(class);
            let method_index = method
                .as_ref()
                .map(|(n, d)| pool.intern(PoolKey::NameAndType(n.clone(), d.clone())))
                .unwrap_or(0);
            put_u2(&mut data, class_index);
            put_u2(&mut data, method_index);
            attributes.push((pool.utf8("EnclosingMethod"), data));
        }
        if self.unknown_attribute {
            attributes.push((pool.utf8("com.example.FutureAttribute"), vec![1, 2, 3, 4, 5]));
        }
        write_attributes(&mut body, &attributes);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        put_u2(&mut out, 0); // minor
        put_u2(&mut out, 52); // major
        put_u2(&mut out, pool.next);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[(u16, Vec<u8>)]) {
    put_u2(out, attributes.len() as u16);
    for (name, data) in attributes {
        put_u2(out, *name);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
    }
}

fn write_field(pool: &mut PoolWriter, out: &mut Vec<u8>, field: &FieldSpec) {
    put_u2(out, field.access);
    let name = pool.utf8(&field.name);
    let descriptor = pool.utf8(&field.descriptor);
    put_u2(out, name);
    put_u2(out, descriptor);

    let mut attributes = Vec::new();
    if let Some(constant) = &field.constant {
        let index = match constant {
            Constant::Int(v) => pool.intern(PoolKey::Int(*v)),
            Constant::Long(v) => pool.intern(PoolKey::Long(*v)),
            Constant::Float(v) => pool.intern(PoolKey::Float(v.to_bits())),
            Constant::Double(v) => pool.intern(PoolKey::Double(v.to_bits())),
            Constant::String(v) => pool.intern(PoolKey::String(v.clone())),
        };
        attributes.push((pool.utf8("ConstantValue"), index.to_be_bytes().to_vec()));
    }
    if let Some(signature) = &field.signature {
        let index = pool.utf8(signature);
        attributes.push((pool.utf8("Signature"), index.to_be_bytes().to_vec()));
    }
    if field.deprecated {
        attributes.push((pool.utf8("Deprecated"), Vec::new()));
    }
    write_attributes(out, &attributes);
}

fn write_method(pool: &mut PoolWriter, out: &mut Vec<u8>, method: &MethodSpec) {
    put_u2(out, method.access);
    let name = pool.utf8(&method.name);
    let descriptor = pool.utf8(&method.descriptor);
    put_u2(out, name);
    put_u2(out, descriptor);

    let mut attributes = Vec::new();
    if let Some(code) = &method.code {
        let data = write_code(pool, code, &method.lines);
        attributes.push((pool.utf8("Code"), data));
    }
    if !method.exceptions.is_empty() {
        let mut data = Vec::new();
        put_u2(&mut data, method.exceptions.len() as u16);
        for exception in &method.exceptions {
            let index = pool.class(exception);
            put_u2(&mut data, index);
        }
        attributes.push((pool.utf8("Exceptions"), data));
    }
    if let Some(signature) = &method.signature {
        let index = pool.utf8(signature);
        attributes.push((pool.utf8("Signature"), index.to_be_bytes().to_vec()));
    }
    if let Some(value) = &method.annotation_default {
        let mut data = Vec::new();
        write_element_value(pool, &mut data, value);
        attributes.push((pool.utf8("AnnotationDefault"), data));
    }
    if !method.visible_annotations.is_empty() {
        let mut data = Vec::new();
        put_u2(&mut data, method.visible_annotations.len() as u16);
        for descriptor in &method.visible_annotations {
            let index = pool.utf8(descriptor);
            put_u2(&mut data, index);
            put_u2(&mut data, 0);
        }
        attributes.push((pool.utf8("RuntimeVisibleAnnotations"), data));
    }
    if method.deprecated {
        attributes.push((pool.utf8("Deprecated"), Vec::new()));
    }
    write_attributes(out, &attributes);
}

fn write_element_value(pool: &mut PoolWriter, out: &mut Vec<u8>, value: &ElementValue) {
    match value {
        ElementValue::Int(v) => {
            out.push(b'I');
            put_u2(out, pool.intern(PoolKey::Int(*v)));
        }
        ElementValue::Boolean(v) => {
            out.push(b'Z');
            put_u2(out, pool.intern(PoolKey::Int(i32::from(*v))));
        }
        ElementValue::Char(v) => {
            out.push(b'C');
            put_u2(out, pool.intern(PoolKey::Int(*v as i32)));
        }
        ElementValue::Long(v) => {
            out.push(b'J');
            put_u2(out, pool.intern(PoolKey::Long(*v)));
        }
        ElementValue::String(v) => {
            out.push(b's');
            put_u2(out, pool.utf8(v));
        }
        ElementValue::Enum {
            descriptor,
            constant,
        } => {
            out.push(b'e');
            put_u2(out, pool.utf8(descriptor));
            put_u2(out, pool.utf8(constant));
        }
        ElementValue::Class(descriptor) => {
            out.push(b'c');
            put_u2(out, pool.utf8(descriptor));
        }
        ElementValue::Annotation(descriptor) => {
            out.push(b'@');
            put_u2(out, pool.utf8(descriptor));
            put_u2(out, 0);
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            put_u2(out, values.len() as u16);
            for value in values {
                write_element_value(pool, out, value);
            }
        }
    }
}

fn write_code(pool: &mut PoolWriter, code: &[Insn], lines: &[(usize, u16)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut offsets = Vec::with_capacity(code.len());
    for insn in code {
        let pc = bytes.len();
        offsets.push(pc);
        match insn {
            Insn::Nop => bytes.push(0x00),
            Insn::AloadZero => bytes.push(0x2a),
            Insn::Dup => bytes.push(0x59),
            Insn::Pop => bytes.push(0x57),
            Insn::Return => bytes.push(0xb1),
            Insn::New(class) => type_insn(pool, &mut bytes, 0xbb, class),
            Insn::CheckCast(class) => type_insn(pool, &mut bytes, 0xc0, class),
            Insn::InstanceOf(class) => type_insn(pool, &mut bytes, 0xc1, class),
            Insn::ANewArray(class) => type_insn(pool, &mut bytes, 0xbd, class),
            Insn::LdcClass(class) => {
                let index = pool.class(class);
                bytes.push(0x13);
                put_u2(&mut bytes, index);
            }
            Insn::LdcString(value) => {
                let index = pool.intern(PoolKey::String(value.clone()));
                bytes.push(0x13);
                put_u2(&mut bytes, index);
            }
            Insn::GetStatic {
                owner,
                name,
                descriptor,
            } => member_insn(pool, &mut bytes, 0xb2, 9, owner, name, descriptor),
            Insn::InvokeVirtual {
                owner,
                name,
                descriptor,
            } => member_insn(pool, &mut bytes, 0xb6, 10, owner, name, descriptor),
            Insn::InvokeSpecial {
                owner,
                name,
                descriptor,
            } => member_insn(pool, &mut bytes, 0xb7, 10, owner, name, descriptor),
            Insn::InvokeStatic {
                owner,
                name,
                descriptor,
            } => member_insn(pool, &mut bytes, 0xb8, 10, owner, name, descriptor),
            Insn::TableSwitch { low, high } => {
                bytes.push(0xaa);
                pad(&mut bytes);
                let entries = (high - low + 1).max(0) as usize;
                let next = switch_length(pc, 12 + entries * 4) as i32;
                bytes.extend_from_slice(&next.to_be_bytes());
                bytes.extend_from_slice(&low.to_be_bytes());
                bytes.extend_from_slice(&high.to_be_bytes());
                for _ in 0..entries {
                    bytes.extend_from_slice(&next.to_be_bytes());
                }
            }
            Insn::LookupSwitch { keys } => {
                bytes.push(0xab);
                pad(&mut bytes);
                let next = switch_length(pc, 8 + keys.len() * 8) as i32;
                bytes.extend_from_slice(&next.to_be_bytes());
                bytes.extend_from_slice(&(keys.len() as i32).to_be_bytes());
                for key in keys {
                    bytes.extend_from_slice(&key.to_be_bytes());
                    bytes.extend_from_slice(&next.to_be_bytes());
                }
            }
            Insn::WideIinc { local, delta } => {
                bytes.push(0xc4);
                bytes.push(0x84);
                put_u2(&mut bytes, *local);
                bytes.extend_from_slice(&delta.to_be_bytes());
            }
        }
    }

    let mut data = Vec::new();
    put_u2(&mut data, 8); // max_stack
    put_u2(&mut data, 8); // max_locals
    data.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    data.extend_from_slice(&bytes);
    put_u2(&mut data, 0); // exception table

    let mut attributes = Vec::new();
    if !lines.is_empty() {
        let mut table = Vec::new();
        put_u2(&mut table, lines.len() as u16);
        for (insn, line) in lines {
            let pc = offsets.get(*insn).copied().unwrap_or(0);
            put_u2(&mut table, pc as u16);
            put_u2(&mut table, *line);
        }
        attributes.push((pool.utf8("LineNumberTable"), table));
    }
    write_attributes(&mut data, &attributes);
    data
}

fn type_insn(pool: &mut PoolWriter, bytes: &mut Vec<u8>, opcode: u8, class: &str) {
    let index = pool.class(class);
    bytes.push(opcode);
    put_u2(bytes, index);
}

fn member_insn(
    pool: &mut PoolWriter,
    bytes: &mut Vec<u8>,
    opcode: u8,
    tag: u8,
    owner: &str,
    name: &str,
    descriptor: &str,
) {
    let index = pool.intern(PoolKey::Member(
        tag,
        owner.to_string(),
        name.to_string(),
        descriptor.to_string(),
    ));
    bytes.push(opcode);
    put_u2(bytes, index);
}

fn pad(bytes: &mut Vec<u8>) {
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
}

/// Offset from a switch opcode to the instruction after its operands
fn switch_length(pc: usize, operands: usize) -> usize {
    1 + (4 - (pc + 1) % 4) % 4 + operands
}
