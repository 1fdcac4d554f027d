use tracing::warn;

use super::annotation::{self, POLYMORPHIC_SIGNATURE};
use super::constant_pool::ConstantPool;
use super::error::ClassFileError;
use super::reader::ClassReader;
use crate::flags::Modifiers;
use crate::model::{Field, Method, Nesting, Type, TypeOrigin};
use crate::naming;

/// Builds [`Type`] structures from class-file bytes in a single forward pass
///
/// Only the structure is decoded: header, fields, methods and the nesting
/// attributes. Method bodies are skipped. Attributes that are not needed
/// are skipped by length, so newer class-file versions still decode.
pub struct StructureBuilder;

impl StructureBuilder {
    /// Builds a type, logging and swallowing malformed input
    pub fn build(bytes: &[u8], origin: TypeOrigin) -> Option<Type> {
        let module = origin.module_id().to_string();
        match Self::try_build(bytes, origin) {
            Ok(ty) => Some(ty),
            Err(e) => {
                warn!("Skipping malformed class file in {}: {}", module, e);
                None
            }
        }
    }

    pub fn try_build(bytes: &[u8], origin: TypeOrigin) -> Result<Type, ClassFileError> {
        let mut reader = ClassReader::new(bytes);
        reader.expect_magic()?;
        reader.skip(4)?; // minor, major
        let pool = ConstantPool::parse(&mut reader)?;

        let access = reader.read_u2()?;
        let this_binary = pool.class_name(reader.read_u2()?)?.to_string();
        let superclass = pool
            .optional_class_name(reader.read_u2()?)?
            .map(naming::to_qualified);

        let mut ty = Type::new(
            naming::to_qualified(&this_binary),
            Modifiers::from_access(access),
            origin,
        );
        ty.set_superclass(superclass);

        let interfaces = reader.read_u2()?;
        for _ in 0..interfaces {
            let name = pool.class_name(reader.read_u2()?)?;
            ty.add_interface(naming::to_qualified(name));
        }

        let fields = reader.read_u2()?;
        for _ in 0..fields {
            ty.add_field(read_field(&mut reader, &pool)?);
        }

        let methods = reader.read_u2()?;
        for _ in 0..methods {
            ty.add_method(read_method(&mut reader, &pool)?);
        }

        let attributes = reader.read_u2()?;
        for _ in 0..attributes {
            let (name_index, body) = reader.read_attribute()?;
            match pool.utf8(name_index)? {
                "Signature" => {
                    let signature = read_signature(body, &pool)?;
                    ty.set_generic_signature(Some(signature));
                }
                "Deprecated" => ty.add_modifiers(Modifiers::DEPRECATED),
                "InnerClasses" => read_inner_classes(&mut ty, &this_binary, body, &pool)?,
                "EnclosingMethod" => read_enclosing_method(&mut ty, body, &pool)?,
                _ => {}
            }
        }

        Ok(ty)
    }
}

fn read_signature(body: &[u8], pool: &ConstantPool) -> Result<String, ClassFileError> {
    let mut reader = ClassReader::new(body);
    Ok(pool.utf8(reader.read_u2()?)?.to_string())
}

fn read_field(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> Result<Field, ClassFileError> {
    let mut modifiers = Modifiers::from_access(reader.read_u2()?);
    let name = pool.utf8(reader.read_u2()?)?;
    let descriptor = pool.utf8(reader.read_u2()?)?;

    let mut signature = None;
    let mut constant = None;
    let attributes = reader.read_u2()?;
    for _ in 0..attributes {
        let (name_index, body) = reader.read_attribute()?;
        match pool.utf8(name_index)? {
            "ConstantValue" => {
                let mut value = ClassReader::new(body);
                constant = Some(pool.constant_value(value.read_u2()?)?);
            }
            "Signature" => signature = Some(read_signature(body, pool)?),
            "Deprecated" => modifiers |= Modifiers::DEPRECATED,
            _ => {}
        }
    }

    Ok(Field::new(name, descriptor, modifiers)
        .with_generic_signature(signature)
        .with_constant_value(constant))
}

fn read_method(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> Result<Method, ClassFileError> {
    let mut modifiers = Modifiers::from_access(reader.read_u2()?);
    let name = pool.utf8(reader.read_u2()?)?;
    let descriptor = pool.utf8(reader.read_u2()?)?;

    let mut signature = None;
    let mut exceptions = Vec::new();
    let mut default_value = None;
    let mut polymorphic = false;
    let attributes = reader.read_u2()?;
    for _ in 0..attributes {
        let (name_index, body) = reader.read_attribute()?;
        match pool.utf8(name_index)? {
            "Signature" => signature = Some(read_signature(body, pool)?),
            "Deprecated" => modifiers |= Modifiers::DEPRECATED,
            "Exceptions" => {
                let mut list = ClassReader::new(body);
                let count = list.read_u2()?;
                for _ in 0..count {
                    exceptions.push(naming::to_qualified(pool.class_name(list.read_u2()?)?));
                }
            }
            "AnnotationDefault" => default_value = Some(annotation::default_value(body, pool)?),
            "RuntimeVisibleAnnotations" => {
                polymorphic |= annotation::annotation_types(body, pool)?
                    .iter()
                    .any(|descriptor| descriptor == POLYMORPHIC_SIGNATURE);
            }
            _ => {}
        }
    }

    let mut method = Method::new(name, descriptor, modifiers)
        .with_generic_signature(signature)
        .with_exceptions(exceptions);
    method.set_default_value(default_value);
    method.set_polymorphic(polymorphic);
    Ok(method)
}

fn read_inner_classes(
    ty: &mut Type,
    this_binary: &str,
    body: &[u8],
    pool: &ConstantPool,
) -> Result<(), ClassFileError> {
    let mut reader = ClassReader::new(body);
    let count = reader.read_u2()?;
    for _ in 0..count {
        let inner = pool.class_name(reader.read_u2()?)?;
        let outer = pool.optional_class_name(reader.read_u2()?)?;
        let simple = pool.optional_utf8(reader.read_u2()?)?;
        let access = Modifiers::from_access(reader.read_u2()?);

        if inner == this_binary {
            match (outer, simple) {
                (_, None) => ty.set_nesting(Nesting::Anonymous),
                (None, Some(simple)) => {
                    ty.set_nesting(Nesting::Local);
                    ty.set_local_simple_name(simple.to_string());
                }
                (Some(outer), Some(_)) => {
                    ty.set_nesting(Nesting::Member);
                    ty.set_enclosing_type(naming::to_qualified(outer));
                    // nested access flags carry visibility the class header cannot
                    ty.add_modifiers(
                        access & (Modifiers::STATIC | Modifiers::PRIVATE | Modifiers::PROTECTED),
                    );
                }
            }
        } else if outer == Some(this_binary) {
            let simple = match simple {
                Some(simple) => simple,
                None => naming::member_simple_name(inner),
            };
            ty.add_member_type(simple.to_string());
        }
    }
    Ok(())
}

fn read_enclosing_method(
    ty: &mut Type,
    body: &[u8],
    pool: &ConstantPool,
) -> Result<(), ClassFileError> {
    let mut reader = ClassReader::new(body);
    let class = pool.class_name(reader.read_u2()?)?;
    ty.set_enclosing_type(naming::to_qualified(class));
    let method_index = reader.read_u2()?;
    if method_index != 0 {
        ty.set_enclosing_method(pool.name_and_type(method_index)?);
    }
    Ok(())
}
