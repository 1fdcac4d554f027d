//! Text and JSON renderings of a type structure

use std::fmt::Write;

use apiscope_core::{Nesting, Type};
use serde_json::{json, Value};

fn nesting_label(nesting: Nesting) -> &'static str {
    match nesting {
        Nesting::TopLevel => "top-level",
        Nesting::Member => "member",
        Nesting::Local => "local",
        Nesting::Anonymous => "anonymous",
    }
}

pub fn type_text(ty: &Type) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", ty.name(), nesting_label(ty.nesting()));
    let _ = writeln!(out, "  modifiers: {:?}", ty.modifiers());
    if let Some(signature) = ty.generic_signature() {
        let _ = writeln!(out, "  signature: {}", signature);
    }
    if let Some(superclass) = ty.superclass_name() {
        let _ = writeln!(out, "  extends {}", superclass);
    }
    for interface in ty.interface_names() {
        let _ = writeln!(out, "  implements {}", interface);
    }
    if let Some(enclosing) = ty.enclosing_type_name() {
        let _ = writeln!(out, "  enclosed by {}", enclosing);
    }

    for field in ty.fields() {
        let _ = write!(out, "  field {} {}", field.name(), field.descriptor());
        if let Some(value) = field.constant_value() {
            let _ = write!(out, " = {}", value);
        }
        out.push('\n');
    }
    for method in ty.methods() {
        let _ = write!(out, "  method {}{}", method.name(), method.descriptor());
        if !method.exceptions().is_empty() {
            let _ = write!(out, " throws {}", method.exceptions().join(", "));
        }
        if let Some(default) = method.default_value() {
            let _ = write!(out, " default {}", default);
        }
        out.push('\n');
    }
    for member in ty.member_type_names() {
        let _ = writeln!(out, "  member {}", member);
    }
    out
}

pub fn type_json(ty: &Type) -> Value {
    json!({
        "name": ty.name(),
        "module": ty.module_id(),
        "nesting": nesting_label(ty.nesting()),
        "modifiers": ty.modifiers().bits(),
        "signature": ty.generic_signature(),
        "superclass": ty.superclass_name(),
        "interfaces": ty.interface_names().collect::<Vec<_>>(),
        "enclosing_type": ty.enclosing_type_name(),
        "fields": ty.fields().map(|field| json!({
            "name": field.name(),
            "descriptor": field.descriptor(),
            "modifiers": field.modifiers().bits(),
            "signature": field.generic_signature(),
            "constant": field.constant_value().map(|v| v.to_string()),
        })).collect::<Vec<_>>(),
        "methods": ty.methods().map(|method| json!({
            "name": method.name(),
            "descriptor": method.descriptor(),
            "modifiers": method.modifiers().bits(),
            "signature": method.generic_signature(),
            "exceptions": method.exceptions(),
            "default": method.default_value(),
        })).collect::<Vec<_>>(),
        "member_types": ty.member_type_names().collect::<Vec<_>>(),
    })
}
