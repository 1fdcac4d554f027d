//! Helpers for binary and qualified type names

/// Name used for the unnamed package
pub const DEFAULT_PACKAGE_NAME: &str = "";

/// Manifest spelling of the default package
pub const DEFAULT_PACKAGE_MARKER: &str = ".";

/// Separator between an enclosing type and its nested types in binary names
pub const NESTING_SEPARATOR: char = '$';

/// Suffix of compiled class entries
pub const CLASS_FILE_SUFFIX: &str = ".class";

/// Converts an internal binary name (`a/b/C$D`) into dotted form (`a.b.C$D`)
pub fn to_qualified(binary: &str) -> String {
    binary.replace('/', ".")
}

/// Converts a dotted name into an internal binary name
pub fn to_binary(qualified: &str) -> String {
    qualified.replace('.', "/")
}

/// Package part of a qualified name, or the default package
pub fn package_name(qualified: &str) -> &str {
    match qualified.rfind('.') {
        Some(idx) => &qualified[..idx],
        None => DEFAULT_PACKAGE_NAME,
    }
}

/// Simple name including any nesting separators (`C$D` for `a.b.C$D`)
pub fn simple_name(qualified: &str) -> &str {
    match qualified.rfind('.') {
        Some(idx) => &qualified[idx + 1..],
        None => qualified,
    }
}

/// Name of the immediately enclosing type derived from the `$` prefix
pub fn enclosing_type_name(qualified: &str) -> Option<&str> {
    let simple = simple_name(qualified);
    let idx = simple.rfind(NESTING_SEPARATOR)?;
    if idx == 0 {
        return None;
    }
    let offset = qualified.len() - simple.len();
    Some(&qualified[..offset + idx])
}

/// Outermost type of a possibly nested name (`a.b.C` for `a.b.C$D$E`)
pub fn root_type_name(qualified: &str) -> &str {
    let simple = simple_name(qualified);
    match simple.find(NESTING_SEPARATOR) {
        Some(idx) if idx > 0 => &qualified[..qualified.len() - simple.len() + idx],
        _ => qualified,
    }
}

/// Last segment after the nesting separator (`E` for `a.b.C$D$E`)
pub fn member_simple_name(qualified: &str) -> &str {
    let simple = simple_name(qualified);
    match simple.rfind(NESTING_SEPARATOR) {
        Some(idx) if idx > 0 => &simple[idx + 1..],
        _ => simple,
    }
}

/// Maps the manifest default-package marker to the package name used internally
pub fn normalize_package(name: &str) -> &str {
    if name == DEFAULT_PACKAGE_MARKER {
        DEFAULT_PACKAGE_NAME
    } else {
        name
    }
}

/// Qualified type name for a class entry path such as `a/b/C.class`
pub fn type_name_from_entry(entry: &str) -> Option<String> {
    let stem = entry.strip_suffix(CLASS_FILE_SUFFIX)?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(to_qualified(stem.trim_start_matches('/')))
}

/// Class entry path for a qualified type name
pub fn entry_from_type_name(qualified: &str) -> String {
    format!("{}{}", to_binary(qualified), CLASS_FILE_SUFFIX)
}
