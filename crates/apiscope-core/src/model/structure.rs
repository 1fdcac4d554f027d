use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::member::{Field, Method, MethodKey};
use super::origin::{TypeOrigin, TypeResolver};
use crate::classfile::enclosing;
use crate::error::CoreError;
use crate::flags::Modifiers;
use crate::naming;

/// How a type is nested inside another type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Nesting {
    #[default]
    TopLevel,
    Member,
    Local,
    Anonymous,
}

/// Structural description of one compiled class
///
/// Member types and the enclosing type are held by name and resolved on
/// demand through the originating module, so building one type never reads
/// its siblings.
pub struct Type {
    name: String,
    modifiers: Modifiers,
    generic_signature: Option<String>,
    superclass: Option<String>,
    interfaces: IndexSet<String>,
    fields: IndexMap<String, Field>,
    methods: IndexMap<MethodKey, Method>,
    member_types: IndexSet<String>,
    nesting: Nesting,
    local_simple_name: Option<String>,
    enclosing_type: Option<String>,
    enclosing_method: OnceLock<Option<MethodKey>>,
    origin: TypeOrigin,
}

impl Type {
    pub fn new(name: impl Into<String>, modifiers: Modifiers, origin: TypeOrigin) -> Self {
        let name = name.into();
        let enclosing_type = naming::enclosing_type_name(&name).map(str::to_string);
        Self {
            name,
            modifiers,
            generic_signature: None,
            superclass: None,
            interfaces: IndexSet::new(),
            fields: IndexMap::new(),
            methods: IndexMap::new(),
            member_types: IndexSet::new(),
            nesting: Nesting::TopLevel,
            local_simple_name: None,
            enclosing_type,
            enclosing_method: OnceLock::new(),
            origin,
        }
    }

    pub(crate) fn set_generic_signature(&mut self, signature: Option<String>) {
        self.generic_signature = signature;
    }

    pub(crate) fn set_superclass(&mut self, superclass: Option<String>) {
        self.superclass = superclass;
    }

    pub(crate) fn add_interface(&mut self, name: String) {
        self.interfaces.insert(name);
    }

    pub(crate) fn add_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers |= modifiers;
    }

    pub(crate) fn set_nesting(&mut self, nesting: Nesting) {
        self.nesting = nesting;
    }

    pub(crate) fn set_local_simple_name(&mut self, name: String) {
        self.local_simple_name = Some(name);
    }

    pub(crate) fn set_enclosing_type(&mut self, name: String) {
        self.enclosing_type = Some(name);
    }

    pub(crate) fn set_enclosing_method(&mut self, key: MethodKey) {
        let _ = self.enclosing_method.set(Some(key));
    }

    pub(crate) fn add_member_type(&mut self, simple_name: String) {
        self.member_types.insert(simple_name);
    }

    /// Adds a field. A later field with the same name replaces the earlier one.
    pub fn add_field(&mut self, field: Field) {
        self.fields.insert(field.name().to_string(), field);
    }

    pub fn add_method(&mut self, method: Method) {
        self.methods.insert(method.key().clone(), method);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package_name(&self) -> &str {
        naming::package_name(&self.name)
    }

    /// Simple name, or the source-level name recorded for a local type
    pub fn simple_name(&self) -> &str {
        match &self.local_simple_name {
            Some(name) => name,
            None => naming::member_simple_name(&self.name),
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn generic_signature(&self) -> Option<&str> {
        self.generic_signature.as_deref()
    }

    pub fn superclass_name(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    pub fn interface_names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.iter().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods.get(&MethodKey::new(name, descriptor))
    }

    pub fn method_mut(&mut self, key: &MethodKey) -> Option<&mut Method> {
        self.methods.get_mut(key)
    }

    /// Simple names of the declared member types
    pub fn member_type_names(&self) -> impl Iterator<Item = &str> {
        self.member_types.iter().map(String::as_str)
    }

    pub fn nesting(&self) -> Nesting {
        self.nesting
    }

    pub fn is_member(&self) -> bool {
        self.nesting == Nesting::Member
    }

    pub fn is_local(&self) -> bool {
        self.nesting == Nesting::Local
    }

    pub fn is_anonymous(&self) -> bool {
        self.nesting == Nesting::Anonymous
    }

    pub fn enclosing_type_name(&self) -> Option<&str> {
        self.enclosing_type.as_deref()
    }

    pub fn origin(&self) -> &TypeOrigin {
        &self.origin
    }

    pub fn module_id(&self) -> &str {
        self.origin.module_id()
    }

    fn resolver(&self) -> Result<Arc<dyn TypeResolver>, CoreError> {
        self.origin.resolver().ok_or_else(|| CoreError::Resolution {
            from: self.name.clone(),
            reference: format!("module {}", self.origin.module_id()),
        })
    }

    fn resolve(&self, reference: &str) -> Result<Arc<Type>, CoreError> {
        self.resolver()?
            .find_type(reference)?
            .ok_or_else(|| CoreError::Resolution {
                from: self.name.clone(),
                reference: reference.to_string(),
            })
    }

    /// Resolves the superclass. `Ok(None)` for types without one.
    pub fn superclass_type(&self) -> Result<Option<Arc<Type>>, CoreError> {
        match &self.superclass {
            Some(name) => self.resolve(name).map(Some),
            None => Ok(None),
        }
    }

    pub fn interface_types(&self) -> Result<Vec<Arc<Type>>, CoreError> {
        self.interfaces.iter().map(|name| self.resolve(name)).collect()
    }

    /// Resolves one declared member type by simple name
    pub fn member_type(&self, simple_name: &str) -> Result<Option<Arc<Type>>, CoreError> {
        if !self.member_types.contains(simple_name) {
            return Ok(None);
        }
        let qualified = format!("{}{}{}", self.name, naming::NESTING_SEPARATOR, simple_name);
        self.resolver()?.find_type(&qualified)
    }

    /// Resolves every declared member type that can be found
    pub fn member_types(&self) -> Result<Vec<Arc<Type>>, CoreError> {
        let mut found = Vec::with_capacity(self.member_types.len());
        for simple in &self.member_types {
            match self.member_type(simple)? {
                Some(member) => found.push(member),
                None => debug!("Member type {} of {} not found", simple, self.name),
            }
        }
        Ok(found)
    }

    /// Resolves the immediately enclosing type of a nested type
    pub fn enclosing_type(&self) -> Result<Option<Arc<Type>>, CoreError> {
        match &self.enclosing_type {
            Some(name) => self.resolve(name).map(Some),
            None => Ok(None),
        }
    }

    /// Key of the method declaring this local or anonymous type
    ///
    /// When the class file does not name the method, the enclosing type's
    /// bytes are scanned for the first method referencing this type. This is
    /// a heuristic: constructors only match when the reference lies within
    /// the constructor's own line range.
    pub fn enclosing_method_key(&self) -> Result<Option<MethodKey>, CoreError> {
        if let Some(known) = self.enclosing_method.get() {
            return Ok(known.clone());
        }
        if !matches!(self.nesting, Nesting::Local | Nesting::Anonymous) {
            return Ok(None);
        }
        let Some(enclosing) = &self.enclosing_type else {
            return Ok(None);
        };

        let Some(bytes) = self.resolver()?.class_bytes(enclosing)? else {
            return Err(CoreError::Resolution {
                from: self.name.clone(),
                reference: enclosing.clone(),
            });
        };
        let key = match enclosing::find_enclosing_method(&bytes, &naming::to_binary(&self.name)) {
            Ok(key) => key,
            Err(e) => {
                debug!("Unable to scan {} for the method enclosing {}: {}", enclosing, self.name, e);
                None
            }
        };
        let _ = self.enclosing_method.set(key);
        Ok(self.enclosing_method.get().cloned().flatten())
    }

    /// Resolves the method declaring this local or anonymous type
    pub fn enclosing_method(&self) -> Result<Option<Method>, CoreError> {
        let Some(key) = self.enclosing_method_key()? else {
            return Ok(None);
        };
        let Some(enclosing) = self.enclosing_type()? else {
            return Ok(None);
        };
        Ok(enclosing.method(&key.name, &key.descriptor).cloned())
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.origin.module_id() == other.origin.module_id()
            && self.origin.version() == other.origin.version()
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.origin.module_id().hash(state);
        self.origin.version().hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("name", &self.name)
            .field("module", &self.origin.module_id())
            .field("nesting", &self.nesting)
            .field("superclass", &self.superclass)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_is_module_and_name() {
        let a = Type::new("com.x.A", Modifiers::PUBLIC, TypeOrigin::new("b", "m1"));
        let mut b = Type::new("com.x.A", Modifiers::empty(), TypeOrigin::new("other", "m1"));
        b.add_field(Field::new("f", "I", Modifiers::PRIVATE));
        let c = Type::new("com.x.A", Modifiers::PUBLIC, TypeOrigin::new("b", "m2"));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Type> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_derived_names() {
        let t = Type::new("com.x.Outer$Inner", Modifiers::PUBLIC, TypeOrigin::default());
        assert_eq!(t.package_name(), "com.x");
        assert_eq!(t.simple_name(), "Inner");
        assert_eq!(t.enclosing_type_name(), Some("com.x.Outer"));
    }

    #[test]
    fn test_method_identity_ignores_signature_and_exceptions() {
        let mut t = Type::new("com.x.A", Modifiers::PUBLIC, TypeOrigin::default());
        t.add_method(Method::new("run", "()V", Modifiers::PUBLIC));
        t.add_method(
            Method::new("run", "()V", Modifiers::PUBLIC)
                .with_generic_signature(Some("<T:Ljava/lang/Object;>()V".into()))
                .with_exceptions(vec!["java.io.IOException".into()]),
        );
        assert_eq!(t.methods().count(), 1);
        assert_eq!(t.method("run", "()V").unwrap().exceptions().len(), 1);
    }

    #[test]
    fn test_navigation_without_module_is_resolution_error() {
        let mut t = Type::new("com.x.A", Modifiers::PUBLIC, TypeOrigin::new("b", "m"));
        t.set_superclass(Some("com.x.Base".into()));
        assert!(matches!(t.superclass_type(), Err(CoreError::Resolution { .. })));
        assert!(t.enclosing_type().unwrap().is_none());
    }
}
