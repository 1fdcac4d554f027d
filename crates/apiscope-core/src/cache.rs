//! Size-bounded memoization of built type structures
//!
//! Two independent maps are kept. Root types live under
//! baseline → module → type name. Nested types live under a composite
//! (baseline, module, root type) key → member name, so evicting one nested
//! type leaves its siblings and its root type in place.
//!
//! Every level is an LRU map that may grow past its capacity by a small
//! overflow before it is trimmed back, so eviction cost is amortized.

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use tracing::trace;

use crate::model::Type;
use crate::naming;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_OVERFLOW: usize = 10;

/// LRU map trimmed back to `capacity` once it exceeds `capacity + overflow`
struct BoundedLru<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    capacity: usize,
    overflow: usize,
}

impl<K: Hash + Eq + Clone, V> BoundedLru<K, V> {
    fn new(capacity: usize, overflow: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity,
            overflow,
        }
    }

    fn put(&mut self, key: K, value: V) {
        self.make_room(&key);
        self.entries.put(key, value);
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        self.make_room(&key);
        self.entries.get_or_insert_mut(key, make)
    }

    fn pop(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key)
    }

    fn retain(&mut self, keep: impl Fn(&K) -> bool) {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|(k, _)| !keep(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.entries.pop(&key);
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    /// Trims back to `capacity - 1` before a new key would exceed the overflow
    fn make_room(&mut self, key: &K) {
        if self.entries.contains(key) || self.entries.len() < self.capacity + self.overflow {
            return;
        }
        while !self.entries.is_empty() && self.entries.len() >= self.capacity {
            self.entries.pop_lru();
        }
    }
}

type TypeMap = BoundedLru<String, Arc<Type>>;
type ModuleMap = BoundedLru<String, TypeMap>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemberKey {
    baseline: String,
    module: String,
    root: String,
}

struct Maps {
    roots: BoundedLru<String, ModuleMap>,
    members: BoundedLru<MemberKey, TypeMap>,
}

/// Cache of built [`Type`] structures shared by every baseline in a process
pub struct ModelCache {
    maps: Mutex<Maps>,
    capacity: usize,
    overflow: usize,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_OVERFLOW)
    }
}

/// Whether a name is cached in the member map, and under which root
fn member_route(name: &str) -> Option<(&str, &str)> {
    let simple = naming::simple_name(name);
    match simple.find(naming::NESTING_SEPARATOR) {
        Some(idx) if idx > 0 => {
            let root = naming::root_type_name(name);
            Some((root, &name[root.len() + 1..]))
        }
        _ => None,
    }
}

impl ModelCache {
    pub fn new(capacity: usize, overflow: usize) -> Self {
        Self {
            maps: Mutex::new(Maps {
                roots: BoundedLru::new(capacity, overflow),
                members: BoundedLru::new(capacity, overflow),
            }),
            capacity,
            overflow,
        }
    }

    /// Stores a type under its origin's baseline and module version
    ///
    /// Types whose name contains the nesting separator, or that were built as
    /// member types, go to the member map.
    pub fn cache(&self, ty: Arc<Type>) {
        let (capacity, overflow) = (self.capacity, self.overflow);
        let baseline = ty.origin().baseline().to_string();
        let module = ty.origin().cache_module();
        let name = ty.name().to_string();
        let mut maps = self.maps.lock();

        let route = member_route(&name)
            .map(|(root, member)| (root.to_string(), member.to_string()))
            .or_else(|| ty.is_member().then(|| (name.clone(), ty.simple_name().to_string())));

        match route {
            Some((root, member)) => {
                trace!("Caching member type {} under {}", name, root);
                let key = MemberKey {
                    baseline,
                    module,
                    root,
                };
                maps.members
                    .get_or_insert_with(key, || BoundedLru::new(capacity, overflow))
                    .put(member, ty);
            }
            None => {
                trace!("Caching type {}", name);
                maps.roots
                    .get_or_insert_with(baseline, || BoundedLru::new(capacity, overflow))
                    .get_or_insert_with(module, || BoundedLru::new(capacity, overflow))
                    .put(name, ty);
            }
        }
    }

    pub fn lookup(&self, baseline: &str, module: &str, type_name: &str) -> Option<Arc<Type>> {
        let mut maps = self.maps.lock();
        if let Some((root, member)) = member_route(type_name) {
            return Self::lookup_member(&mut maps, baseline, module, root, member);
        }
        let found = maps
            .roots
            .get_mut(&baseline.to_string())
            .and_then(|modules| modules.get_mut(&module.to_string()))
            .and_then(|types| types.get(&type_name.to_string()).cloned());
        found.or_else(|| {
            Self::lookup_member(
                &mut maps,
                baseline,
                module,
                type_name,
                naming::simple_name(type_name),
            )
        })
    }

    fn lookup_member(
        maps: &mut Maps,
        baseline: &str,
        module: &str,
        root: &str,
        member: &str,
    ) -> Option<Arc<Type>> {
        let key = MemberKey {
            baseline: baseline.to_string(),
            module: module.to_string(),
            root: root.to_string(),
        };
        maps.members
            .get_mut(&key)
            .and_then(|types| types.get(&member.to_string()).cloned())
    }

    /// Evicts one type. Sibling member types and the root type stay cached.
    pub fn evict(&self, baseline: &str, module: &str, type_name: &str) -> bool {
        let mut maps = self.maps.lock();
        let (root, member) = member_route(type_name)
            .unwrap_or((type_name, naming::simple_name(type_name)));
        let key = MemberKey {
            baseline: baseline.to_string(),
            module: module.to_string(),
            root: root.to_string(),
        };

        let mut removed = false;
        if let Some(types) = maps.members.get_mut(&key) {
            removed |= types.pop(&member.to_string()).is_some();
            if types.is_empty() {
                maps.members.pop(&key);
            }
        }
        if member_route(type_name).is_none() {
            if let Some(modules) = maps.roots.get_mut(&baseline.to_string()) {
                if let Some(types) = modules.get_mut(&module.to_string()) {
                    removed |= types.pop(&type_name.to_string()).is_some();
                }
            }
        }
        removed
    }

    /// Evicts every root and member type of one module
    pub fn evict_module(&self, baseline: &str, module: &str) {
        let mut maps = self.maps.lock();
        if let Some(modules) = maps.roots.get_mut(&baseline.to_string()) {
            modules.pop(&module.to_string());
        }
        maps.members
            .retain(|key| !(key.baseline == baseline && key.module == module));
    }

    /// Evicts everything cached under a baseline name
    pub fn evict_baseline(&self, baseline: &str) {
        let mut maps = self.maps.lock();
        maps.roots.pop(&baseline.to_string());
        maps.members.retain(|key| key.baseline != baseline);
    }

    pub fn is_empty(&self) -> bool {
        let maps = self.maps.lock();
        maps.members.is_empty()
            && maps
                .roots
                .entries
                .iter()
                .all(|(_, modules)| modules.entries.iter().all(|(_, types)| types.is_empty()))
    }

    /// Drops every cached entry
    pub fn flush(&self) {
        let mut maps = self.maps.lock();
        maps.roots.clear();
        maps.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Modifiers;
    use crate::model::TypeOrigin;

    fn ty(baseline: &str, module: &str, name: &str) -> Arc<Type> {
        Arc::new(Type::new(name, Modifiers::PUBLIC, TypeOrigin::new(baseline, module)))
    }

    #[test]
    fn test_cache_and_lookup() {
        let cache = ModelCache::default();
        assert!(cache.is_empty());
        cache.cache(ty("b", "m", "com.x.A"));
        cache.cache(ty("b", "m", "com.x.A$Inner"));

        assert!(cache.lookup("b", "m", "com.x.A").is_some());
        assert!(cache.lookup("b", "m", "com.x.A$Inner").is_some());
        assert!(cache.lookup("b", "other", "com.x.A").is_none());
        assert!(cache.lookup("other", "m", "com.x.A").is_none());
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_versions_of_one_module_are_cached_apart() {
        let cache = ModelCache::default();
        let origin = |version: &str| TypeOrigin::new("b", "m").with_version(version);
        cache.cache(Arc::new(Type::new("com.x.A", Modifiers::PUBLIC, origin("1.0.0"))));
        cache.cache(Arc::new(Type::new("com.x.A", Modifiers::empty(), origin("1.0.1"))));

        let old = cache.lookup("b", &origin("1.0.0").cache_module(), "com.x.A").unwrap();
        let new = cache.lookup("b", &origin("1.0.1").cache_module(), "com.x.A").unwrap();
        assert_eq!(old.modifiers(), Modifiers::PUBLIC);
        assert_eq!(new.modifiers(), Modifiers::empty());

        cache.evict_module("b", &origin("1.0.0").cache_module());
        assert!(cache.lookup("b", &origin("1.0.0").cache_module(), "com.x.A").is_none());
        assert!(cache.lookup("b", &origin("1.0.1").cache_module(), "com.x.A").is_some());
    }

    #[test]
    fn test_member_eviction_keeps_siblings() {
        let cache = ModelCache::default();
        cache.cache(ty("b", "m", "com.x.A"));
        cache.cache(ty("b", "m", "com.x.A$One"));
        cache.cache(ty("b", "m", "com.x.A$Two"));
        cache.cache(ty("b", "m", "com.x.A$Two$Deep"));

        assert!(cache.evict("b", "m", "com.x.A$One"));
        assert!(cache.lookup("b", "m", "com.x.A$One").is_none());
        assert!(cache.lookup("b", "m", "com.x.A$Two").is_some());
        assert!(cache.lookup("b", "m", "com.x.A$Two$Deep").is_some());
        assert!(cache.lookup("b", "m", "com.x.A").is_some());
    }

    #[test]
    fn test_module_and_baseline_eviction_cover_both_maps() {
        let cache = ModelCache::default();
        cache.cache(ty("b", "m1", "com.x.A"));
        cache.cache(ty("b", "m1", "com.x.A$1"));
        cache.cache(ty("b", "m2", "com.y.B"));
        cache.cache(ty("b2", "m1", "com.x.A$1"));

        cache.evict_module("b", "m1");
        assert!(cache.lookup("b", "m1", "com.x.A").is_none());
        assert!(cache.lookup("b", "m1", "com.x.A$1").is_none());
        assert!(cache.lookup("b", "m2", "com.y.B").is_some());
        assert!(cache.lookup("b2", "m1", "com.x.A$1").is_some());

        cache.evict_baseline("b2");
        assert!(cache.lookup("b2", "m1", "com.x.A$1").is_none());
        cache.evict_baseline("b");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overflow_trims_back_to_capacity() {
        let cache = ModelCache::new(4, 2);
        for i in 0..6 {
            cache.cache(ty("b", "m", &format!("p.T{}", i)));
        }
        // still within capacity + overflow
        assert!(cache.lookup("b", "m", "p.T0").is_some());

        cache.cache(ty("b", "m", "p.T6"));
        let present = (0..7)
            .filter(|i| cache.lookup("b", "m", &format!("p.T{}", i)).is_some())
            .count();
        assert_eq!(present, 4);
        assert!(cache.lookup("b", "m", "p.T6").is_some());
    }

    #[test]
    fn test_flush() {
        let cache = ModelCache::default();
        cache.cache(ty("b", "m", "com.x.A$B"));
        cache.flush();
        assert!(cache.is_empty());
    }
}
