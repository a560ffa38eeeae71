//! Interface index to name resolution with per-session memoization.

use std::collections::HashMap;

use tracing::warn;

/// Interface index to name mapping captured alongside raw attribute dumps.
pub type DeviceNameTable = HashMap<u32, String>;

/// Resolves an interface index to its current name, if the interface exists.
pub trait NameResolver {
    fn index_to_name(&self, index: u32) -> Option<String>;
}

/// Live resolver backed by `if_indextoname(3)`.
#[cfg(target_os = "linux")]
#[derive(Debug, Default)]
pub struct SystemResolver;

#[cfg(target_os = "linux")]
impl NameResolver for SystemResolver {
    fn index_to_name(&self, index: u32) -> Option<String> {
        let mut buf = [0u8; libc::IF_NAMESIZE];
        // SAFETY: buf is IF_NAMESIZE bytes, as if_indextoname requires.
        let ret =
            unsafe { libc::if_indextoname(index, buf.as_mut_ptr() as *mut libc::c_char) };
        if ret.is_null() {
            return None;
        }
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Some(String::from_utf8_lossy(&buf[..len]).into_owned())
    }
}

/// Memoized interface-name lookup, one per session.
///
/// An index is resolved at most once per session lifetime. Indices that no
/// longer name a live interface get the stable fallback `unkn/<index>`, which
/// is also cached so a renamed or removed interface cannot flap mid-session.
pub struct DeviceNameCache {
    names: DeviceNameTable,
    resolver: Box<dyn NameResolver + Send>,
}

impl DeviceNameCache {
    #[cfg(target_os = "linux")]
    pub fn new() -> Self {
        Self::with_resolver(SystemResolver)
    }

    pub fn with_resolver(resolver: impl NameResolver + Send + 'static) -> Self {
        Self {
            names: DeviceNameTable::new(),
            resolver: Box::new(resolver),
        }
    }

    /// Resolve an interface index. Index 0 means "no interface".
    pub fn resolve(&mut self, index: u32) -> Option<String> {
        if index == 0 {
            return None;
        }
        if let Some(name) = self.names.get(&index) {
            return Some(name.clone());
        }
        let name = self.resolver.index_to_name(index).unwrap_or_else(|| {
            warn!(index, "interface name lookup failed, using fallback");
            format!("unkn/{index}")
        });
        self.names.insert(index, name.clone());
        Some(name)
    }

    /// Snapshot of everything resolved so far.
    pub fn table(&self) -> &DeviceNameTable {
        &self.names
    }
}

#[cfg(target_os = "linux")]
impl Default for DeviceNameCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct CountingResolver {
        lookups: Arc<Mutex<Vec<u32>>>,
        known: HashMap<u32, String>,
    }

    impl NameResolver for CountingResolver {
        fn index_to_name(&self, index: u32) -> Option<String> {
            self.lookups.lock().unwrap().push(index);
            self.known.get(&index).cloned()
        }
    }

    fn counting_cache(known: &[(u32, &str)]) -> (DeviceNameCache, Arc<Mutex<Vec<u32>>>) {
        let lookups = Arc::new(Mutex::new(Vec::new()));
        let resolver = CountingResolver {
            lookups: Arc::clone(&lookups),
            known: known.iter().map(|(i, n)| (*i, n.to_string())).collect(),
        };
        (DeviceNameCache::with_resolver(resolver), lookups)
    }

    #[test]
    fn test_zero_index_resolves_to_none() {
        let (mut cache, lookups) = counting_cache(&[]);
        assert_eq!(cache.resolve(0), None);
        assert!(lookups.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lookup_happens_at_most_once() {
        let (mut cache, lookups) = counting_cache(&[(2, "eth0")]);
        assert_eq!(cache.resolve(2).as_deref(), Some("eth0"));
        assert_eq!(cache.resolve(2).as_deref(), Some("eth0"));
        assert_eq!(cache.resolve(2).as_deref(), Some("eth0"));
        assert_eq!(lookups.lock().unwrap().as_slice(), &[2]);
    }

    #[test]
    fn test_unknown_index_gets_stable_fallback() {
        let (mut cache, lookups) = counting_cache(&[]);
        assert_eq!(cache.resolve(7).as_deref(), Some("unkn/7"));
        // fallback is cached too
        assert_eq!(cache.resolve(7).as_deref(), Some("unkn/7"));
        assert_eq!(lookups.lock().unwrap().as_slice(), &[7]);
    }

    #[test]
    fn test_table_snapshot() {
        let (mut cache, _) = counting_cache(&[(1, "lo"), (3, "wlan0")]);
        cache.resolve(1);
        cache.resolve(3);
        cache.resolve(9);
        let table = cache.table();
        assert_eq!(table.len(), 3);
        assert_eq!(table[&1], "lo");
        assert_eq!(table[&3], "wlan0");
        assert_eq!(table[&9], "unkn/9");
    }
}
