use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Normalized + transpiled form of one source file, ready for binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableModule {
    pub component_name: String,
    pub code: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// In-memory transpile cache shared by every compilation of an engine.
///
/// Keys combine the file path, a content hash, the namespace fingerprint
/// and the JSX pragma, so an entry is only reused when all of them match.
#[derive(Debug, Default)]
pub struct TranspileCache {
    entries: DashMap<String, ExecutableModule>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TranspileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn key(path: &str, content: &str, fingerprint: &str, pragma: &str) -> String {
        format!("{}:{}:{}:{}", path, Self::compute_hash(content), fingerprint, pragma)
    }

    pub fn get(&self, key: &str) -> Option<ExecutableModule> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: String, module: ExecutableModule) {
        self.entries.insert(key, module);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = TranspileCache::compute_hash("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_change_misses() {
        let cache = TranspileCache::new();
        let module = ExecutableModule {
            component_name: "Page".to_string(),
            code: "function Page() {}".to_string(),
        };
        let key = TranspileCache::key("app/page.tsx", "v1", "fp", "h");
        cache.set(key.clone(), module.clone());

        assert_eq!(cache.get(&key), Some(module));
        assert_eq!(
            cache.get(&TranspileCache::key("app/page.tsx", "v2", "fp", "h")),
            None
        );
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }
}
