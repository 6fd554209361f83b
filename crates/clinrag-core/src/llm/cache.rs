//! Embedding cache to avoid re-encoding identical text

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

/// Cache entry with TTL
#[derive(Clone)]
struct CacheEntry {
    value: Vec<f32>,
    expires_at: SystemTime,
}

/// In-memory cache for embedding vectors
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl EmbeddingCache {
    /// Create new cache with default TTL of 1 hour
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(3600))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Get cached vector if present and not expired
    pub fn get(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(&cache_key(model, text))?;

        if SystemTime::now() < entry.expires_at {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, model: &str, text: &str, value: Vec<f32>) {
        let entry = CacheEntry {
            value,
            expires_at: SystemTime::now() + self.ttl,
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, e| SystemTime::now() < e.expires_at);
            entries.insert(cache_key(model, text), entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_key(model: &str, text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    model.hash(&mut hasher);
    text.hash(&mut hasher);
    format!("embed:{}:{:x}:{}", model, hasher.finish(), text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic() {
        let cache = EmbeddingCache::new();
        cache.insert("m", "chest pain", vec![1.0, 0.0]);

        assert_eq!(cache.get("m", "chest pain"), Some(vec![1.0, 0.0]));
        assert_eq!(cache.get("m", "headache"), None);
        assert_eq!(cache.get("other", "chest pain"), None);
    }

    #[test]
    fn test_cache_expiry() {
        let cache = EmbeddingCache::with_ttl(Duration::from_millis(50));
        cache.insert("m", "text", vec![0.5]);
        assert!(cache.get("m", "text").is_some());

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("m", "text"), None);

        cache.insert("m", "fresh", vec![0.1]);
        assert_eq!(cache.len(), 1);
    }
}
