use super::{ClientError, ModelResponse};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// In-memory response cache keyed by caller-chosen strings.
///
/// Entries are never evicted. Values are shared through `Arc`, so storing the
/// same response under several keys does not copy it.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<String, Arc<ModelResponse>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<ModelResponse>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: impl Into<String>, response: Arc<ModelResponse>) {
        self.entries.insert(key.into(), response);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Write every entry to `path` as a JSON object keyed by cache key.
    pub fn export(&self, path: &Path) -> Result<(), ClientError> {
        // Keys and metadata are both ordered, so exporting the same entries
        // always produces the same bytes.
        let ordered: BTreeMap<&str, &ModelResponse> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_ref()))
            .collect();

        let json = serde_json::to_string_pretty(&ordered).map_err(|e| {
            ClientError::MalformedCacheFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, json)?;

        tracing::info!("Cache exported to {} ({} entries)", path.display(), ordered.len());
        Ok(())
    }

    /// Merge entries from a file written by [`ResponseCache::export`].
    ///
    /// The file is parsed completely before anything is inserted, so a schema
    /// violation leaves the cache untouched.
    pub fn import(&mut self, path: &Path) -> Result<usize, ClientError> {
        let contents = fs::read_to_string(path)?;

        let parsed: HashMap<String, ModelResponse> =
            serde_json::from_str(&contents).map_err(|e| ClientError::MalformedCacheFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let count = parsed.len();
        for (key, response) in parsed {
            self.entries.insert(key, Arc::new(response));
        }

        tracing::info!("Cache imported from {} ({} entries)", path.display(), count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FinishReason, Usage};
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn response(content: &str) -> Arc<ModelResponse> {
        let mut metadata = crate::llm::Metadata::new();
        metadata.insert("probe".to_string(), json!({"round": 2, "tags": ["a", "b"]}));

        Arc::new(ModelResponse {
            content: content.to_string(),
            model: "gpt-oss-20b".to_string(),
            usage: Usage {
                prompt_tokens: 12,
                completion_tokens: 30,
                total_tokens: 42,
            },
            finish_reason: FinishReason::Length,
            timestamp: Utc::now(),
            metadata,
        })
    }

    #[test]
    fn test_shared_value_under_two_keys() {
        let mut cache = ResponseCache::new();
        let shared = response("hi");
        cache.insert("a", shared.clone());
        cache.insert("b", shared.clone());

        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(&cache.get("a").unwrap(), &cache.get("b").unwrap()));
    }

    #[test]
    fn test_export_import_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = ResponseCache::new();
        cache.insert("k1", response("first"));
        cache.insert("k2", response("second"));
        cache.export(&path).unwrap();

        let mut restored = ResponseCache::new();
        assert_eq!(restored.import(&path).unwrap(), 2);

        for key in ["k1", "k2"] {
            assert_eq!(*restored.get(key).unwrap(), *cache.get(key).unwrap());
        }
    }

    #[test]
    fn test_export_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");

        let mut entry = (*response("x")).clone();
        for key in ["zeta", "alpha", "mid", "beta", "omega"] {
            entry.metadata.insert(key.to_string(), json!(key));
        }

        let mut cache = ResponseCache::new();
        cache.insert("k2", Arc::new(entry.clone()));
        cache.insert("k1", Arc::new(entry));
        cache.export(&first).unwrap();

        let mut restored = ResponseCache::new();
        restored.import(&first).unwrap();
        restored.export(&second).unwrap();

        let written = fs::read_to_string(&first).unwrap();
        assert_eq!(written, fs::read_to_string(&second).unwrap());
        assert!(written.find("\"alpha\"").unwrap() < written.find("\"zeta\"").unwrap());
    }

    #[test]
    fn test_import_rejects_schema_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"{"k1": {"content": "missing everything else"}}"#).unwrap();

        let mut cache = ResponseCache::new();
        cache.insert("existing", response("keep me"));

        let err = cache.import(&path).unwrap_err();
        assert!(matches!(err, ClientError::MalformedCacheFile { .. }));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("existing"));
    }

    #[test]
    fn test_import_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut cache = ResponseCache::new();
        let err = cache.import(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ClientError::CacheIo(_)));
    }

    #[test]
    fn test_clear() {
        let mut cache = ResponseCache::new();
        cache.insert("k", response("x"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("k").is_none());
    }
}
