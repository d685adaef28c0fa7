use chrono::{DateTime, Utc};
use lbc_core::codec::encode_submission;
use lbc_core::{Error, Result, SubmissionResult, Trace};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const STATUS_PENDING: &str = "pending";

/// A submission remembered locally, keyed by the hash of its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub challenge_id: String,
    pub trace_hash: String,
    pub experiment_id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn pending(challenge_id: &str, key: &str, experiment_id: &str) -> Self {
        Self {
            challenge_id: challenge_id.to_string(),
            trace_hash: key.to_string(),
            experiment_id: experiment_id.to_string(),
            status: STATUS_PENDING.to_string(),
            result: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn finished(challenge_id: &str, key: &str, result: &SubmissionResult) -> Self {
        Self {
            challenge_id: challenge_id.to_string(),
            trace_hash: key.to_string(),
            experiment_id: result.experiment_id.clone(),
            status: result.status.as_str().to_string(),
            result: Some(result.raw.clone()),
            error: result.error.clone(),
            created_at: Utc::now(),
        }
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 over the canonical (sorted-key, compact) submission body.
pub fn cache_key(challenge_id: &str, trace: &Trace) -> String {
    let body = canonicalize(&encode_submission(challenge_id, trace));
    let mut hasher = Sha256::new();
    hasher.update(body.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct SubmissionCache {
    dir: PathBuf,
}

impl SubmissionCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn default_dir() -> Result<PathBuf> {
        Ok(crate::config::config_dir()?.join("cache"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Unreadable entries count as misses.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let raw = fs::read(&path).ok()?;
        match serde_json::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    pub fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entry)
            .map_err(|e| Error::Cache(format!("could not serialize entry: {}", e)))?;
        atomic_write(&self.entry_path(key), &bytes)
            .map_err(|e| Error::Cache(format!("could not write entry {}: {}", key, e)))?;
        debug!(key, status = %entry.status, "cache entry written");
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| Error::Cache(format!("could not remove {}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    /// Removes every entry and returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let listing = fs::read_dir(&self.dir)
            .map_err(|e| Error::Cache(format!("could not list {}: {}", self.dir.display(), e)))?;
        let mut removed = 0;
        for item in listing {
            let path = item.map_err(|e| Error::Cache(e.to_string()))?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                fs::remove_file(&path).map_err(|e| {
                    Error::Cache(format!("could not remove {}: {}", path.display(), e))
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("entry");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbc_core::{trace, wells, RED_DYE};
    use serde_json::json;

    fn temp_cache(tag: &str) -> SubmissionCache {
        SubmissionCache::new(std::env::temp_dir().join(format!(
            "lbc_cache_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        )))
    }

    fn one_well(volume: f64) -> Trace {
        trace(|| -> Result<()> {
            for well in wells(1)? {
                well.fill(volume, RED_DYE)?;
            }
            Ok(())
        })
        .expect("trace")
    }

    #[test]
    fn key_is_deterministic_and_content_sensitive() {
        let a = cache_key("default", &one_well(50.0));
        assert_eq!(a, cache_key("default", &one_well(50.0)));
        assert_eq!(a.len(), 64);
        assert_ne!(a, cache_key("default", &one_well(51.0)));
        assert_ne!(a, cache_key("other", &one_well(50.0)));
    }

    #[test]
    fn canonical_form_sorts_nested_keys() {
        let value = json!({"b": {"z": 1, "a": [ {"y": 2, "x": 3} ]}, "a": null});
        assert_eq!(
            canonicalize(&value).to_string(),
            r#"{"a":null,"b":{"a":[{"x":3,"y":2}],"z":1}}"#
        );
    }

    #[test]
    fn put_get_remove_clear() {
        let cache = temp_cache("crud");
        assert!(cache.get("k1").is_none());
        let entry = CacheEntry::pending("default", "k1", "exp-1");
        cache.put("k1", &entry).expect("put");
        cache
            .put("k2", &CacheEntry::pending("default", "k2", "exp-2"))
            .expect("put");
        assert_eq!(cache.get("k1"), Some(entry));
        cache.remove("k1").expect("remove");
        assert!(cache.get("k1").is_none());
        assert_eq!(cache.clear().expect("clear"), 1);
        assert_eq!(cache.clear().expect("clear again"), 0);
        let _ = fs::remove_dir_all(cache.dir());
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let cache = temp_cache("corrupt");
        fs::create_dir_all(cache.dir()).expect("dir");
        fs::write(cache.dir().join("bad.json"), "{not json").expect("write");
        assert!(cache.get("bad").is_none());
        let _ = fs::remove_dir_all(cache.dir());
    }

    #[test]
    fn finished_entry_keeps_raw_result() {
        let result = SubmissionResult::from_response(json!({
            "experiment_id": "exp-9", "status": "failed", "error": "tip crash"
        }))
        .expect("result");
        let entry = CacheEntry::finished("default", "k", &result);
        assert_eq!(entry.status, "failed");
        assert_eq!(entry.error.as_deref(), Some("tip crash"));
        assert_eq!(entry.result, Some(result.raw));
    }
}
