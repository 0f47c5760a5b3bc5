// ChapterSleuth - oracle/cache.rs
//
// On-disk memoization of oracle responses, keyed by SHA-256 of the model
// identifier and the whitespace-normalised prompt. With a warm cache a
// whole segmentation run is bit-for-bit reproducible. Writes are atomic
// (temp file + rename); reads take no locks.

use crate::oracle::Oracle;
use crate::util::error::OracleError;
use sha2::{Digest, Sha256};
use std::io;
use std::path::PathBuf;

/// Disk-backed response cache for one model identifier.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    model: String,
}

impl ResponseCache {
    /// Open (and create if needed) the cache directory.
    pub fn open(dir: PathBuf, model: impl Into<String>) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            model: model.into(),
        })
    }

    /// Stable cache key: SHA-256 over the model identifier and the
    /// normalised prompt. Whitespace runs are collapsed so trivial prompt
    /// formatting changes do not fragment the cache.
    pub fn key(&self, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        let mut last_was_space = false;
        for ch in prompt.trim().chars() {
            if ch.is_whitespace() {
                if !last_was_space {
                    hasher.update(b" ");
                }
                last_was_space = true;
            } else {
                let mut buf = [0u8; 4];
                hasher.update(ch.encode_utf8(&mut buf).as_bytes());
                last_was_space = false;
            }
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    pub fn get(&self, prompt: &str) -> Option<String> {
        let path = self.dir.join(self.key(prompt));
        match std::fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cache read failed");
                None
            }
        }
    }

    /// Atomic write: a sibling temp file is renamed over the final path so
    /// concurrent readers never observe a partial entry.
    pub fn put(&self, prompt: &str, value: &str) {
        let key = self.key(prompt);
        let tmp = self.dir.join(format!("{key}.tmp.{}", std::process::id()));
        let path = self.dir.join(key);
        let result = std::fs::write(&tmp, value).and_then(|()| std::fs::rename(&tmp, &path));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Cache write failed");
            let _ = std::fs::remove_file(&tmp);
        }
    }
}

/// Oracle wrapper that consults the cache before dispatching.
#[derive(Debug)]
pub struct CachedOracle<O> {
    inner: O,
    cache: ResponseCache,
}

impl<O> CachedOracle<O> {
    pub fn new(inner: O, cache: ResponseCache) -> Self {
        Self { inner, cache }
    }
}

impl<O: Oracle> Oracle for CachedOracle<O> {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        if let Some(hit) = self.cache.get(prompt) {
            tracing::debug!("Oracle cache hit");
            return Ok(hit);
        }
        let completion = self.inner.complete(prompt).await?;
        self.cache.put(prompt, &completion);
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingOracle {
        calls: AtomicU32,
    }

    impl Oracle for CountingOracle {
        async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo: {prompt}"))
        }
    }

    #[test]
    fn test_key_normalises_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path().to_path_buf(), "test-model").unwrap();
        assert_eq!(cache.key("a  b\n\nc"), cache.key("a b c"));
        assert_ne!(cache.key("a b c"), cache.key("a b d"));
    }

    #[test]
    fn test_key_depends_on_model() {
        let dir = tempfile::tempdir().unwrap();
        let a = ResponseCache::open(dir.path().to_path_buf(), "model-a").unwrap();
        let b = ResponseCache::open(dir.path().to_path_buf(), "model-b").unwrap();
        assert_ne!(a.key("prompt"), b.key("prompt"));
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path().to_path_buf(), "m").unwrap();
        assert!(cache.get("p").is_none());
        cache.put("p", "value");
        assert_eq!(cache.get("p").as_deref(), Some("value"));
        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_cached_oracle_memoizes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(dir.path().to_path_buf(), "m").unwrap();
        let oracle = CachedOracle::new(
            CountingOracle {
                calls: AtomicU32::new(0),
            },
            cache,
        );
        let first = oracle.complete("hello").await.unwrap();
        let second = oracle.complete("hello").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(oracle.inner.calls.load(Ordering::SeqCst), 1);
    }
}
