//! Read-through document cache for catalog sources
//!
//! Built-in sources fetch the same catalog document for search, metadata and
//! every image kind. This wrapper keeps those documents in a [`CacheStorage`]
//! so a release is downloaded once per time-to-live. Cache failures never
//! prevent retrieval; they are logged and the fetch goes to the network.

use super::SourceError;
use crate::cache::CacheStorage;
use crate::config::CacheConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// A cache of source documents keyed by source id
#[derive(Debug)]
pub(crate) struct CachedDocuments<T> {
    /// Cache storage, absent when caching is disabled or unavailable
    cache: Option<CacheStorage<T>>,
}

impl<T> CachedDocuments<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    /// Opens the cache named `name` according to `config`
    ///
    /// An unusable cache directory disables caching instead of failing.
    pub fn open(name: &str, config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let ttl = Some(Duration::from_secs(config.ttl_hours.saturating_mul(60 * 60)));
        let opened = match &config.directory {
            Some(dir) => CacheStorage::open_in(dir, name, ttl),
            None => CacheStorage::open(name, ttl),
        };

        match opened {
            Ok(cache) => {
                debug!(cache = name, dir = %cache.cache_dir().display(), "document cache opened");
                Self { cache: Some(cache) }
            }
            Err(e) => {
                warn!(cache = name, error = %e, "document cache unavailable, continuing without");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { cache: None }
    }

    /// Returns the cached document for `key`, or fetches and stores it
    ///
    /// `Ok(None)` from the fetch means "not found" and is not cached.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        fetch: F,
    ) -> Result<Option<T>, SourceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, SourceError>>,
    {
        if let Some(cache) = &self.cache {
            match cache.load(key) {
                Ok(Some(document)) => {
                    debug!(key, "document cache hit");
                    return Ok(Some(document));
                }
                Ok(None) => {}
                Err(e) => {
                    // A broken entry is refetched and overwritten below.
                    warn!(key, error = %e, "document cache read failed");
                }
            }
        }

        let document = fetch().await?;

        if let (Some(cache), Some(document)) = (&self.cache, &document) {
            if let Err(e) = cache.store(key, document) {
                warn!(key, error = %e, "document cache write failed");
            }
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config_in(dir: &std::path::Path) -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl_hours: 1,
            directory: Some(dir.to_path_buf()),
        }
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let docs: CachedDocuments<String> = CachedDocuments::open("docs", &config_in(dir.path()));
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let doc = docs
                .get_or_fetch("abc", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some("document".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(doc.as_deref(), Some("document"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let docs: CachedDocuments<String> = CachedDocuments::open("docs", &config_in(dir.path()));
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let doc = docs
                .get_or_fetch("missing", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert!(doc.is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_fetches() {
        let docs: CachedDocuments<String> = CachedDocuments::disabled();
        let result = docs
            .get_or_fetch("abc", || async {
                Err(SourceError::RequestError("down".to_string()))
            })
            .await;
        assert!(matches!(result, Err(SourceError::RequestError(_))));
    }
}
