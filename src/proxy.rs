use crate::allowlist::AllowList;
use crate::cache::{CacheKey, CacheStore, KeyedLocks};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::fetcher::{FetchResult, Fetcher};
use crate::metrics::ProxyMetrics;
use crate::rewrite::{rewrite_html, RewriteContext};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Rewritten document, ready to serve.
    Html(String),
    Bytes(Vec<u8>),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Body::Html(text) => text.len(),
            Body::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Body::Html(text) => text.into_bytes(),
            Body::Bytes(bytes) => bytes,
        }
    }
}

/// A successfully served resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    /// The normalized URL that was proxied.
    pub url: String,
    pub body: Body,
    pub content_type: String,
    pub from_cache: bool,
}

/// Serve-or-fetch-and-cache flow over the allowlist, cache and fetcher.
pub struct Proxy {
    config: Arc<ProxyConfig>,
    allowlist: AllowList,
    store: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    locks: KeyedLocks,
}

impl Proxy {
    pub fn new(config: Arc<ProxyConfig>, store: CacheStore, fetcher: Arc<dyn Fetcher>) -> Self {
        let allowlist = AllowList::new(config.allowed_origins.clone());
        Self {
            config,
            allowlist,
            store,
            fetcher,
            locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Validates `raw_url`, then serves it from a fresh cache entry or fetches, rewrites
    /// (HTML only) and caches it.
    #[instrument(skip_all, fields(url = %raw_url))]
    pub async fn serve(&self, raw_url: &str) -> Result<Served> {
        let url = self.allowlist.check(raw_url).map_err(|e| {
            ProxyMetrics::record_forbidden();
            warn!("Rejected URL outside the allowlist");
            e
        })?;

        // Key the lock on the extension-independent part of the cache path.
        let probe = self.store.key_for(&url, None)?;
        let lock_key = probe.dir.join(&probe.token);
        let _guard = self.locks.lock(&lock_key.to_string_lossy()).await;

        if let Some(served) = self.serve_fresh(&url).await? {
            return Ok(served);
        }

        ProxyMetrics::record_cache_miss();
        info!(url = %url, "Cache miss, fetching upstream");
        let started = Instant::now();
        let result = self.fetcher.fetch(&url).await;
        ProxyMetrics::record_upstream_fetch(started.elapsed().as_secs_f64());

        match result {
            FetchResult::Html { text, url: origin } => {
                let ctx = RewriteContext::new(origin, self.config.path_prefix.clone());
                let rewritten = rewrite_html(&text, &ctx);
                let key = self.store.key_for(&url, Some("text/html"))?;
                self.cache_best_effort(&key, rewritten.as_bytes()).await;
                Ok(Served {
                    url,
                    body: Body::Html(rewritten),
                    content_type: "text/html; charset=utf-8".to_string(),
                    from_cache: false,
                })
            }
            FetchResult::Binary { bytes, content_type } => {
                let key = self.store.key_for(&url, Some(&content_type))?;
                self.cache_best_effort(&key, &bytes).await;
                Ok(Served {
                    url,
                    body: Body::Bytes(bytes),
                    content_type,
                    from_cache: false,
                })
            }
            FetchResult::HttpError { status } => Err(upstream_failed(ProxyError::UpstreamHttp { url, status })),
            FetchResult::TransportError { cause, timed_out } => Err(upstream_failed(ProxyError::UpstreamTransport {
                url,
                cause,
                timed_out,
            })),
        }
    }

    async fn serve_fresh(&self, url: &str) -> Result<Option<Served>> {
        let entry = match self.store.lookup(url).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            // An unreadable cache directory degrades to a miss.
            Err(e) => {
                warn!(error = %e, "Cache lookup failed");
                return Ok(None);
            }
        };
        if !entry.is_fresh(self.config.default_cache_ttl) {
            debug!(url = %url, age_secs = entry.age().as_secs(), "Cache entry is stale");
            return Ok(None);
        }

        let body = if entry.is_html() {
            Body::Html(self.store.read_text(&entry.path).await?)
        } else {
            Body::Bytes(self.store.read_bytes(&entry.path).await?)
        };
        ProxyMetrics::record_cache_hit();
        info!(url = %url, path = %entry.path.display(), bytes = body.len(), "Cache hit");

        Ok(Some(Served {
            url: url.to_string(),
            body,
            content_type: entry.content_type,
            from_cache: true,
        }))
    }

    /// A failed cache write never costs the caller a successful fetch.
    async fn cache_best_effort(&self, key: &CacheKey, content: &[u8]) {
        if let Err(e) = self.store.write(key, content).await {
            ProxyMetrics::record_cache_write_error();
            warn!(error = %e, "Failed to write cache entry");
        }
    }
}

fn upstream_failed(err: ProxyError) -> ProxyError {
    ProxyMetrics::record_upstream_error();
    warn!(error = %err, "Upstream fetch failed");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubFetcher {
        result: FetchResult,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn proxy(root: &std::path::Path, result: FetchResult, ttl: Duration) -> (Proxy, Arc<StubFetcher>) {
        let fetcher = Arc::new(StubFetcher {
            result,
            calls: AtomicUsize::new(0),
        });
        let config = ProxyConfig {
            allowed_origins: vec!["https://example.com".to_string()],
            default_cache_ttl: ttl,
            ..ProxyConfig::default()
        };
        let proxy = Proxy::new(Arc::new(config), CacheStore::new(root), fetcher.clone());
        (proxy, fetcher)
    }

    #[tokio::test]
    async fn test_forbidden_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let (proxy, fetcher) = proxy(dir.path(), FetchResult::HttpError { status: 500 }, Duration::from_secs(60));

        let err = proxy.serve("https://evil.example/").await.unwrap_err();
        assert!(matches!(err, ProxyError::Forbidden { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_binary_served_with_upstream_type_then_cached_type() {
        let dir = tempfile::tempdir().unwrap();
        let (proxy, fetcher) = proxy(
            dir.path(),
            FetchResult::Binary {
                bytes: vec![7, 7, 7],
                content_type: "image/webp".to_string(),
            },
            Duration::from_secs(60),
        );

        let first = proxy.serve("example.com/pic").await.unwrap();
        assert_eq!(first.url, "https://example.com/pic");
        assert_eq!(first.content_type, "image/webp");
        assert!(!first.from_cache);

        let second = proxy.serve("https://example.com/pic").await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.body, Body::Bytes(vec![7, 7, 7]));
        assert_eq!(second.content_type, "image/webp");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_image_binaries_round_trip_unchanged() {
        let cases: [(&str, Vec<u8>); 2] = [
            ("text/css", b"body { color: red }".to_vec()),
            ("font/woff2", vec![119, 79, 70, 50, 255, 254, 0, 128]),
        ];
        for (content_type, bytes) in cases {
            let dir = tempfile::tempdir().unwrap();
            let (proxy, fetcher) = proxy(
                dir.path(),
                FetchResult::Binary {
                    bytes: bytes.clone(),
                    content_type: content_type.to_string(),
                },
                Duration::from_secs(60),
            );

            let first = proxy.serve("https://example.com/asset").await.unwrap();
            let second = proxy.serve("https://example.com/asset").await.unwrap();

            assert!(second.from_cache);
            assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
            assert_eq!(second.content_type, content_type);
            assert_eq!(second.body, Body::Bytes(bytes));
            assert_eq!(first.body, second.body);
        }
    }

    #[tokio::test]
    async fn test_overlong_url_is_served_but_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (proxy, fetcher) = proxy(
            dir.path(),
            FetchResult::Html {
                text: "<p>long</p>".to_string(),
                url: "https://example.com/".to_string(),
            },
            Duration::from_secs(60),
        );
        // The encoded file name exceeds the 255-byte name limit of common filesystems.
        let url = format!("https://example.com/{}", "a".repeat(300));

        for _ in 0..2 {
            let served = proxy.serve(&url).await.unwrap();
            assert!(!served.from_cache);
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(proxy.store().lookup(&url).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upstream_errors_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (proxy, fetcher) = proxy(dir.path(), FetchResult::HttpError { status: 404 }, Duration::from_secs(60));

        for _ in 0..2 {
            let err = proxy.serve("https://example.com/missing").await.unwrap_err();
            assert!(matches!(err, ProxyError::UpstreamHttp { status: 404, .. }));
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(proxy.store().lookup("https://example.com/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let (proxy, _) = proxy(
            dir.path(),
            FetchResult::TransportError {
                cause: "dns failure".to_string(),
                timed_out: false,
            },
            Duration::from_secs(60),
        );
        let err = proxy.serve("https://example.com/").await.unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.url(), Some("https://example.com/"));
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_serves() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the cache root should be makes every write fail.
        let root = dir.path().join("not-a-dir");
        std::fs::write(&root, b"").unwrap();
        let (proxy, _) = proxy(
            &root,
            FetchResult::Html {
                text: "<p>ok</p>".to_string(),
                url: "https://example.com/".to_string(),
            },
            Duration::from_secs(60),
        );

        let served = proxy.serve("https://example.com/").await.unwrap();
        assert!(!served.from_cache);
        assert!(matches!(served.body, Body::Html(ref html) if html.contains("<p>ok</p>")));
    }
}
