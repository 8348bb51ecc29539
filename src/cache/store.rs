use super::key::CacheKey;
use crate::constants::{FALLBACK_EXTENSION, HTML_EXTENSION};
use crate::error::{ProxyError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// A cached file. The filesystem is the only record: mtime is the freshness signal and the
/// extension carries the content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub content_type: String,
    pub modified: SystemTime,
}

impl CacheEntry {
    pub fn is_html(&self) -> bool {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(HTML_EXTENSION))
            .unwrap_or(false)
    }

    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.modified)
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }
}

/// Content type served for a cached file with the given extension.
pub fn content_type_for_extension(extension: &str) -> String {
    if extension == HTML_EXTENSION {
        return "text/html; charset=utf-8".to_string();
    }
    if extension == FALLBACK_EXTENSION {
        return "application/octet-stream".to_string();
    }
    mime_guess::from_ext(extension.trim_start_matches('.'))
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Disk cache rooted at one directory, laid out per host.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the cache root. Failure here is a configuration problem.
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ProxyError::cache_io(&self.root, e))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key_for(&self, url: &str, content_type: Option<&str>) -> Result<CacheKey> {
        CacheKey::resolve(&self.root, url, content_type)
    }

    /// Finds the newest cached variant of `url`, whatever extension it was stored under.
    pub async fn lookup(&self, url: &str) -> Result<Option<CacheEntry>> {
        let key = self.key_for(url, None)?;
        let mut best: Option<CacheEntry> = None;

        for (path, extension) in self.variants(&key).await? {
            let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                // Removed between listing and stat.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ProxyError::cache_io(&path, e)),
            };
            if best.as_ref().map_or(true, |b| modified > b.modified) {
                best = Some(CacheEntry {
                    path,
                    content_type: content_type_for_extension(&extension),
                    modified,
                });
            }
        }
        Ok(best)
    }

    /// True iff an entry exists for `url` and is younger than `max_age`.
    pub async fn is_fresh(&self, url: &str, max_age: Duration) -> Result<bool> {
        let fresh = self
            .lookup(url)
            .await?
            .map(|entry| entry.is_fresh(max_age))
            .unwrap_or(false);
        debug!(url = %url, fresh, "Cache freshness check");
        Ok(fresh)
    }

    /// Reads a cached document, replacing invalid UTF-8 sequences.
    pub async fn read_text(&self, path: &Path) -> Result<String> {
        let bytes = self.read_bytes(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| ProxyError::cache_io(path, e))
    }

    /// Replaces the entry for `key` with `content` via write-then-rename, then drops variants
    /// of the same URL stored under other extensions.
    pub async fn write(&self, key: &CacheKey, content: &[u8]) -> Result<PathBuf> {
        key.ensure_dir().await?;
        let path = key.path();
        let tmp = key
            .dir
            .join(format!(".{}.{}.tmp", key.token, uuid::Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&tmp, content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ProxyError::cache_io(&tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ProxyError::cache_io(&path, e));
        }

        for (other, extension) in self.variants(key).await? {
            if extension != key.extension {
                if let Err(e) = tokio::fs::remove_file(&other).await {
                    warn!(path = %other.display(), error = %e, "Failed to remove stale cache variant");
                }
            }
        }

        debug!(path = %path.display(), bytes = content.len(), "Wrote cache entry");
        Ok(path)
    }

    /// Existing files for the key's token, with their extensions.
    async fn variants(&self, key: &CacheKey) -> Result<Vec<(PathBuf, String)>> {
        let mut dir = match tokio::fs::read_dir(&key.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProxyError::cache_io(&key.dir, e)),
        };

        let mut found = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(ProxyError::cache_io(&key.dir, e)),
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(extension) = key.extension_of(name) {
                found.push((entry.path(), extension));
            }
        }
        Ok(found)
    }
}
