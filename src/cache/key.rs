use crate::constants::{COLON_MARKER, FALLBACK_EXTENSION, HTML_EXTENSION, SLASH_MARKER};
use crate::error::{ProxyError, Result};
use crate::fetcher::is_html_content_type;
use std::path::{Path, PathBuf};
use url::Url;

/// On-disk location of a cached URL: `<root>/<host[:port]>/<token><extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub dir: PathBuf,
    pub token: String,
    /// Always `.` followed by a dot-free suffix.
    pub extension: String,
}

impl CacheKey {
    /// Pure derivation of the cache location. Performs no I/O.
    pub fn resolve(root: &Path, url: &str, content_type: Option<&str>) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| ProxyError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let netloc = netloc(&parsed).ok_or_else(|| ProxyError::InvalidUrl {
            url: url.to_string(),
            reason: "URL has no host".to_string(),
        })?;

        Ok(Self {
            dir: root.join(netloc),
            token: encode_url(url),
            extension: extension_for(&parsed, content_type),
        })
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.token, self.extension)
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(self.file_name())
    }

    /// Same entry stored under another extension.
    pub fn with_extension(&self, extension: &str) -> Self {
        Self {
            dir: self.dir.clone(),
            token: self.token.clone(),
            extension: extension.to_string(),
        }
    }

    /// If `file_name` is this key's token plus a single extension, returns that extension.
    pub fn extension_of(&self, file_name: &str) -> Option<String> {
        let rest = file_name.strip_prefix(self.token.as_str())?;
        let suffix = rest.strip_prefix('.')?;
        if suffix.is_empty() || suffix.contains('.') {
            return None;
        }
        Some(rest.to_string())
    }

    /// Idempotently creates the per-host directory.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ProxyError::cache_io(&self.dir, e))
    }
}

/// Resolves the cache path for `url` and makes sure its host directory exists.
pub async fn resolve_path(root: &Path, url: &str, content_type: Option<&str>) -> Result<PathBuf> {
    let key = CacheKey::resolve(root, url, content_type)?;
    key.ensure_dir().await?;
    Ok(key.path())
}

/// Filesystem-safe, injective encoding of a full URL.
///
/// The marker characters and `%` are escaped first so every token decodes to exactly one URL.
pub fn encode_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len() + 8);
    for c in url.chars() {
        match c {
            '%' => out.push_str("%25"),
            SLASH_MARKER => out.push_str("%24"),
            COLON_MARKER => out.push_str("%23"),
            '/' => out.push(SLASH_MARKER),
            ':' => out.push(COLON_MARKER),
            c => out.push(c),
        }
    }
    out
}

fn netloc(url: &Url) -> Option<String> {
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn extension_for(url: &Url, content_type: Option<&str>) -> String {
    let Some(content_type) = content_type.map(|c| c.to_ascii_lowercase()) else {
        return HTML_EXTENSION.to_string();
    };
    if is_html_content_type(&content_type) {
        return HTML_EXTENSION.to_string();
    }

    // `.html` is reserved for documents so a hit never decodes a binary as text.
    let extension = if content_type.contains("image") {
        mime_extension(&content_type).or_else(|| url_path_extension(url))
    } else {
        mime_extension(&content_type).or_else(|| url_path_extension(url).filter(|ext| is_known_extension(ext)))
    };

    extension
        .filter(|ext| ext != "html" && ext != "htm")
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

fn is_known_extension(ext: &str) -> bool {
    mime_guess::from_ext(ext).first().is_some()
}

fn mime_extension(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim();
    let candidates = mime_guess::get_mime_extensions_str(essence)?;
    // Prefer the subtype's own name (`png`, `jpeg`, `webp`) when it is a known extension.
    let subtype = essence.split('/').nth(1).unwrap_or_default();
    candidates
        .iter()
        .find(|ext| **ext == subtype)
        .or_else(|| candidates.first())
        .map(|ext| ext.to_string())
}

fn url_path_extension(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.last()?;
    let ext = Path::new(last_segment).extension()?.to_str()?;
    let safe = !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    safe.then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/cache")
    }

    fn path_of(url: &str, content_type: Option<&str>) -> PathBuf {
        CacheKey::resolve(&root(), url, content_type).unwrap().path()
    }

    #[test]
    fn test_layout() {
        assert_eq!(
            path_of("https://adventofcode.com/2023/day/1", None),
            PathBuf::from("/cache/adventofcode.com/https#$$adventofcode.com$2023$day$1.html")
        );
        assert_eq!(
            path_of("http://localhost:8080/a", None),
            PathBuf::from("/cache/localhost:8080/http#$$localhost#8080$a.html")
        );
    }

    #[test]
    fn test_same_input_same_path() {
        let a = path_of("https://example.com/x?y=1", Some("image/png"));
        let b = path_of("https://example.com/x?y=1", Some("image/png"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_near_identical_urls_do_not_collide() {
        let urls = [
            "https://example.com/a",
            "http://example.com/a",
            "https://example.com/a/",
            "https://example.com/a:b",
            "https://example.com/a#b",
            "https://example.com/a$b",
            "https://example.com/a%24b",
            "https://example.com/a/b",
        ];
        let mut paths: Vec<PathBuf> = urls.iter().map(|u| path_of(u, None)).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), urls.len());
    }

    #[test]
    fn test_extension_rules() {
        let url = "https://example.com/logo.gif";
        assert!(path_of(url, None).to_string_lossy().ends_with(".gif.html"));
        assert!(path_of(url, Some("text/html; charset=utf-8"))
            .to_string_lossy()
            .ends_with(".html"));
        assert!(path_of(url, Some("image/png")).to_string_lossy().ends_with(".gif.png"));
        assert!(path_of(url, Some("image/jpeg")).to_string_lossy().ends_with(".jpeg"));
        // Unknown image type falls back to the URL's own extension, then `.bin`.
        assert!(path_of(url, Some("image/x-unheard-of")).to_string_lossy().ends_with(".gif.gif"));
        assert!(path_of("https://example.com/pixel", Some("image/x-unheard-of"))
            .to_string_lossy()
            .ends_with("pixel.bin"));
    }

    #[test]
    fn test_only_documents_get_html_extension() {
        let ends = |url: &str, ct: &str, ext: &str| path_of(url, Some(ct)).to_string_lossy().ends_with(ext);

        assert!(ends("https://example.com/site", "text/css; charset=utf-8", "site.css"));
        assert!(ends("https://example.com/f", "font/woff2", "f.woff2"));
        assert!(ends("https://example.com/doc", "application/pdf", "doc.pdf"));
        // Unknown type: a recognised URL extension, else `.bin`.
        assert!(ends("https://example.com/app.js", "application/x-made-up", "app.js.js"));
        assert!(ends("https://example.com/blob", "application/x-made-up", "blob.bin"));
        assert!(ends("https://example.com/page.html", "application/x-made-up", "page.html.bin"));
    }

    #[test]
    fn test_extension_of_rejects_other_tokens() {
        let key = CacheKey::resolve(&root(), "https://example.com/x", None).unwrap();
        assert_eq!(key.extension_of(&key.file_name()), Some(".html".to_string()));
        assert_eq!(key.extension_of("https#$$example.com$x.png"), Some(".png".to_string()));
        // Belongs to https://example.com/x.png
        assert_eq!(key.extension_of("https#$$example.com$x.png.html"), None);
        // Belongs to https://example.com/xy
        assert_eq!(key.extension_of("https#$$example.com$xy.html"), None);
        assert_eq!(key.extension_of("https#$$example.com$x."), None);
    }

    #[test]
    fn test_url_without_host_is_invalid() {
        assert!(matches!(
            CacheKey::resolve(&root(), "https//nohost", None),
            Err(ProxyError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_path_creates_host_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = resolve_path(dir.path(), "https://example.com/page", None).await.unwrap();
        assert!(dir.path().join("example.com").is_dir());
        assert_eq!(path.parent().unwrap(), dir.path().join("example.com"));
        // Repeating is harmless.
        resolve_path(dir.path(), "https://example.com/page", None).await.unwrap();
    }
}
