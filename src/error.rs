use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Forbidden URL: {url}")]
    Forbidden { url: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Upstream returned status {status} for {url}")]
    UpstreamHttp { url: String, status: u16 },

    #[error("Upstream request for {url} failed: {cause}")]
    UpstreamTransport {
        url: String,
        cause: String,
        timed_out: bool,
    },

    #[error("Cache I/O error at {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProxyError {
    pub fn cache_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProxyError::CacheIo {
            path: path.into(),
            source,
        }
    }

    /// The proxied URL this error concerns, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            ProxyError::Forbidden { url }
            | ProxyError::InvalidUrl { url, .. }
            | ProxyError::UpstreamHttp { url, .. }
            | ProxyError::UpstreamTransport { url, .. } => Some(url),
            ProxyError::CacheIo { .. } | ProxyError::Config(_) | ProxyError::Toml(_) => None,
        }
    }

    /// HTTP status used when this error is rendered as an error page.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::Forbidden { .. } => 403,
            ProxyError::InvalidUrl { .. } => 400,
            ProxyError::UpstreamHttp { .. } => 502,
            ProxyError::UpstreamTransport { timed_out: true, .. } => 504,
            ProxyError::UpstreamTransport { .. } => 502,
            ProxyError::CacheIo { .. } | ProxyError::Config(_) | ProxyError::Toml(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_error_kind() {
        let forbidden = ProxyError::Forbidden {
            url: "https://evil.example/".to_string(),
        };
        assert_eq!(forbidden.status_code(), 403);
        assert_eq!(forbidden.url(), Some("https://evil.example/"));

        let timeout = ProxyError::UpstreamTransport {
            url: "https://example.com".to_string(),
            cause: "timed out".to_string(),
            timed_out: true,
        };
        assert_eq!(timeout.status_code(), 504);

        let io = ProxyError::cache_io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(io.status_code(), 500);
        assert!(io.url().is_none());
    }
}
