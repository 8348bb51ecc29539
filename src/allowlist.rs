//! Origin-prefix guard applied to every proxied URL before any network or disk access.

use crate::error::{ProxyError, Result};

/// Prefixes `https://` onto a URL that carries neither `http://` nor `https://`.
pub fn normalize_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Exact string-prefix match against the configured origins. An empty list allows nothing.
pub fn is_allowed(url: &str, allowed_origins: &[String]) -> bool {
    allowed_origins
        .iter()
        .any(|origin| !origin.is_empty() && url.starts_with(origin.as_str()))
}

#[derive(Debug, Clone)]
pub struct AllowList {
    origins: Vec<String>,
}

impl AllowList {
    pub fn new(origins: Vec<String>) -> Self {
        Self { origins }
    }

    /// Normalizes the scheme and checks the result, returning the URL to proxy.
    pub fn check(&self, raw_url: &str) -> Result<String> {
        let url = normalize_scheme(raw_url.trim());
        if is_allowed(&url, &self.origins) {
            Ok(url)
        } else {
            Err(ProxyError::Forbidden { url })
        }
    }
}
