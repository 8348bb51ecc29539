//! Link rewriting: every navigable or resource URL in a fetched page is replaced by a
//! `{prefix}/proxy?url=...` URL so follow-on requests come back through the proxy.

pub mod document;
pub mod html;
pub mod url;

pub use self::html::{rewrite_html, TagKind};
pub use self::url::{proxy_url, rewrite_srcset, rewrite_url};
pub use document::Document;

/// Per-call rewrite inputs: where the page came from and the proxy's route prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    pub base_url: String,
    pub proxy_prefix: String,
}

impl RewriteContext {
    pub fn new(base_url: impl Into<String>, proxy_prefix: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            proxy_prefix: proxy_prefix.into(),
        }
    }
}
