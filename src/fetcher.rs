use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::debug;

/// Outcome of one upstream GET.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Html { text: String, url: String },
    Binary { bytes: Vec<u8>, content_type: String },
    HttpError { status: u16 },
    TransportError { cause: String, timed_out: bool },
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
}

/// Content-type based classification. Only `text/html` is treated as a document.
pub fn is_html_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

/// Single GET per call with the configured User-Agent and timeout, no retries.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn transport_error(e: reqwest::Error) -> FetchResult {
    FetchResult::TransportError {
        timed_out: e.is_timeout(),
        cause: e.to_string(),
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return transport_error(e),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            debug!(url = %url, status = status.as_u16(), "Upstream returned non-200");
            return FetchResult::HttpError {
                status: status.as_u16(),
            };
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_ascii_lowercase();

        if is_html_content_type(&content_type) {
            match resp.text().await {
                Ok(text) => FetchResult::Html {
                    text,
                    url: url.to_string(),
                },
                Err(e) => transport_error(e),
            }
        } else {
            match resp.bytes().await {
                Ok(bytes) => FetchResult::Binary {
                    bytes: bytes.to_vec(),
                    content_type,
                },
                Err(e) => transport_error(e),
            }
        }
    }
}
