pub mod allowlist;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod metrics;
pub mod proxy;
pub mod rewrite;
pub mod server;

pub use config::{ProxyConfig, Settings};
pub use error::{ProxyError, Result};
pub use proxy::{Body, Proxy, Served};
