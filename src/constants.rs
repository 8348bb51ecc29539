//! Default values shared by configuration, the cache and the landing page.

pub const ONE_MINUTE_IN_SECONDS: u64 = 60;
pub const ONE_HOUR_IN_SECONDS: u64 = 60 * ONE_MINUTE_IN_SECONDS;
pub const ONE_DAY_IN_SECONDS: u64 = 24 * ONE_HOUR_IN_SECONDS;
pub const ONE_YEAR_IN_SECONDS: u64 = 365 * ONE_DAY_IN_SECONDS;

pub const DEFAULT_PATH_PREFIX: &str = "/cachingproxy";
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://example.com", "https://adventofcode.com"];
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = ONE_YEAR_IN_SECONDS;
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const DEFAULT_CACHE_DIR: &str = "cache";
pub const DEFAULT_PORT: u16 = 5000;

// Logging
pub const LOG_DIR: &str = "logs";
pub const LOG_FILE_PREFIX: &str = "proxy.log";
pub const DEFAULT_LOG_DIRECTIVE: &str = "caching_proxy=info";

// Cache file naming
pub const HTML_EXTENSION: &str = ".html";
pub const FALLBACK_EXTENSION: &str = ".bin";
pub const SLASH_MARKER: char = '$';
pub const COLON_MARKER: char = '#';

// Link rewriting
pub const BASE_TARGET: &str = "_self";
pub const VIEWPORT_CONTENT: &str = "width=device-width, initial-scale=1.0";
/// Replaces the `rel` of a primary stylesheet demoted in favour of its alternate.
pub const INERT_STYLESHEET_REL: &str = "ONZIN";

/// Human-friendly rendering of a cache lifetime for the landing page.
pub fn readable_duration(num_seconds: u64) -> String {
    match num_seconds {
        ONE_DAY_IN_SECONDS => "one day".to_string(),
        ONE_YEAR_IN_SECONDS => "one year".to_string(),
        n => format!("{} seconds", n),
    }
}
