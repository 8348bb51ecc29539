use url::Url;

const PASSTHROUGH_PREFIXES: [&str; 4] = ["javascript:", "data:", "#", "mailto:"];

/// `{prefix}/proxy?url=<percent-encoded absolute URL>`.
pub fn proxy_url(absolute: &str, prefix: &str) -> String {
    format!("{}/proxy?url={}", prefix, urlencoding::encode(absolute))
}

/// Routes one link-bearing attribute value through the proxy.
///
/// Empty values and `javascript:`/`data:`/`#`/`mailto:` values come back unchanged, as does
/// a relative value that cannot be resolved against `base`.
pub fn rewrite_url(value: &str, base: &str, prefix: &str) -> String {
    if value.is_empty() || PASSTHROUGH_PREFIXES.iter().any(|p| value.starts_with(p)) {
        return value.to_string();
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        return proxy_url(value, prefix);
    }

    match Url::parse(base).and_then(|b| b.join(value)) {
        Ok(absolute) => proxy_url(absolute.as_str(), prefix),
        Err(_) => value.to_string(),
    }
}

/// Rewrites every candidate URL of a `srcset`, keeping descriptors and order.
pub fn rewrite_srcset(value: &str, base: &str, prefix: &str) -> String {
    value
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?;
            let mut tokens = vec![rewrite_url(url, base, prefix)];
            tokens.extend(parts.map(str::to_string));
            Some(tokens.join(" "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
