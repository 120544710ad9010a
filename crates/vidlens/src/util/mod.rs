pub mod http;

use url::Url;

/// Resolve `uri` against `base`, leaving it untouched when `base` is not absolute.
pub fn absolute_uri_or_relative(uri: &str, base: &str) -> String {
    if uri.is_empty() || base.is_empty() {
        return uri.to_string();
    }

    match Url::parse(base).and_then(|base| base.join(uri)) {
        Ok(url) => url.to_string(),
        Err(_) => uri.to_string(),
    }
}

/// Path part of a URL, used as a compact display name.
pub fn short_url(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|url| url.path().to_string())
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
