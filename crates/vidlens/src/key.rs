use std::{borrow::Borrow, fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

static CONTENT_RANGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bytes ([0-9]+)-([0-9]+)/(?:[0-9]+|\*)").unwrap());

/// Inclusive byte range, `end` is the last byte of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Convert the `length@offset` form used by HLS.
    pub fn from_offset_length(offset: u64, length: u64) -> Self {
        Self {
            start: offset,
            end: (offset + length).saturating_sub(1),
        }
    }

    pub fn len(&self) -> u64 {
        self.end.checked_sub(self.start).map_or(0, |span| span + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn to_http_range(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Parse a `Content-Range` response header, e.g. `bytes 0-999/2000`.
    pub fn from_content_range(header: &str) -> Option<Self> {
        let captures = CONTENT_RANGE_REGEX.captures(header)?;
        let start = captures[1].parse().ok()?;
        let end = captures[2].parse().ok()?;
        Some(Self { start, end })
    }
}

/// Identity of a fetchable resource: its URL plus an optional byte range.
///
/// Keys are compared as strings, so the same `(url, byterange)` pair always
/// yields the same key no matter where it was computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(url: &str, byterange: Option<&ByteRange>) -> Self {
        match byterange {
            Some(ByteRange { start, end }) => Self(format!("{url}-start-{start}-end-{end}")),
            None => Self(url.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

pub fn make_key(url: &str, byterange: Option<&ByteRange>) -> ResourceKey {
    ResourceKey::new(url, byterange)
}
