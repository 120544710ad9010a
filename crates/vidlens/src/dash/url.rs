use std::path::Path;

use url::Url;

use crate::{ByteRange, VidlensError, VidlensResult};

pub(crate) fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://")
        || s.starts_with("https://")
        || s.starts_with("file://")
        || s.starts_with("ftp://")
}

/// Base URL of a manifest. Local manifests resolve against their file path.
pub(crate) fn manifest_base_url(url: &str) -> VidlensResult<Url> {
    if let Ok(url) = Url::parse(url) {
        return Ok(url);
    }

    let path = std::path::absolute(Path::new(url))?;
    Url::from_file_path(&path)
        .map_err(|_| VidlensError::UnsupportedInput(format!("cannot resolve manifest location {url}")))
}

pub(crate) fn merge_baseurls(current: &Url, new: &str) -> VidlensResult<Url> {
    if is_absolute_url(new) {
        Ok(Url::parse(new)?)
    } else {
        // The query of the current URL is kept unless the new URL brings its own.
        //
        // merge_baseurls(https://example.com/manifest.mpd?auth=secret, /video42.mp4) =>
        //   https://example.com/video42.mp4?auth=secret
        let mut merged = current.join(new)?;
        if merged.query().is_none() {
            merged.set_query(current.query());
        }
        Ok(merged)
    }
}

/// Resolve a template or source URL, keeping it unchanged when it cannot be joined.
pub(crate) fn resolve_url(base: &Url, path: &str) -> String {
    merge_baseurls(base, path)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| path.to_string())
}

/// Parse an `a-b` byte range as used by `indexRange` and `Initialization@range`.
pub(crate) fn parse_media_range<S>(s: S) -> VidlensResult<ByteRange>
where
    S: AsRef<str>,
{
    let invalid = || VidlensError::MpdParsing(format!("Invalid media range {}", s.as_ref()));

    let (start, end) = s.as_ref().trim().split_once('-').ok_or_else(invalid)?;
    let start = start.parse::<u64>().map_err(|_| invalid())?;
    let end = end.parse::<u64>().map_err(|_| invalid())?;
    if end < start {
        return Err(invalid());
    }

    Ok(ByteRange::new(start, end))
}
