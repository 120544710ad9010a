use std::sync::LazyLock;

use regex::Regex;

use crate::{
    manifest::{ApplicableSegment, ManifestLine, ParsedUri, ParsedValue},
    util::absolute_uri_or_relative,
    ByteRange, ResourceKey,
};

static LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(EXT[A-Za-z0-9-]+)(:|$)(.*)").unwrap());
static CUSTOM_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([A-Za-z0-9-]+)(:|$)(.*)").unwrap());

/// Tags whose `URI` attribute points at another playlist.
const URI_TAGS: [&str; 2] = ["EXT-X-MEDIA", "EXT-X-I-FRAME-STREAM-INF"];

/// A media playlist always declares `EXT-X-TARGETDURATION`.
pub fn is_main_playlist(manifest: &str) -> bool {
    !manifest
        .lines()
        .any(|line| line.trim_start().starts_with("#EXT-X-TARGETDURATION"))
}

fn get_uri(tag: &str, value: &str, manifest_url: &str) -> Option<ParsedUri> {
    if value.is_empty() || !URI_TAGS.contains(&tag) {
        return None;
    }

    let uri_start = value.find("URI=\"")? + "URI=\"".len();
    let uri_len = value[uri_start..].find('"')?;
    let uri = &value[uri_start..uri_start + uri_len];

    Some(ParsedUri::new(
        uri.to_string(),
        absolute_uri_or_relative(uri, manifest_url),
    ))
}

/// `length@offset`. Without an offset the range continues at `next_offset`.
fn parse_byterange(value: &str, next_offset: u64) -> Option<ByteRange> {
    let (length, offset) = match value.split_once('@') {
        Some((length, offset)) => (length.trim(), offset.trim().parse().ok()?),
        None => (value.trim(), next_offset),
    };
    let length: u64 = length.parse().ok()?;
    if length == 0 {
        return None;
    }
    Some(ByteRange::from_offset_length(offset, length))
}

fn parse_duration(value: &str) -> Option<f64> {
    value.split(',').next()?.trim().parse().ok()
}

fn split_hls_line(line: &str, manifest_url: &str, next_offset: u64) -> ManifestLine {
    let mut details = ManifestLine::raw(line);
    if line.trim().is_empty() {
        return details;
    }

    if !line.starts_with('#') {
        details.parsed_uri = Some(ParsedUri::new(
            line.to_string(),
            absolute_uri_or_relative(line, manifest_url),
        ));
        return details;
    }

    // Anything that is neither a known nor a custom tag is a comment
    let Some(captures) = LINE_REGEX
        .captures(line)
        .or_else(|| CUSTOM_LINE_REGEX.captures(line))
    else {
        return details;
    };

    let tag = captures[1].to_string();
    let value = captures[3].to_string();
    details.parsed_uri = get_uri(&tag, &value, manifest_url);
    details.parsed_value = match tag.as_str() {
        "EXTINF" => Some(ParsedValue {
            duration: parse_duration(&value),
            byterange: None,
        }),
        "EXT-X-BYTERANGE" => Some(ParsedValue {
            duration: None,
            byterange: parse_byterange(&value, next_offset),
        }),
        _ => None,
    };
    details.tag = Some(tag);
    details.value = Some(value);

    details
}

/// Split a media playlist into lines.
///
/// An `EXT-X-BYTERANGE` applies to the next URI line only. Every `EXTINF`
/// line is linked to the segment on the next URI line.
pub fn get_hls_media_manifest_lines(manifest: &str, url: &str) -> Vec<ManifestLine> {
    let mut last_byterange: Option<ByteRange> = None;
    let mut next_offset = 0;

    let mut lines: Vec<ManifestLine> = manifest
        .lines()
        .map(|line| {
            let mut details = split_hls_line(line, url, next_offset);

            if details.tag.as_deref() == Some("EXT-X-BYTERANGE") {
                last_byterange = details.parsed_value.as_ref().and_then(|p| p.byterange);
                if let Some(byterange) = last_byterange {
                    next_offset = byterange.end + 1;
                }
            }

            if let Some(uri) = details.parsed_uri.as_mut() {
                uri.byterange = last_byterange.take();
                uri.key = ResourceKey::new(&uri.absolute_uri, uri.byterange.as_ref());
            }

            details
        })
        .collect();

    for index in 0..lines.len() {
        if lines[index].tag.as_deref() != Some("EXTINF") {
            continue;
        }

        let applicable_segment = lines[index + 1..]
            .iter()
            .find_map(|line| line.parsed_uri.as_ref())
            .map(|uri| ApplicableSegment {
                key: uri.key.clone(),
                url: uri.absolute_uri.clone(),
                byterange: uri.byterange,
            });
        if applicable_segment.is_none() {
            log::debug!("EXTINF on line {} has no segment URI after it", index + 1);
        }
        lines[index].applicable_segment = applicable_segment;
    }

    lines
}

/// Split a main playlist into lines. Rendition URIs never carry byte ranges.
pub fn get_hls_main_manifest_lines(manifest: &str, url: &str) -> Vec<ManifestLine> {
    manifest
        .lines()
        .map(|line| split_hls_line(line, url, 0))
        .collect()
}
