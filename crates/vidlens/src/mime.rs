use serde::{Deserialize, Serialize};

pub const NORMALIZED_HLS_MIME_TYPE: &str = "application/x-mpegurl";
pub const NORMALIZED_DASH_MIME_TYPE: &str = "application/dash+xml";
pub const MP4_VIDEO_MIME_TYPE: &str = "video/mp4";
pub const MP4_AUDIO_MIME_TYPE: &str = "audio/mp4";
pub const TS_MIME_TYPE: &str = "video/mp2t";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Hls,
    Dash,
}

impl Dialect {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Hls => NORMALIZED_HLS_MIME_TYPE,
            Self::Dash => NORMALIZED_DASH_MIME_TYPE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Manifest,
    Segment,
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedType {
    pub r#type: ResourceType,
    pub mime_type: Option<String>,
}

impl NormalizedType {
    pub fn dialect(&self) -> Option<Dialect> {
        match self.mime_type.as_deref() {
            Some(NORMALIZED_HLS_MIME_TYPE) => Some(Dialect::Hls),
            Some(NORMALIZED_DASH_MIME_TYPE) => Some(Dialect::Dash),
            _ => None,
        }
    }
}

pub fn is_hls_mime_type(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "application/vnd.apple.mpegurl"
            | "audio/mpegurl"
            | "audio/x-mpegurl"
            | "application/x-mpegurl"
            | "video/x-mpegurl"
            | "video/mpegurl"
            | "application/mpegurl"
    )
}

pub fn is_dash_mime_type(mime_type: &str) -> bool {
    mime_type == NORMALIZED_DASH_MIME_TYPE
}

pub fn is_manifest_mime_type(mime_type: &str) -> bool {
    is_hls_mime_type(mime_type) || is_dash_mime_type(mime_type)
}

pub fn is_mp4_mime_type(mime_type: &str) -> bool {
    matches!(mime_type, MP4_VIDEO_MIME_TYPE | MP4_AUDIO_MIME_TYPE)
}

pub fn is_segment_mime_type(mime_type: &str) -> bool {
    mime_type == TS_MIME_TYPE || is_mp4_mime_type(mime_type)
}

pub fn is_webm_mime_type(mime_type: &str) -> bool {
    matches!(mime_type, "video/webm" | "audio/webm")
}

/// Some servers answer with a generic binary type, the extension decides then.
pub fn is_generic_mime_type(mime_type: &str) -> bool {
    mime_type == "application/octet-stream"
}

pub fn is_manifest_extension(extension: &str) -> bool {
    matches!(extension, "m3u8" | "mpd")
}

pub fn is_mp4_segment_extension(extension: &str) -> bool {
    matches!(extension, "mp4" | "m4s" | "m4f" | "m4v" | "m4a")
}

pub fn is_segment_extension(extension: &str) -> bool {
    extension == "ts" || is_mp4_segment_extension(extension)
}

/// `text/html` and XHTML responses mean the URL pointed at a page, not media.
pub fn is_website_content_type(content_type: &str) -> bool {
    content_type.starts_with("text/html") || content_type.starts_with("application/xhtml+xml")
}

pub fn mime_type_to_extension(mime_type: &str) -> Option<&'static str> {
    if is_mp4_mime_type(mime_type) {
        Some("mp4")
    } else if mime_type == TS_MIME_TYPE {
        Some("ts")
    } else {
        None
    }
}

pub fn extension_to_mime_type(extension: &str) -> Option<&'static str> {
    match extension {
        "m4a" => Some(MP4_AUDIO_MIME_TYPE),
        "ts" => Some(TS_MIME_TYPE),
        ext if is_mp4_segment_extension(ext) => Some(MP4_VIDEO_MIME_TYPE),
        _ => None,
    }
}

/// Extension of the last path component of a URL or file name.
pub fn get_extension(url: &str) -> Option<String> {
    let path = match url::Url::parse(url) {
        Ok(url) => url.path().to_string(),
        // Local file names are not valid URLs, use them as they are
        Err(_) => url.to_string(),
    };
    let file_name = path.rsplit('/').next().unwrap_or(&path);
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Strip codec parameters, e.g. `video/mp4; codecs="avc1"` becomes `video/mp4`.
pub fn strip_mime_parameters(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn normalize_manifest_mime_type(mime_type: Option<&str>, extension: Option<&str>) -> Option<String> {
    match mime_type {
        Some(mime) if is_hls_mime_type(mime) => return Some(NORMALIZED_HLS_MIME_TYPE.to_string()),
        Some(mime) if is_dash_mime_type(mime) => {
            return Some(NORMALIZED_DASH_MIME_TYPE.to_string())
        }
        _ => {}
    }

    match extension {
        Some("m3u8") => Some(NORMALIZED_HLS_MIME_TYPE.to_string()),
        Some("mpd") => Some(NORMALIZED_DASH_MIME_TYPE.to_string()),
        _ => None,
    }
}

/// Classify a resource from its MIME type, falling back to its extension.
pub fn get_normalized_type(mime_type: Option<&str>, url: &str) -> NormalizedType {
    let mime_type = mime_type.map(strip_mime_parameters).filter(|m| !m.is_empty());
    let extension = get_extension(url);
    let extension = extension.as_deref();

    let is_manifest = mime_type.as_deref().is_some_and(is_manifest_mime_type)
        || extension.is_some_and(is_manifest_extension);
    if is_manifest {
        return NormalizedType {
            r#type: ResourceType::Manifest,
            mime_type: normalize_manifest_mime_type(mime_type.as_deref(), extension),
        };
    }

    let mime_type = match mime_type {
        Some(mime) if is_generic_mime_type(&mime) => extension
            .and_then(extension_to_mime_type)
            .map(str::to_string)
            .or(Some(mime)),
        mime_type => mime_type,
    };

    let is_segment = mime_type.as_deref().is_some_and(is_segment_mime_type)
        || extension.is_some_and(is_segment_extension);
    NormalizedType {
        r#type: if is_segment {
            ResourceType::Segment
        } else {
            ResourceType::Opaque
        },
        mime_type,
    }
}
