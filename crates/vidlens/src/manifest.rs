use serde::Serialize;

use crate::{
    dash::{self, DashSegment, UnsupportedNode},
    details::{ManifestAttributes, Resolution, SegmentDetailsMap},
    fetch::Fetcher,
    hls::{self, HlsPlaylist},
    mime::Dialect,
    ByteRange, ResourceKey, VidlensResult,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedUri {
    /// URI as written in the manifest
    pub uri: String,
    pub absolute_uri: String,
    pub key: ResourceKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byterange: Option<ByteRange>,
}

impl ParsedUri {
    pub fn new(uri: String, absolute_uri: String) -> Self {
        let key = ResourceKey::new(&absolute_uri, None);
        Self {
            uri,
            absolute_uri,
            key,
            byterange: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byterange: Option<ByteRange>,
}

/// The segment an `EXTINF` line describes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicableSegment {
    pub key: ResourceKey,
    pub url: String,
    pub byterange: Option<ByteRange>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestLine {
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_uri: Option<ParsedUri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_value: Option<ParsedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicable_segment: Option<ApplicableSegment>,
    /// Segments derived from the DASH element on this line.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<DashSegment>,
}

impl ManifestLine {
    pub fn raw(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub url: String,
    pub dialect: Dialect,
    pub is_main: bool,
    pub lines: Vec<ManifestLine>,
    pub segment_details_map: SegmentDetailsMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendition_attributes: Option<Vec<ManifestAttributes>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discontinuity_sequence: Option<u64>,
    /// Whether an HLS media playlist is complete (`EXT-X-ENDLIST`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_list: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_update_period: Option<f64>,
    /// DASH elements whose addressing is recognised but not supported.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unsupported: Vec<UnsupportedNode>,
}

impl ManifestDocument {
    /// Attributes of the rendition served at `url`, when this is a main manifest.
    pub fn rendition_for(&self, url: &str) -> Option<&ManifestAttributes> {
        self.rendition_attributes
            .as_ref()?
            .iter()
            .find(|attributes| attributes.url.as_deref() == Some(url))
    }
}

fn parse_hls_manifest(
    text: &str,
    url: &str,
    attributes: Option<&ManifestAttributes>,
) -> ManifestDocument {
    let is_main = hls::is_main_playlist(text);
    let lines = if is_main {
        hls::get_hls_main_manifest_lines(text, url)
    } else {
        hls::get_hls_media_manifest_lines(text, url)
    };

    let mut document = ManifestDocument {
        url: url.to_string(),
        dialect: Dialect::Hls,
        is_main,
        lines,
        segment_details_map: SegmentDetailsMap::new(),
        rendition_attributes: None,
        target_duration: None,
        media_sequence: None,
        discontinuity_sequence: None,
        end_list: None,
        minimum_update_period: None,
        unsupported: Vec::new(),
    };

    match hls::parse_hls(text, url, is_main) {
        Ok(HlsPlaylist::Main(playlist)) => {
            document.rendition_attributes = Some(
                playlist
                    .variants
                    .iter()
                    .map(|variant| ManifestAttributes {
                        url: Some(variant.uri.clone()),
                        bandwidth: Some(variant.bandwidth),
                        resolution: variant
                            .resolution
                            .map(|(width, height)| Resolution { width, height }),
                    })
                    .collect(),
            );
        }
        Ok(HlsPlaylist::Media(playlist)) => {
            document.target_duration = Some(playlist.target_duration);
            document.media_sequence = Some(playlist.media_sequence);
            document.discontinuity_sequence = Some(playlist.discontinuity_sequence);
            document.end_list = Some(playlist.end_list);
            document.segment_details_map = SegmentDetailsMap::from_hls_media(&playlist, attributes);
        }
        Err(e) => {
            log::warn!("Failed to parse playlist structure of {url}: {e}");
            if !is_main {
                document.segment_details_map =
                    SegmentDetailsMap::from_hls_lines(&document.lines, attributes);
            }
        }
    }

    document
}

async fn parse_dash_manifest<F>(fetcher: &F, text: &str, url: &str) -> VidlensResult<ManifestDocument>
where
    F: Fetcher,
{
    let dash_lines = dash::get_dash_manifest_lines(fetcher, text, url).await?;
    let mut segment_details_map = SegmentDetailsMap::from_dash_segments(
        dash_lines.lines.iter().flat_map(|line| line.segments.iter()),
    );

    let model = match dash::DashModel::parse(text, url) {
        Ok(model) => Some(model),
        Err(e) => {
            tracing::warn!("Failed to read MPD model of {url}: {e}");
            None
        }
    };

    if segment_details_map.is_empty() {
        if let Some(model) = &model {
            segment_details_map = SegmentDetailsMap::from_dash_segments(&model.segments);
        }
    }

    Ok(ManifestDocument {
        url: url.to_string(),
        dialect: Dialect::Dash,
        is_main: true,
        lines: dash_lines.lines,
        segment_details_map,
        minimum_update_period: model.as_ref().and_then(|m| m.minimum_update_period),
        rendition_attributes: model.map(|m| m.rendition_attributes),
        target_duration: None,
        media_sequence: None,
        discontinuity_sequence: None,
        end_list: None,
        unsupported: dash_lines.unsupported,
    })
}

/// Parse a manifest into its line model and segment details map.
///
/// `attributes` are the rendition attributes of an HLS media playlist, they
/// are copied onto every segment entry.
pub async fn parse_manifest<F>(
    fetcher: &F,
    text: &str,
    url: &str,
    dialect: Dialect,
    attributes: Option<&ManifestAttributes>,
) -> VidlensResult<ManifestDocument>
where
    F: Fetcher,
{
    match dialect {
        Dialect::Hls => Ok(parse_hls_manifest(text, url, attributes)),
        Dialect::Dash => parse_dash_manifest(fetcher, text, url).await,
    }
}
