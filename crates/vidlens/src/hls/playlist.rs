use m3u8_rs::{KeyMethod, MasterPlaylist, MediaPlaylist};

use crate::{
    error::{VidlensError, VidlensResult},
    util::absolute_uri_or_relative,
    ByteRange,
};

#[derive(Debug, Clone, PartialEq)]
pub struct HlsKey {
    pub method: String,
    /// Absolute key URI
    pub uri: Option<String>,
    pub iv: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HlsMap {
    pub uri: String,
    pub byterange: Option<ByteRange>,
}

#[derive(Debug, Clone)]
pub struct HlsSegment {
    pub uri: String,
    pub byterange: Option<ByteRange>,
    pub duration: f64,
    pub timeline: u64,
    pub key: Option<HlsKey>,
    pub map: Option<HlsMap>,
}

#[derive(Debug, Clone)]
pub struct HlsMediaPlaylist {
    pub target_duration: f64,
    pub media_sequence: u64,
    pub discontinuity_sequence: u64,
    pub end_list: bool,
    pub segments: Vec<HlsSegment>,
}

#[derive(Debug, Clone)]
pub struct HlsVariant {
    pub uri: String,
    pub bandwidth: u64,
    pub resolution: Option<(u64, u64)>,
}

#[derive(Debug, Clone)]
pub struct HlsMainPlaylist {
    pub variants: Vec<HlsVariant>,
}

#[derive(Debug, Clone)]
pub enum HlsPlaylist {
    Main(HlsMainPlaylist),
    Media(HlsMediaPlaylist),
}

fn key_method_name(method: &KeyMethod) -> String {
    match method {
        KeyMethod::None => "NONE".to_string(),
        KeyMethod::AES128 => "AES-128".to_string(),
        KeyMethod::SampleAES => "SAMPLE-AES".to_string(),
        KeyMethod::Other(name) => name.clone(),
    }
}

/// Absolute byte range of an HLS sub-range, continuing at `next_offset` when
/// the offset is omitted.
fn to_byterange(range: &m3u8_rs::ByteRange, next_offset: u64) -> Option<ByteRange> {
    if range.length == 0 {
        return None;
    }
    Some(ByteRange::from_offset_length(
        range.offset.unwrap_or(next_offset),
        range.length,
    ))
}

fn normalize_media(playlist: MediaPlaylist, url: &str) -> HlsMediaPlaylist {
    let mut key: Option<HlsKey> = None;
    let mut map: Option<HlsMap> = None;
    let mut timeline = playlist.discontinuity_sequence;
    let mut next_offset = 0;

    let mut segments = Vec::with_capacity(playlist.segments.len());
    for segment in playlist.segments {
        // Keys and maps apply to every following segment until replaced
        if let Some(k) = &segment.key {
            key = match k.method {
                KeyMethod::None => None,
                _ => Some(HlsKey {
                    method: key_method_name(&k.method),
                    uri: k.uri.as_deref().map(|uri| absolute_uri_or_relative(uri, url)),
                    iv: k.iv.clone(),
                }),
            };
        }

        if let Some(m) = &segment.map {
            map = Some(HlsMap {
                uri: absolute_uri_or_relative(&m.uri, url),
                byterange: m.byte_range.as_ref().and_then(|r| to_byterange(r, 0)),
            });
        }

        if segment.discontinuity {
            timeline += 1;
        }

        let byterange = segment
            .byte_range
            .as_ref()
            .and_then(|r| to_byterange(r, next_offset));
        if let Some(byterange) = byterange {
            next_offset = byterange.end + 1;
        }

        segments.push(HlsSegment {
            uri: absolute_uri_or_relative(&segment.uri, url),
            byterange,
            duration: segment.duration as f64,
            timeline,
            key: key.clone(),
            map: map.clone(),
        });
    }

    HlsMediaPlaylist {
        target_duration: playlist.target_duration as f64,
        media_sequence: playlist.media_sequence,
        discontinuity_sequence: playlist.discontinuity_sequence,
        end_list: playlist.end_list,
        segments,
    }
}

fn normalize_main(playlist: MasterPlaylist, url: &str) -> HlsMainPlaylist {
    let variants = playlist
        .variants
        .into_iter()
        .filter(|variant| !variant.is_i_frame)
        .map(|variant| HlsVariant {
            uri: absolute_uri_or_relative(&variant.uri, url),
            bandwidth: variant.bandwidth,
            resolution: variant.resolution.map(|r| (r.width, r.height)),
        })
        .collect();
    HlsMainPlaylist { variants }
}

/// Parse the structure of a playlist whose kind is already known.
pub fn parse_hls(manifest: &str, url: &str, is_main: bool) -> VidlensResult<HlsPlaylist> {
    if is_main {
        let playlist = m3u8_rs::parse_master_playlist_res(manifest.as_bytes())
            .map_err(|_| VidlensError::M3u8ParseError(url.to_string()))?;
        Ok(HlsPlaylist::Main(normalize_main(playlist, url)))
    } else {
        let playlist = m3u8_rs::parse_media_playlist_res(manifest.as_bytes())
            .map_err(|_| VidlensError::M3u8ParseError(url.to_string()))?;
        Ok(HlsPlaylist::Media(normalize_media(playlist, url)))
    }
}
