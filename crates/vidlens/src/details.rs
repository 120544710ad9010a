use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};

use crate::{
    dash::DashSegment,
    decrypt::derive_iv,
    hls::playlist::HlsMediaPlaylist,
    manifest::ManifestLine,
    ByteRange, ResourceKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u64,
    pub height: u64,
}

/// Simplified attributes of the rendition a segment belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitSegmentRef {
    pub url: String,
    pub byterange: Option<ByteRange>,
}

impl InitSegmentRef {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.url, self.byterange.as_ref())
    }
}

fn serialize_iv<S: Serializer>(iv: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(iv)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFileDescriptor {
    pub uri: String,
    pub method: String,
    #[serde(serialize_with = "serialize_iv")]
    pub iv: [u8; 16],
    #[serde(skip)]
    pub key_bytes: Option<[u8; 16]>,
}

impl KeyFileDescriptor {
    pub fn is_aes128(&self) -> bool {
        self.method == "AES-128"
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.uri, None)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDetails {
    pub is_init_segment: bool,
    pub uri: String,
    pub byterange: Option<ByteRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_attributes: Option<ManifestAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<f64>,
    /// Key of the initialization segment entry in the same map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_segment: Option<ResourceKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<KeyFileDescriptor>,
    /// Raw bytes of an initialization segment once it has been seen.
    #[serde(skip)]
    pub buffer: Option<Bytes>,
}

impl SegmentDetails {
    fn init(uri: String, byterange: Option<ByteRange>) -> Self {
        Self {
            is_init_segment: true,
            uri,
            byterange,
            ..Default::default()
        }
    }
}

/// Flat index from [`ResourceKey`] to everything known about a segment.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDetailsMap {
    pub entries: HashMap<ResourceKey, SegmentDetails>,
    /// Key files by their URI, holding the fetched key bytes once known.
    pub key_files: HashMap<ResourceKey, KeyFileDescriptor>,
}

impl SegmentDetailsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&SegmentDetails> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &ResourceKey) -> Option<&mut SegmentDetails> {
        self.entries.get_mut(key)
    }

    pub fn insert(&mut self, key: ResourceKey, details: SegmentDetails) {
        self.entries.insert(key, details);
    }

    /// Initialization segment entry `details` depends on.
    pub fn init_segment_of(&self, details: &SegmentDetails) -> Option<(&ResourceKey, &SegmentDetails)> {
        let key = details.init_segment.as_ref()?;
        self.entries.get_key_value(key)
    }

    pub fn key_bytes(&self, key_uri: &str) -> Option<[u8; 16]> {
        self.key_files.get(key_uri)?.key_bytes
    }

    pub fn set_key_bytes(&mut self, descriptor: &KeyFileDescriptor, key_bytes: [u8; 16]) {
        self.key_files
            .entry(descriptor.key())
            .or_insert_with(|| descriptor.clone())
            .key_bytes = Some(key_bytes);
    }

    fn register_key_file(&mut self, descriptor: &KeyFileDescriptor) {
        self.key_files
            .entry(descriptor.key())
            .and_modify(|existing| {
                existing.method = descriptor.method.clone();
                existing.iv = descriptor.iv;
            })
            .or_insert_with(|| descriptor.clone());
    }

    /// Merge a freshly parsed map into this one.
    ///
    /// Newer entries replace older ones, but cached init buffers and key
    /// bytes survive so that a refreshed playlist does not orphan segments.
    pub fn merge(&mut self, other: SegmentDetailsMap) {
        for (key, mut details) in other.entries {
            if details.buffer.is_none() {
                details.buffer = self.entries.get(&key).and_then(|d| d.buffer.clone());
            }
            self.entries.insert(key, details);
        }
        for (key, mut descriptor) in other.key_files {
            if descriptor.key_bytes.is_none() {
                descriptor.key_bytes = self.key_files.get(&key).and_then(|d| d.key_bytes);
            }
            self.key_files.insert(key, descriptor);
        }
    }

    pub fn from_hls_media(
        playlist: &HlsMediaPlaylist,
        attributes: Option<&ManifestAttributes>,
    ) -> Self {
        let mut map = Self::new();

        for (index, segment) in playlist.segments.iter().enumerate() {
            let key = ResourceKey::new(&segment.uri, segment.byterange.as_ref());
            let mut details = SegmentDetails {
                is_init_segment: false,
                uri: segment.uri.clone(),
                byterange: segment.byterange,
                manifest_attributes: attributes.cloned(),
                timeline: Some(segment.timeline as f64),
                ..Default::default()
            };

            if let Some(hls_key) = &segment.key {
                if let Some(uri) = &hls_key.uri {
                    let descriptor = KeyFileDescriptor {
                        uri: uri.clone(),
                        method: hls_key.method.clone(),
                        iv: derive_iv(hls_key.iv.as_deref(), playlist.media_sequence, index),
                        key_bytes: None,
                    };
                    map.register_key_file(&descriptor);
                    details.key_file = Some(descriptor);
                }
            }

            if let Some(hls_map) = &segment.map {
                let init_key = ResourceKey::new(&hls_map.uri, hls_map.byterange.as_ref());
                map.entries
                    .entry(init_key.clone())
                    .or_insert_with(|| SegmentDetails::init(hls_map.uri.clone(), hls_map.byterange));
                details.init_segment = Some(init_key);
            }

            map.entries.insert(key, details);
        }

        map
    }

    /// Segments of a media playlist whose structure could not be parsed,
    /// taken from the line walk alone.
    pub fn from_hls_lines(lines: &[ManifestLine], attributes: Option<&ManifestAttributes>) -> Self {
        let mut map = Self::new();
        for segment in lines.iter().filter_map(|line| line.applicable_segment.as_ref()) {
            map.entries.insert(
                segment.key.clone(),
                SegmentDetails {
                    is_init_segment: false,
                    uri: segment.url.clone(),
                    byterange: segment.byterange,
                    manifest_attributes: attributes.cloned(),
                    timeline: Some(0.0),
                    ..Default::default()
                },
            );
        }
        map
    }

    pub fn from_dash_segments<'a>(segments: impl IntoIterator<Item = &'a DashSegment>) -> Self {
        let mut map = Self::new();

        for segment in segments {
            let mut details = SegmentDetails {
                is_init_segment: false,
                uri: segment.url.clone(),
                byterange: segment.byterange,
                manifest_attributes: segment.manifest_attributes.clone(),
                timeline: Some(segment.timeline),
                ..Default::default()
            };

            if let Some(init_segment) = &segment.init_segment {
                let init_key = init_segment.key();
                map.entries.entry(init_key.clone()).or_insert_with(|| {
                    SegmentDetails::init(init_segment.url.clone(), init_segment.byterange)
                });
                details.init_segment = Some(init_key);
            }

            map.entries.insert(segment.key.clone(), details);
        }

        map
    }
}
