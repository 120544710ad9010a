use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    details::{InitSegmentRef, KeyFileDescriptor, ManifestAttributes, Resolution},
    manifest::ManifestDocument,
    mp4::Mp4Box,
    probe::{ProbeFrame, ProbeStream, SegmentTimes, StreamTimeRanges},
    ByteRange, ResourceKey,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestData {
    pub key: ResourceKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byterange: Option<ByteRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub number: u64,
    pub path: PathBuf,
    pub request_epoch_time: i64,
    pub response_epoch_time: i64,
    pub is_user_request: bool,
    /// Attributes of this rendition, taken from its main manifest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<ManifestAttributes>,
    #[serde(flatten)]
    pub document: ManifestDocument,
    pub session_id: i64,
}

impl ManifestData {
    pub fn url(&self) -> &str {
        &self.document.url
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentData {
    /// Appends carry no URL and therefore no key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<ResourceKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byterange: Option<ByteRange>,
    pub number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_segment: Option<InitSegmentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<KeyFileDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_attributes: Option<ManifestAttributes>,
    pub is_user_request: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<f64>,
    pub streams: Vec<ProbeStream>,
    pub frames: Vec<ProbeFrame>,
    pub stream_time_ranges: Vec<StreamTimeRanges>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub times: Option<SegmentTimes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_epoch_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_epoch_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append_epoch_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boxes: Option<Vec<Mp4Box>>,
    pub session_id: i64,
}

/// Everything the pipeline reports to the outside world.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "name", content = "data", rename_all = "lowercase")]
pub enum SessionEvent {
    Manifest(Box<ManifestData>),
    Segment(Box<SegmentData>),
    Append(Box<SegmentData>),
}

impl SessionEvent {
    pub fn session_id(&self) -> i64 {
        match self {
            Self::Manifest(data) => data.session_id,
            Self::Segment(data) | Self::Append(data) => data.session_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
