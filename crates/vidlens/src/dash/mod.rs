//! # MPEG-DASH manifests
//!
//! The MPD is walked as an XML tree so that derived segments can be attached to
//! the exact line of the element that declares them. Addressing is resolved at
//! the deepest level that declares it:
//!
//! *   `SegmentTemplate`, with or without a `SegmentTimeline`, see [`template`]
//!     and [`timeline`].
//! *   `SegmentBase`, by fetching and parsing the `sidx` box at `indexRange`, see
//!     [`sidx`].
//! *   `SegmentList` is recognised and reported as unsupported.
//!
//! [`DashModel`] reads the same document through `dash-mpd` for the values the
//! line walk does not produce.

mod duration;
mod lines;
mod model;
pub mod sidx;
pub mod template;
pub mod timeline;
mod url;
pub mod xml;

use serde::Serialize;

use crate::{
    details::{InitSegmentRef, ManifestAttributes},
    ByteRange, ResourceKey,
};

pub use duration::parse_xsd_duration;
pub use lines::{get_dash_manifest_lines, SEGMENTS_ID_ATTRIBUTE};
pub use model::DashModel;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashSegment {
    /// Start of the owning period in seconds.
    pub timeline: f64,
    pub url: String,
    pub short_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byterange: Option<ByteRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub start: f64,
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_segment: Option<InitSegmentRef>,
    pub key: ResourceKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_attributes: Option<ManifestAttributes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnsupportedAddressing {
    SegmentList,
    WebM,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedNode {
    /// e.g. `Representation-0-AdaptationSet-1-Period-0`
    pub node_id: String,
    pub addressing: UnsupportedAddressing,
}

/// Outcome of resolving the addressing of one MPD element.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentDerivation {
    Segments(Vec<DashSegment>),
    /// Addressing is declared but cannot be expanded.
    Unsupported(UnsupportedAddressing),
    /// Nothing usable at this level; the parent element gets a try.
    Missing,
}

#[derive(Debug, Clone, Default)]
pub struct DashManifestLines {
    pub lines: Vec<crate::manifest::ManifestLine>,
    pub unsupported: Vec<UnsupportedNode>,
}
