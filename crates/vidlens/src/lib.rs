//! Resolution engine for adaptive-streaming captures.
//!
//! HLS playlists and DASH MPDs are parsed into a line model and a flat
//! [`SegmentDetailsMap`] keyed by [`ResourceKey`], so that segments, init
//! segments and key files seen in any order can be correlated with the
//! manifests that declare them.
//!
//! ```text
//!  manifest ──► parse ──► SegmentDetailsMap ◄── merge
//!                               │
//!  segment ───► key lookup ─────┤
//!                 │             ▼
//!                 │     init buffer cached? ──no──► PendingHandlers
//!                 ▼             │ yes                     │
//!              decrypt ◄────────┘                replay on init
//!                 │
//!           save ─► probe ─► SessionEvent
//! ```

pub mod append;
pub mod dash;
pub mod decrypt;
pub mod details;
pub mod error;
pub mod event;
pub mod fetch;
pub mod handler;
pub mod har;
pub mod hls;
pub mod key;
pub mod manifest;
pub mod mime;
pub mod mp4;
pub mod probe;
pub mod storage;
pub mod util;

pub use details::{SegmentDetails, SegmentDetailsMap};
pub use error::{VidlensError, VidlensResult};
pub use fetch::{FetchResponse, Fetcher};
pub use key::{make_key, ByteRange, ResourceKey};
pub use util::http::HttpClient;

// Re-export crates that appear in the public API
pub use bytes;
pub use tokio_util::sync::CancellationToken;
