//! HLS playlists.
//!
//! [`lines`] keeps the playlist text line-addressable, [`playlist`] reads its
//! structure through `m3u8-rs`.

pub mod lines;
pub mod playlist;

pub use lines::{get_hls_main_manifest_lines, get_hls_media_manifest_lines, is_main_playlist};
pub use playlist::{parse_hls, HlsPlaylist};
