use aes::cipher::block_padding::UnpadError;
use thiserror::Error;

use crate::ResourceKey;

#[derive(Error, Debug)]
pub enum VidlensError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Init segment {init_segment} required by {segment} has not been processed")]
    InitSegmentMissing {
        segment: ResourceKey,
        init_segment: ResourceKey,
    },

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Failed to fetch key file {url}: {source}")]
    KeyFetchFailed {
        url: String,
        #[source]
        source: Box<VidlensError>,
    },

    #[error("Malformed box: {0}")]
    MalformedBox(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid AES-128 key: {0:?}")]
    InvalidAes128Key(Vec<u8>),

    #[error("Pkcs7 unpad error")]
    UnpadError(#[from] UnpadError),

    #[error("Invalid m3u8 file: {0}")]
    M3u8ParseError(String),

    #[error("Invalid MPD: {0}")]
    MpdParsing(String),

    #[error("Invalid HAR file: {0}")]
    HarParseError(String),

    #[error("Worker task failed: {0}")]
    TaskJoin(#[source] tokio::task::JoinError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    MpdParseError(#[from] dash_mpd::DashMpdError),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Base64Error(#[from] base64::DecodeError),
}

impl VidlensError {
    /// Whether the failure resolves itself once a dependency is processed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InitSegmentMissing { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type VidlensResult<T> = Result<T, VidlensError>;
