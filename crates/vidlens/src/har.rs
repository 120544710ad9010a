//! Replay of HAR 1.2 network captures.

use std::{collections::HashMap, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::Deserialize;
use url::Url;

use crate::{
    fetch::Fetcher,
    handler::{batch::BatchProcessor, FileData, Handler, SessionState},
    mime::{get_normalized_type, ResourceType},
    probe::Prober,
    storage::Storage,
    ByteRange, VidlensError, VidlensResult,
};

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

#[derive(Debug, Deserialize)]
pub struct Har {
    pub log: HarLog,
}

#[derive(Debug, Deserialize)]
pub struct HarLog {
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    pub started_date_time: String,
    /// Total time of the request in milliseconds.
    #[serde(default)]
    pub time: f64,
    pub request: HarRequest,
    pub response: HarResponse,
}

#[derive(Debug, Deserialize)]
pub struct HarRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct HarHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    pub status: u16,
    #[serde(default, rename = "redirectURL")]
    pub redirect_url: String,
    #[serde(default)]
    pub headers: Vec<HarHeader>,
    pub content: HarContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    #[serde(default)]
    pub mime_type: String,
    pub text: Option<String>,
    pub encoding: Option<String>,
}

impl HarResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }

    fn byterange(&self) -> Option<ByteRange> {
        self.header("content-range")
            .and_then(ByteRange::from_content_range)
    }
}

impl HarContent {
    fn body(&self) -> VidlensResult<Option<Bytes>> {
        let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let body = match self.encoding.as_deref() {
            Some("base64") => STANDARD.decode(text)?,
            _ => text.as_bytes().to_vec(),
        };
        Ok(Some(Bytes::from(body)))
    }
}

fn epoch_millis(started_date_time: &str) -> VidlensResult<i64> {
    chrono::DateTime::parse_from_rfc3339(started_date_time)
        .map(|time| time.timestamp_millis())
        .map_err(|e| {
            VidlensError::HarParseError(format!("invalid startedDateTime {started_date_time}: {e}"))
        })
}

/// Turn a HAR document into the manifest and segment responses it contains,
/// in request order.
///
/// Redirected requests are reported under the URL that was originally
/// requested, so they match the URLs listed in manifests.
pub fn parse_har(bytes: &[u8]) -> VidlensResult<Vec<FileData>> {
    let har: Har =
        serde_json::from_slice(bytes).map_err(|e| VidlensError::HarParseError(e.to_string()))?;

    let mut entries: Vec<_> = har
        .log
        .entries
        .into_iter()
        .filter_map(|entry| match epoch_millis(&entry.started_date_time) {
            Ok(epoch_time) => Some((epoch_time, entry)),
            Err(e) => {
                tracing::warn!("Skipping entry of {}: {e}", entry.request.url);
                None
            }
        })
        .collect();
    entries.sort_by_key(|(epoch_time, _)| *epoch_time);

    let mut redirects: HashMap<String, String> = HashMap::new();
    let mut manifest_number = 0;
    let mut segment_number = 0;
    let mut files = Vec::new();

    for (epoch_time, entry) in entries {
        let response = &entry.response;
        let url = redirects
            .get(&entry.request.url)
            .cloned()
            .unwrap_or(entry.request.url);

        if REDIRECT_STATUSES.contains(&response.status) {
            let redirect_url = Url::parse(&url)
                .and_then(|base| base.join(&response.redirect_url))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| response.redirect_url.clone());
            redirects.insert(redirect_url, url);
            continue;
        }

        if !(200..=299).contains(&response.status) {
            tracing::debug!("Skipping {url} with status {}", response.status);
            continue;
        }

        let mime_type = response.content.mime_type.to_lowercase();
        let normalized = get_normalized_type(Some(&mime_type), &url);
        let number = match normalized.r#type {
            ResourceType::Manifest => &mut manifest_number,
            ResourceType::Segment => &mut segment_number,
            ResourceType::Opaque => {
                tracing::debug!("Skipping {url} of type {mime_type}");
                continue;
            }
        };

        let data = match response.content.body() {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!("Skipping {url} without a body");
                continue;
            }
            Err(e) => {
                tracing::warn!("Skipping {url} with an undecodable body: {e}");
                continue;
            }
        };

        *number += 1;
        files.push(FileData {
            byterange: response.byterange(),
            mime_type: normalized.mime_type,
            data,
            number: *number,
            request_epoch_time: Some(epoch_time),
            response_epoch_time: Some(epoch_time + entry.time as i64),
            url,
        });
    }

    Ok(files)
}

/// Replay a HAR capture through a [`BatchProcessor`], in request order.
pub async fn replay_har<F, S, P>(
    handler: Arc<Handler<F, S, P>>,
    bytes: &[u8],
) -> VidlensResult<SessionState>
where
    F: Fetcher,
    S: Storage,
    P: Prober,
{
    let files = parse_har(bytes)?;
    tracing::info!("Replaying {} entries", files.len());

    let cancel = handler.cancel_token().clone();
    let mut processor = BatchProcessor::new(handler);
    for file in files {
        if cancel.is_cancelled() {
            break;
        }
        let url = file.url.clone();
        if let Err(e) = processor.process(file).await {
            tracing::warn!("Failed to handle {url}: {e}");
        }
    }

    if processor.pending_len() > 0 {
        tracing::warn!(
            "{} segments never got their init segment",
            processor.pending_len()
        );
    }
    Ok(processor.into_state())
}
