use std::future::Future;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, RANGE};

use crate::{
    error::{VidlensError, VidlensResult},
    util::http::HttpClient,
    ByteRange,
};

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Byte transport. The pipeline never talks to the network directly.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
        byterange: Option<&ByteRange>,
    ) -> impl Future<Output = VidlensResult<FetchResponse>> + Send;
}

impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str, byterange: Option<&ByteRange>) -> VidlensResult<FetchResponse> {
        let mut request = self.get(url);
        if let Some(byterange) = byterange {
            request = request.header(RANGE, byterange.to_http_range());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::warn!("Error body: {body}");
            }
            return Err(VidlensError::HttpError(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok(FetchResponse {
            bytes,
            content_type,
        })
    }
}

impl<F> Fetcher for std::sync::Arc<F>
where
    F: Fetcher,
{
    fn fetch(
        &self,
        url: &str,
        byterange: Option<&ByteRange>,
    ) -> impl Future<Output = VidlensResult<FetchResponse>> + Send {
        self.as_ref().fetch(url, byterange)
    }
}
