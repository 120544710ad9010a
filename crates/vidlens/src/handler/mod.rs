//! Turns fetched or captured resources into resolved manifests and segments.
//!
//! A [`Handler`] holds the collaborators of one session and is shared by
//! reference. The mutable part of a session, the segment details map and the
//! last main manifest, lives in [`SessionState`] and is passed explicitly, so
//! independent requests can run concurrently on their own state while batch
//! sources serialize through [`batch::BatchProcessor`].

pub mod batch;
pub mod pending;

use std::future::Future;

use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;

use crate::{
    decrypt::decrypt,
    details::{InitSegmentRef, KeyFileDescriptor, ManifestAttributes, Resolution, SegmentDetailsMap},
    event::{EventSender, ManifestData, SegmentData, SessionEvent},
    fetch::Fetcher,
    make_key,
    manifest::parse_manifest,
    mime::{
        extension_to_mime_type, get_extension, get_normalized_type, is_mp4_mime_type,
        is_website_content_type, mime_type_to_extension, ResourceType,
    },
    mp4::box_tree,
    probe::{segment_times, stream_time_ranges, Prober},
    storage::{Storage, StorageKind},
    util::{now_millis, short_url},
    ByteRange, VidlensError, VidlensResult,
};

/// Mutable state of a session that handled resources read and extend.
#[derive(Debug, Default)]
pub struct SessionState {
    pub segment_details_map: SegmentDetailsMap,
    /// The most recent main manifest, whose renditions give media manifests
    /// their attributes.
    pub main_manifest: Option<Box<ManifestData>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A resource as it was received.
#[derive(Debug, Clone, Default)]
pub struct FileData {
    /// Request URL, or a file name for local files.
    pub url: String,
    pub mime_type: Option<String>,
    pub data: Bytes,
    pub byterange: Option<ByteRange>,
    pub number: u64,
    pub request_epoch_time: Option<i64>,
    pub response_epoch_time: Option<i64>,
}

impl FileData {
    pub fn key(&self) -> crate::ResourceKey {
        make_key(&self.url, self.byterange.as_ref())
    }
}

/// Initialization segment supplied by the caller instead of the details map.
#[derive(Debug, Clone)]
pub struct InitSegmentInput {
    pub url: String,
    pub byterange: Option<ByteRange>,
    pub buffer: Option<Bytes>,
}

/// Overrides that come with a direct request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub user_request_number: Option<u64>,
    pub init_segment: Option<InitSegmentInput>,
    pub key_file: Option<KeyFileDescriptor>,
    pub manifest_attributes: Option<ManifestAttributes>,
    pub timeline: Option<f64>,
}

/// A segment or an append to resolve.
#[derive(Debug, Clone, Default)]
pub struct SegmentInput {
    pub url: Option<String>,
    pub byterange: Option<ByteRange>,
    pub number: u64,
    pub data: Bytes,
    pub mime_type: Option<String>,
    pub is_append: bool,
    pub request_epoch_time: Option<i64>,
    pub response_epoch_time: Option<i64>,
    pub append_epoch_time: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum HandledFile {
    Manifest(Box<ManifestData>),
    Segment(Box<SegmentData>),
}

fn file_name(options: &RequestOptions, number: u64, extension: Option<&str>) -> String {
    let stem = match options.user_request_number {
        Some(n) => format!("user-request-{n}"),
        None => number.to_string(),
    };
    match extension {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem,
    }
}

/// Cancellation is "no result", not a failure.
fn none_on_cancel<T>(result: VidlensResult<Option<T>>) -> VidlensResult<Option<T>> {
    match result {
        Err(e) if e.is_cancelled() => {
            tracing::debug!("Handling cancelled");
            Ok(None)
        }
        result => result,
    }
}

pub struct Handler<F, S, P> {
    fetcher: F,
    storage: S,
    prober: P,
    events: EventSender,
    session_id: i64,
    cancel: CancellationToken,
}

impl<F, S, P> Handler<F, S, P>
where
    F: Fetcher,
    S: Storage,
    P: Prober,
{
    pub fn new(fetcher: F, storage: S, prober: P, events: EventSender, session_id: i64) -> Self {
        Self {
            fetcher,
            storage,
            prober,
            events,
            session_id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn cancellable<T>(&self, future: impl Future<Output = VidlensResult<T>>) -> VidlensResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(VidlensError::Cancelled),
            result = future => result,
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }

    /// Parse a manifest, persist it and emit a `manifest` event.
    ///
    /// The returned data carries the segment details map of the manifest,
    /// which the caller merges into its running map.
    pub async fn handle_manifest(
        &self,
        file: &FileData,
        main_manifest: Option<&ManifestData>,
        options: &RequestOptions,
    ) -> VidlensResult<Option<ManifestData>> {
        none_on_cancel(self.manifest(file, main_manifest, options).await.map(Some))
    }

    async fn manifest(
        &self,
        file: &FileData,
        main_manifest: Option<&ManifestData>,
        options: &RequestOptions,
    ) -> VidlensResult<ManifestData> {
        let normalized = get_normalized_type(file.mime_type.as_deref(), &file.url);
        let Some(dialect) = normalized.dialect() else {
            return Err(VidlensError::UnsupportedInput(format!(
                "{} is not an HLS or DASH manifest",
                file.url
            )));
        };

        let extension = get_extension(&file.url);
        let path = self
            .cancellable(self.storage.save(
                &file.data,
                StorageKind::Manifest,
                &file_name(options, file.number, extension.as_deref()),
            ))
            .await?;

        let attributes = options.manifest_attributes.clone().or_else(|| {
            main_manifest
                .and_then(|main| main.document.rendition_for(&file.url))
                .cloned()
        });

        let text = String::from_utf8_lossy(&file.data);
        let document = self
            .cancellable(parse_manifest(
                &self.fetcher,
                &text,
                &file.url,
                dialect,
                attributes.as_ref(),
            ))
            .await?;
        tracing::debug!(
            url = %file.url,
            segments = document.segment_details_map.len(),
            is_main = document.is_main,
            "Parsed manifest"
        );

        let now = now_millis();
        let data = ManifestData {
            key: make_key(&file.url, None),
            short_url: short_url(&file.url),
            mime_type: dialect.mime_type().to_string(),
            byterange: file.byterange,
            extension,
            number: file.number,
            path,
            request_epoch_time: file.request_epoch_time.unwrap_or(now),
            response_epoch_time: file.response_epoch_time.unwrap_or(now),
            is_user_request: options.user_request_number.is_some(),
            attributes,
            document,
            session_id: self.session_id,
        };

        self.emit(SessionEvent::Manifest(Box::new(data.clone())));
        Ok(data)
    }

    /// Resolve a segment against `segment_details_map`, persist it and emit it.
    ///
    /// Init segments are cached on their entry and yield `Ok(None)`. A segment
    /// whose init segment has not been seen yet fails with
    /// [`VidlensError::InitSegmentMissing`] and emits nothing.
    pub async fn handle_segment(
        &self,
        segment_details_map: &mut SegmentDetailsMap,
        input: SegmentInput,
        options: &RequestOptions,
    ) -> VidlensResult<Option<SegmentData>> {
        none_on_cancel(self.segment(segment_details_map, input, options).await)
    }

    async fn segment(
        &self,
        segment_details_map: &mut SegmentDetailsMap,
        input: SegmentInput,
        options: &RequestOptions,
    ) -> VidlensResult<Option<SegmentData>> {
        let url = input.url.as_deref().unwrap_or_default();
        let normalized = get_normalized_type(input.mime_type.as_deref(), url);
        let extension = normalized
            .mime_type
            .as_deref()
            .and_then(mime_type_to_extension)
            .map(str::to_string)
            .or_else(|| get_extension(url));
        let mime_type = normalized.mime_type.or_else(|| {
            extension
                .as_deref()
                .and_then(extension_to_mime_type)
                .map(str::to_string)
        });

        let key = input
            .url
            .as_deref()
            .map(|url| make_key(url, input.byterange.as_ref()));
        let details = key.as_ref().and_then(|key| segment_details_map.get(key)).cloned();

        if let (Some(key), Some(details)) = (&key, &details) {
            if details.is_init_segment {
                tracing::trace!("Saving buffer for init segment with key \"{key}\"");
                if let Some(entry) = segment_details_map.get_mut(key) {
                    entry.buffer = Some(input.data);
                }
                return Ok(None);
            }
        }

        let (init_segment, init_buffer) = match &options.init_segment {
            Some(init) => (
                Some(InitSegmentRef {
                    url: init.url.clone(),
                    byterange: init.byterange,
                }),
                init.buffer.clone(),
            ),
            None => match details.as_ref().and_then(|d| segment_details_map.init_segment_of(d)) {
                Some((init_key, init)) => {
                    if init.buffer.is_none() {
                        let segment = key.clone().unwrap_or_else(|| make_key(url, None));
                        tracing::trace!(
                            "Encountered a segment with key \"{segment}\" that requires an \
                             init segment with key \"{init_key}\" that has not yet been processed"
                        );
                        return Err(VidlensError::InitSegmentMissing {
                            segment,
                            init_segment: init_key.clone(),
                        });
                    }
                    (
                        Some(InitSegmentRef {
                            url: init.uri.clone(),
                            byterange: init.byterange,
                        }),
                        init.buffer.clone(),
                    )
                }
                None => (None, None),
            },
        };

        let key_file = options
            .key_file
            .clone()
            .or_else(|| details.as_ref().and_then(|d| d.key_file.clone()));

        let mut data = input.data;
        if let Some(key_file) = key_file.as_ref().filter(|k| k.is_aes128()) {
            let key_bytes = key_file
                .key_bytes
                .or_else(|| segment_details_map.key_bytes(&key_file.uri));
            let result = self
                .cancellable(decrypt(&self.fetcher, &data, key_file, key_bytes))
                .await?;
            if key_bytes.is_none() {
                segment_details_map.set_key_bytes(key_file, result.key_bytes);
            }
            data = Bytes::from(result.buffer);
        }

        let data_with_init = match &init_buffer {
            Some(init) => {
                let mut buffer = BytesMut::with_capacity(init.len() + data.len());
                buffer.extend_from_slice(init);
                buffer.extend_from_slice(&data);
                buffer.freeze()
            }
            None => data,
        };

        let kind = if input.is_append {
            StorageKind::Append
        } else {
            StorageKind::Segment
        };
        let path = self
            .cancellable(self.storage.save(
                &data_with_init,
                kind,
                &file_name(options, input.number, extension.as_deref()),
            ))
            .await?;

        let probe_result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(VidlensError::Cancelled),
            result = self.prober.probe(&path) => result,
        };
        let Some(probe_result) = probe_result else {
            tracing::debug!("Unable to probe {}", path.display());
            return Ok(None);
        };

        let resolution = match probe_result.streams.as_slice() {
            [stream] => stream
                .width
                .zip(stream.height)
                .map(|(width, height)| Resolution { width, height }),
            _ => None,
        };

        let boxes = if mime_type.as_deref().is_some_and(is_mp4_mime_type) {
            match box_tree(&data_with_init) {
                Ok(boxes) => Some(boxes),
                Err(e) => {
                    tracing::error!("Unable to list boxes of {}: {e}", path.display());
                    None
                }
            }
        } else {
            None
        };

        let segment = SegmentData {
            short_url: input.url.as_deref().and_then(short_url),
            key,
            url: input.url,
            byterange: input.byterange,
            number: input.number,
            extension,
            mime_type,
            path,
            init_segment,
            key_file,
            manifest_attributes: options
                .manifest_attributes
                .clone()
                .or_else(|| details.as_ref().and_then(|d| d.manifest_attributes.clone())),
            is_user_request: options.user_request_number.is_some(),
            timeline: options
                .timeline
                .or_else(|| details.as_ref().and_then(|d| d.timeline)),
            times: segment_times(&probe_result),
            stream_time_ranges: stream_time_ranges(&probe_result),
            streams: probe_result.streams,
            frames: probe_result.frames,
            resolution,
            request_epoch_time: input.request_epoch_time.filter(|_| !input.is_append),
            response_epoch_time: input.response_epoch_time.filter(|_| !input.is_append),
            append_epoch_time: input.append_epoch_time.filter(|_| input.is_append),
            boxes,
            session_id: self.session_id,
        };

        let event = if input.is_append {
            SessionEvent::Append(Box::new(segment.clone()))
        } else {
            SessionEvent::Segment(Box::new(segment.clone()))
        };
        self.emit(event);

        Ok(Some(segment))
    }

    /// Classify a received resource and handle it as a manifest or a segment.
    ///
    /// A manifest's segment details are merged into `state` before this
    /// returns, and a main manifest becomes `state.main_manifest`.
    pub async fn handle_file(
        &self,
        state: &mut SessionState,
        file: FileData,
        options: &RequestOptions,
    ) -> VidlensResult<Option<HandledFile>> {
        none_on_cancel(self.file(state, file, options).await)
    }

    async fn file(
        &self,
        state: &mut SessionState,
        file: FileData,
        options: &RequestOptions,
    ) -> VidlensResult<Option<HandledFile>> {
        let normalized = get_normalized_type(file.mime_type.as_deref(), &file.url);
        let extension = get_extension(&file.url);

        if normalized.r#type == ResourceType::Manifest {
            let data = self
                .manifest(&file, state.main_manifest.as_deref(), options)
                .await?;
            state
                .segment_details_map
                .merge(data.document.segment_details_map.clone());
            let data = Box::new(data);
            if data.document.is_main {
                state.main_manifest = Some(data.clone());
            }
            return Ok(Some(HandledFile::Manifest(data)));
        }

        if matches!(extension.as_deref(), Some("webvtt" | "vtt")) {
            return Err(VidlensError::UnsupportedInput(
                "webvtt is not currently supported".to_string(),
            ));
        }

        let input = SegmentInput {
            url: Some(file.url),
            byterange: file.byterange,
            number: file.number,
            data: file.data,
            mime_type: file.mime_type,
            is_append: false,
            request_epoch_time: file.request_epoch_time,
            response_epoch_time: file.response_epoch_time,
            append_epoch_time: None,
        };
        let segment = self
            .segment(&mut state.segment_details_map, input, options)
            .await?;
        Ok(segment.map(|segment| HandledFile::Segment(Box::new(segment))))
    }

    /// Fetch a URL requested by the user and handle what it returns.
    ///
    /// Every call works on its own state, so calls may run concurrently.
    pub async fn handle_url(
        &self,
        url: &str,
        byterange: Option<ByteRange>,
        options: RequestOptions,
    ) -> VidlensResult<Option<HandledFile>> {
        none_on_cancel(self.url(url, byterange, options).await)
    }

    async fn url(
        &self,
        url: &str,
        byterange: Option<ByteRange>,
        mut options: RequestOptions,
    ) -> VidlensResult<Option<HandledFile>> {
        let request_epoch_time = now_millis();
        let response = self
            .cancellable(self.fetcher.fetch(url, byterange.as_ref()))
            .await?;

        tracing::trace!(
            url,
            ?byterange,
            content_type = ?response.content_type,
            "Handling URL"
        );

        if response
            .content_type
            .as_deref()
            .is_some_and(is_website_content_type)
        {
            return Err(VidlensError::UnsupportedInput(format!(
                "Input an unsupported URL '{url}'"
            )));
        }

        if let Some(init) = options.init_segment.as_mut().filter(|i| i.buffer.is_none()) {
            let init_response = self
                .cancellable(self.fetcher.fetch(&init.url, init.byterange.as_ref()))
                .await?;
            init.buffer = Some(init_response.bytes);
        }

        let file = FileData {
            url: url.to_string(),
            mime_type: response.content_type,
            data: response.bytes,
            byterange,
            number: 1,
            request_epoch_time: Some(request_epoch_time),
            response_epoch_time: Some(now_millis()),
        };
        self.file(&mut SessionState::new(), file, &options).await
    }
}
