//! MediaSource `appendBuffer` captures.
//!
//! A player appends one init segment per source buffer and then media
//! segments that are not decodable alone. The last init segment of each MIME
//! type is remembered and prepended to the media appends that follow.

use std::{collections::HashMap, sync::Arc};

use bytes::{Bytes, BytesMut};

use crate::{
    details::SegmentDetailsMap,
    event::SegmentData,
    fetch::Fetcher,
    handler::{Handler, RequestOptions, SegmentInput},
    mp4::{is_init_segment, is_mp4, parse_out_init_segment},
    probe::Prober,
    storage::Storage,
    util::now_millis,
    VidlensResult,
};

#[derive(Debug, Default)]
pub struct AppendTracker {
    append_number: u64,
    last_init_segments: HashMap<String, Option<Bytes>>,
}

impl AppendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the append and prepend the last init segment of its MIME type.
    pub fn prepare(&mut self, source: Bytes, mime_type: &str) -> SegmentInput {
        self.append_number += 1;

        let data = if !is_mp4(&source) {
            source
        } else if is_init_segment(&source) {
            let init_segment = parse_out_init_segment(&source).map(Bytes::copy_from_slice);
            if init_segment.is_none() {
                // The append is still handled, it just cannot be probed
                tracing::error!(
                    "Unable to parse init segment out of append for append number {}",
                    self.append_number
                );
            }
            self.last_init_segments
                .insert(mime_type.to_string(), init_segment);
            source
        } else {
            match self.last_init_segments.get(mime_type) {
                Some(Some(init)) => {
                    let mut data = BytesMut::with_capacity(init.len() + source.len());
                    data.extend_from_slice(init);
                    data.extend_from_slice(&source);
                    data.freeze()
                }
                _ => source,
            }
        };

        SegmentInput {
            url: None,
            byterange: None,
            number: self.append_number,
            data,
            mime_type: Some(mime_type.to_string()),
            is_append: true,
            request_epoch_time: None,
            response_epoch_time: None,
            append_epoch_time: Some(now_millis()),
        }
    }
}

/// Handles appends of one page session as `append` events.
pub struct AppendHandler<F, S, P> {
    handler: Arc<Handler<F, S, P>>,
    tracker: AppendTracker,
}

impl<F, S, P> AppendHandler<F, S, P>
where
    F: Fetcher,
    S: Storage,
    P: Prober,
{
    pub fn new(handler: Arc<Handler<F, S, P>>) -> Self {
        Self {
            handler,
            tracker: AppendTracker::new(),
        }
    }

    pub async fn handle_append(
        &mut self,
        source: Bytes,
        mime_type: &str,
    ) -> VidlensResult<Option<SegmentData>> {
        let input = self.tracker.prepare(source, mime_type);
        self.handler
            .handle_segment(&mut SegmentDetailsMap::new(), input, &RequestOptions::default())
            .await
    }
}
