use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};

use super::{pending::PendingHandlers, FileData, HandledFile, Handler, RequestOptions, SessionState};
use crate::{
    fetch::Fetcher, probe::Prober, storage::Storage, ResourceKey, VidlensError, VidlensResult,
};

/// Handles resources strictly one at a time, replaying segments that
/// arrived before their init segment once it has been handled.
///
/// An item is settled, including every replay it unblocks, before
/// [`BatchProcessor::process`] returns.
pub struct BatchProcessor<F, S, P> {
    handler: Arc<Handler<F, S, P>>,
    state: SessionState,
    pending: PendingHandlers<FileData>,
}

impl<F, S, P> BatchProcessor<F, S, P>
where
    F: Fetcher,
    S: Storage,
    P: Prober,
{
    pub fn new(handler: Arc<Handler<F, S, P>>) -> Self {
        Self {
            handler,
            state: SessionState::new(),
            pending: PendingHandlers::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    /// Number of items still waiting on an init segment.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether any item waits for `init_segment` to be handled.
    pub fn is_waiting_on(&self, init_segment: &ResourceKey) -> bool {
        self.pending.is_waiting_on(init_segment)
    }

    pub async fn process(&mut self, file: FileData) -> VidlensResult<Option<HandledFile>> {
        let key = file.key();
        let options = RequestOptions::default();

        let result = match self.handler.handle_file(&mut self.state, file.clone(), &options).await {
            Err(VidlensError::InitSegmentMissing {
                segment,
                init_segment,
            }) => {
                self.pending.register(init_segment, segment, file);
                return Ok(None);
            }
            Err(e) => return Err(e),
            Ok(result) => result,
        };

        if !self.pending.is_waiting_on(&key) {
            return Ok(result);
        }

        // Anything waiting on the key just handled can run now. A replay that
        // misses a different init segment waits on that one instead.
        for (waiting_key, waiting_file) in self.pending.take(&key) {
            tracing::trace!("Processing handler for \"{waiting_key}\" after process of \"{key}\"");
            match self
                .handler
                .handle_file(&mut self.state, waiting_file.clone(), &options)
                .await
            {
                Err(VidlensError::InitSegmentMissing { init_segment, .. })
                    if init_segment != key =>
                {
                    self.pending.register(init_segment, waiting_key, waiting_file);
                }
                Err(e) => tracing::warn!("Failed to replay {waiting_key}: {e}"),
                Ok(_) => {}
            }
        }

        Ok(result)
    }
}

/// Feeds captured resources through a [`BatchProcessor`] owned by a worker task.
pub struct CaptureQueue {
    sender: mpsc::UnboundedSender<FileData>,
    worker: JoinHandle<SessionState>,
}

impl CaptureQueue {
    pub fn spawn<F, S, P>(handler: Arc<Handler<F, S, P>>) -> Self
    where
        F: Fetcher,
        S: Storage,
        P: Prober,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<FileData>();
        let cancel = handler.cancel_token().clone();
        let mut processor = BatchProcessor::new(handler);

        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("Capture queue cancelled, dropping queued items");
                        break;
                    }
                    file = receiver.recv() => {
                        let Some(file) = file else { break };
                        let url = file.url.clone();
                        if let Err(e) = processor.process(file).await {
                            tracing::warn!("Failed to handle {url}: {e}");
                        }
                    }
                }
            }
            processor.into_state()
        });

        Self { sender, worker }
    }

    pub fn push(&self, file: FileData) -> VidlensResult<()> {
        self.sender
            .send(file)
            .map_err(|_| VidlensError::Cancelled)
    }

    /// Stop accepting items, wait for the queued ones and return the final state.
    pub async fn finish(self) -> VidlensResult<SessionState> {
        drop(self.sender);
        self.worker
            .await
            .map_err(VidlensError::TaskJoin)
    }
}
