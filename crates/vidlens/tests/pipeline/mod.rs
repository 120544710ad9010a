use std::{path::PathBuf, sync::Arc};

use vidlens::{
    bytes::Bytes,
    event::{event_channel, SessionEvent},
    handler::{
        batch::{BatchProcessor, CaptureQueue},
        FileData, HandledFile, Handler, RequestOptions,
    },
    probe::NoProbe,
    storage::{Storage, StorageKind},
    CancellationToken, HttpClient, ResourceKey, VidlensError, VidlensResult,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{
    drain_events, init_segment, media_segment, mp4_box, test_handler, test_handler_with_cancel,
    AssertWrapper,
};

const PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:7
#EXT-X-TARGETDURATION:4
#EXT-X-MAP:URI=\"init.mp4\"
#EXTINF:4.0,
0.m4s
#EXTINF:4.0,
1.m4s
#EXT-X-ENDLIST
";

fn file(url: &str, mime_type: &str, data: impl Into<Bytes>, number: u64) -> FileData {
    FileData {
        url: url.to_string(),
        mime_type: Some(mime_type.to_string()),
        data: data.into(),
        number,
        ..Default::default()
    }
}

#[tokio::test]
async fn segment_waits_for_init_segment() -> anyhow::Result<()> {
    let (handler, storage, mut events) = test_handler();
    let mut processor = BatchProcessor::new(handler);

    let manifest = file(
        "https://example.com/v/index.m3u8",
        "application/vnd.apple.mpegurl",
        PLAYLIST,
        1,
    );
    let result = processor.process(manifest).await?;
    assert!(matches!(result, Some(HandledFile::Manifest(_))));
    assert_eq!(processor.state().segment_details_map.len(), 3);

    // The media segment arrives before its init segment
    let segment = file("https://example.com/v/0.m4s", "video/mp4", media_segment(1), 1);
    assert!(processor.process(segment).await?.is_none());
    assert_eq!(processor.pending_len(), 1);

    let events_so_far = drain_events(&mut events);
    assert_eq!(events_so_far.len(), 1);
    assert!(matches!(events_so_far[0], SessionEvent::Manifest(_)));

    let init = file("https://example.com/v/init.mp4", "video/mp4", init_segment(), 2);
    assert!(processor.process(init).await?.is_none());
    assert_eq!(processor.pending_len(), 0);

    let init_key = ResourceKey::new("https://example.com/v/init.mp4", None);
    assert!(processor
        .state()
        .segment_details_map
        .get(&init_key)
        .assert_success()
        .buffer
        .is_some());

    let replayed = drain_events(&mut events);
    assert_eq!(replayed.len(), 1);
    let SessionEvent::Segment(segment) = &replayed[0] else {
        panic!("expected a segment event");
    };
    assert_eq!(
        segment.key.as_ref().map(ResourceKey::as_str),
        Some("https://example.com/v/0.m4s")
    );
    assert_eq!(
        segment.init_segment.as_ref().assert_success().url,
        "https://example.com/v/init.mp4"
    );
    assert_eq!(segment.session_id, 1);

    let boxes: Vec<_> = segment
        .boxes
        .as_ref()
        .assert_success()
        .iter()
        .map(|b| b.box_type.as_str())
        .collect();
    assert_eq!(boxes, vec!["ftyp", "moov", "moof", "mdat"]);

    let saved = storage.get(&segment.path).assert_success();
    assert_eq!(saved.as_ref(), [init_segment(), media_segment(1)].concat().as_slice());

    // Later segments resolve directly
    let next = file("https://example.com/v/1.m4s", "video/mp4", media_segment(2), 2);
    assert!(matches!(
        processor.process(next).await?,
        Some(HandledFile::Segment(_))
    ));
    assert_eq!(drain_events(&mut events).len(), 1);

    Ok(())
}

#[tokio::test]
async fn missing_init_segment_is_recoverable() -> anyhow::Result<()> {
    let (handler, _storage, _events) = test_handler();
    let mut state = vidlens::handler::SessionState::new();

    let manifest = file(
        "https://example.com/v/index.m3u8",
        "application/x-mpegurl",
        PLAYLIST,
        1,
    );
    handler
        .handle_file(&mut state, manifest, &RequestOptions::default())
        .await?;

    let segment = file("https://example.com/v/1.m4s", "video/mp4", media_segment(1), 1);
    let error = handler
        .handle_file(&mut state, segment, &RequestOptions::default())
        .await
        .unwrap_err();
    assert!(error.is_recoverable());
    assert!(matches!(
        error,
        VidlensError::InitSegmentMissing { ref init_segment, .. }
            if init_segment.as_str() == "https://example.com/v/init.mp4"
    ));

    Ok(())
}

#[tokio::test]
async fn capture_queue_processes_in_order() -> anyhow::Result<()> {
    let (handler, _storage, mut events) = test_handler();
    let queue = CaptureQueue::spawn(handler);

    queue.push(file(
        "https://example.com/v/index.m3u8",
        "application/vnd.apple.mpegurl",
        PLAYLIST,
        1,
    ))?;
    queue.push(file("https://example.com/v/1.m4s", "video/mp4", media_segment(2), 1))?;
    queue.push(file("https://example.com/v/0.m4s", "video/mp4", media_segment(1), 2))?;
    queue.push(file("https://example.com/v/init.mp4", "video/mp4", init_segment(), 3))?;

    let state = queue.finish().await?;
    assert_eq!(state.segment_details_map.len(), 3);

    let urls: Vec<_> = drain_events(&mut events)
        .into_iter()
        .map(|event| match event {
            SessionEvent::Manifest(data) => data.url().to_string(),
            SessionEvent::Segment(data) | SessionEvent::Append(data) => {
                data.url.clone().unwrap_or_default()
            }
        })
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/v/index.m3u8",
            "https://example.com/v/1.m4s",
            "https://example.com/v/0.m4s",
        ]
    );

    Ok(())
}

#[tokio::test]
async fn handle_url_rejects_websites() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html></html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let (handler, _storage, _events) = test_handler();
    let error = handler
        .handle_url(&format!("{}/watch", server.uri()), None, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, VidlensError::UnsupportedInput(_)));

    Ok(())
}

#[tokio::test]
async fn handle_url_with_explicit_init_segment() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/seg.m4s"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(media_segment(3), "video/mp4"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/init.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(init_segment()))
        .mount(&server)
        .await;

    let (handler, storage, _events) = test_handler();
    let options = RequestOptions {
        user_request_number: Some(3),
        init_segment: Some(vidlens::handler::InitSegmentInput {
            url: format!("{}/init.mp4", server.uri()),
            byterange: None,
            buffer: None,
        }),
        timeline: Some(2.0),
        ..Default::default()
    };
    let result = handler
        .handle_url(&format!("{}/seg.m4s", server.uri()), None, options)
        .await?;

    let Some(HandledFile::Segment(segment)) = result else {
        panic!("expected a segment");
    };
    assert!(segment.is_user_request);
    assert_eq!(segment.timeline, Some(2.0));
    assert!(segment.path.ends_with("user-request-3.mp4"));
    assert_eq!(
        storage.get(&segment.path).assert_success().as_ref(),
        [init_segment(), media_segment(3)].concat().as_slice()
    );

    Ok(())
}

#[tokio::test]
async fn octet_stream_segment_is_typed_by_extension() -> anyhow::Result<()> {
    let (handler, _storage, mut events) = test_handler();
    let mut processor = BatchProcessor::new(handler);

    let manifest = file(
        "https://example.com/v/index.m3u8",
        "application/vnd.apple.mpegurl",
        PLAYLIST,
        1,
    );
    processor.process(manifest).await?;
    let init = file(
        "https://example.com/v/init.mp4",
        "application/octet-stream",
        init_segment(),
        2,
    );
    processor.process(init).await?;
    let segment = file(
        "https://example.com/v/0.m4s",
        "application/octet-stream",
        media_segment(1),
        3,
    );
    let Some(HandledFile::Segment(segment)) = processor.process(segment).await? else {
        panic!("expected a segment");
    };

    assert_eq!(segment.mime_type.as_deref(), Some("video/mp4"));
    assert_eq!(segment.extension.as_deref(), Some("mp4"));
    assert!(segment.boxes.is_some());
    assert_eq!(drain_events(&mut events).len(), 2);

    Ok(())
}

#[tokio::test]
async fn webvtt_is_unsupported() -> anyhow::Result<()> {
    let (handler, _storage, _events) = test_handler();
    let subtitles = file("https://example.com/subs/0.webvtt", "text/vtt", "WEBVTT", 1);
    let error = handler
        .handle_file(
            &mut vidlens::handler::SessionState::new(),
            subtitles,
            &RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, VidlensError::UnsupportedInput(_)));

    Ok(())
}

#[tokio::test]
async fn cancelled_handling_has_no_result() -> anyhow::Result<()> {
    let (sender, mut receiver) = vidlens::event::event_channel();
    let cancel = CancellationToken::new();
    let handler = vidlens::handler::Handler::new(
        vidlens::HttpClient::default(),
        vidlens::storage::memory::MemoryStorage::new(),
        vidlens::probe::NoProbe,
        sender,
        1,
    )
    .with_cancel_token(cancel.clone());
    cancel.cancel();

    let result = handler
        .handle_file(
            &mut vidlens::handler::SessionState::new(),
            file("https://example.com/0.ts", "video/mp2t", vec![0x47; 188], 1),
            &RequestOptions::default(),
        )
        .await?;
    assert!(result.is_none());
    assert!(receiver.try_recv().is_err());

    Ok(())
}

fn playlist_with_init(init: &str) -> String {
    format!(
        "#EXTM3U
#EXT-X-VERSION:7
#EXT-X-TARGETDURATION:4
#EXT-X-MAP:URI=\"{init}\"
#EXTINF:4.0,
0.m4s
#EXT-X-ENDLIST
"
    )
}

#[tokio::test]
async fn replay_waits_again_on_a_new_init_segment() -> anyhow::Result<()> {
    let (handler, storage, mut events) = test_handler();
    let mut processor = BatchProcessor::new(handler);

    let init_a = ResourceKey::new("https://example.com/v/init-a.mp4", None);
    let init_b = ResourceKey::new("https://example.com/v/init-b.mp4", None);

    processor
        .process(file(
            "https://example.com/v/a.m3u8",
            "application/vnd.apple.mpegurl",
            playlist_with_init("init-a.mp4"),
            1,
        ))
        .await?;
    let segment = file("https://example.com/v/0.m4s", "video/mp4", media_segment(4), 1);
    assert!(processor.process(segment).await?.is_none());
    assert!(processor.is_waiting_on(&init_a));

    // A later manifest moves the segment onto another init segment
    processor
        .process(file(
            "https://example.com/v/b.m3u8",
            "application/vnd.apple.mpegurl",
            playlist_with_init("init-b.mp4"),
            2,
        ))
        .await?;

    processor
        .process(file("https://example.com/v/init-a.mp4", "video/mp4", init_segment(), 2))
        .await?;
    assert!(!processor.is_waiting_on(&init_a));
    assert!(processor.is_waiting_on(&init_b));
    assert_eq!(processor.pending_len(), 1);

    let init_b_bytes = [mp4_box(b"ftyp", b"dash"), mp4_box(b"moov", &[1; 16])].concat();
    processor
        .process(file(
            "https://example.com/v/init-b.mp4",
            "video/mp4",
            init_b_bytes.clone(),
            3,
        ))
        .await?;
    assert_eq!(processor.pending_len(), 0);

    let segments: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Segment(data) => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(segments.len(), 1);
    assert_eq!(
        segments[0].init_segment.as_ref().assert_success().url,
        "https://example.com/v/init-b.mp4"
    );
    assert_eq!(
        storage.get(&segments[0].path).assert_success().as_ref(),
        [init_b_bytes, media_segment(4)].concat().as_slice()
    );

    Ok(())
}

#[tokio::test]
async fn cancelled_capture_queue_drops_items() -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let (handler, storage, mut events) = test_handler_with_cancel(cancel.clone());
    cancel.cancel();

    let queue = CaptureQueue::spawn(handler.clone());
    // The worker may already be gone, in which case pushing fails
    let _ = queue.push(file(
        "https://example.com/v/index.m3u8",
        "application/vnd.apple.mpegurl",
        PLAYLIST,
        1,
    ));
    let _ = queue.push(file("https://example.com/v/0.m4s", "video/mp4", media_segment(1), 1));

    let state = queue.finish().await?;
    assert!(state.segment_details_map.is_empty());
    assert!(state.main_manifest.is_none());

    // Direct processing on a cancelled handler has no result either
    let mut processor = BatchProcessor::new(handler);
    let result = processor
        .process(file("https://example.com/v/1.ts", "video/mp2t", vec![0x47; 188], 2))
        .await?;
    assert!(result.is_none());

    assert!(storage.is_empty());
    assert!(drain_events(&mut events).is_empty());

    Ok(())
}

struct FailingStorage;

impl Storage for FailingStorage {
    async fn save(&self, _data: &[u8], _kind: StorageKind, file_name: &str) -> VidlensResult<PathBuf> {
        panic!("unable to store {file_name}");
    }
}

#[tokio::test]
async fn capture_queue_reports_worker_panic() {
    let (sender, _receiver) = event_channel();
    let handler = Arc::new(Handler::new(
        HttpClient::default(),
        FailingStorage,
        NoProbe,
        sender,
        1,
    ));

    let queue = CaptureQueue::spawn(handler);
    queue
        .push(file("https://example.com/v/0.ts", "video/mp2t", vec![0x47; 188], 1))
        .assert_success();

    let error = queue.finish().await.unwrap_err();
    assert!(matches!(error, VidlensError::TaskJoin(ref e) if e.is_panic()));
}
