use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::json;
use vidlens::{event::SessionEvent, har::replay_har, ResourceKey};

use crate::{drain_events, init_segment, media_segment, test_handler, AssertWrapper};

const PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:7
#EXT-X-TARGETDURATION:2
#EXT-X-MAP:URI=\"init.mp4\"
#EXTINF:2.0,
0.m4s
#EXT-X-ENDLIST
";

fn entry(time: &str, url: &str, mime_type: &str, body: &[u8]) -> serde_json::Value {
    json!({
        "startedDateTime": time,
        "time": 40,
        "request": { "method": "GET", "url": url },
        "response": {
            "status": 200,
            "headers": [],
            "content": {
                "size": body.len(),
                "mimeType": mime_type,
                "text": STANDARD.encode(body),
                "encoding": "base64"
            }
        }
    })
}

#[tokio::test]
async fn replay_resolves_out_of_order_init() -> anyhow::Result<()> {
    let har = json!({
        "log": {
            "version": "1.2",
            "entries": [
                // Listed out of order on purpose, replay sorts by start time
                entry(
                    "2024-05-01T10:00:02.000Z",
                    "https://cdn.example.com/v/init.mp4",
                    "video/mp4",
                    &init_segment(),
                ),
                entry(
                    "2024-05-01T10:00:00.000Z",
                    "https://cdn.example.com/v/index.m3u8",
                    "application/vnd.apple.mpegurl",
                    PLAYLIST.as_bytes(),
                ),
                entry(
                    "2024-05-01T10:00:01.000Z",
                    "https://cdn.example.com/v/0.m4s",
                    "video/mp4",
                    &media_segment(9),
                ),
                entry(
                    "2024-05-01T10:00:03.000Z",
                    "https://cdn.example.com/v/thumb.png",
                    "image/png",
                    b"png",
                ),
            ]
        }
    });

    let (handler, storage, mut events) = test_handler();
    let state = replay_har(handler, &serde_json::to_vec(&har)?).await?;

    let init_key = ResourceKey::new("https://cdn.example.com/v/init.mp4", None);
    assert!(state
        .segment_details_map
        .get(&init_key)
        .assert_success()
        .buffer
        .is_some());

    let events = drain_events(&mut events);
    assert_eq!(events.len(), 2);
    let SessionEvent::Manifest(manifest) = &events[0] else {
        panic!("expected the manifest first");
    };
    assert_eq!(manifest.number, 1);
    let SessionEvent::Segment(segment) = &events[1] else {
        panic!("expected a segment event");
    };
    assert_eq!(segment.url.as_deref(), Some("https://cdn.example.com/v/0.m4s"));
    assert_eq!(segment.number, 1);
    assert_eq!(segment.request_epoch_time, Some(1714557601000));
    assert_eq!(segment.response_epoch_time, Some(1714557601040));

    let saved = storage.get(&segment.path).assert_success();
    assert_eq!(saved.as_ref(), [init_segment(), media_segment(9)].concat().as_slice());

    Ok(())
}

#[tokio::test]
async fn invalid_har() {
    let (handler, _storage, _events) = test_handler();
    replay_har(handler, b"{\"log\": {}}").await.assert_error();
}
