use vidlens::{
    dash::{UnsupportedAddressing, SEGMENTS_ID_ATTRIBUTE},
    manifest::{parse_manifest, ManifestDocument},
    mime::Dialect,
    ByteRange, HttpClient, ResourceKey,
};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{mp4_box, AssertWrapper};

const MANIFEST_URL: &str = "https://example.com/dash/manifest.mpd";

/// Version 0 `sidx` box with `(size, duration)` media references.
fn sidx_box(timescale: u32, first_offset: u32, references: &[(u32, u32)]) -> Vec<u8> {
    let mut payload = vec![0, 0, 0, 0];
    payload.extend(1u32.to_be_bytes());
    payload.extend(timescale.to_be_bytes());
    payload.extend(0u32.to_be_bytes());
    payload.extend(first_offset.to_be_bytes());
    payload.extend(0u16.to_be_bytes());
    payload.extend((references.len() as u16).to_be_bytes());
    for (size, duration) in references {
        payload.extend(size.to_be_bytes());
        payload.extend(duration.to_be_bytes());
        payload.extend(0x9000_0000u32.to_be_bytes());
    }
    mp4_box(b"sidx", &payload)
}

fn segment_urls(document: &ManifestDocument, line_marker: &str) -> Vec<String> {
    document
        .lines
        .iter()
        .find(|line| line.raw.contains(line_marker))
        .assert_success()
        .segments
        .iter()
        .map(|segment| segment.url.clone())
        .collect()
}

#[tokio::test]
async fn template_with_timeline() -> anyhow::Result<()> {
    let data = include_str!("../fixtures/dash/template-timeline.mpd");
    let document =
        parse_manifest(&HttpClient::default(), data, MANIFEST_URL, Dialect::Dash, None).await?;

    assert!(document.is_main);
    assert!(document
        .lines
        .iter()
        .all(|line| !line.raw.contains(SEGMENTS_ID_ATTRIBUTE)));

    assert_eq!(
        segment_urls(&document, r#"id="video-720p""#),
        vec![
            "https://example.com/dash/media/video-720p/00007.m4s",
            "https://example.com/dash/media/video-720p/00008.m4s",
            "https://example.com/dash/media/video-720p/00009.m4s",
        ]
    );
    // The representation overrides `media` but inherits the timeline
    assert_eq!(
        segment_urls(&document, r#"id="video-360p""#),
        vec![
            "https://example.com/dash/media/low/0.m4s",
            "https://example.com/dash/media/low/10000.m4s",
            "https://example.com/dash/media/low/20000.m4s",
        ]
    );

    let line = document
        .lines
        .iter()
        .find(|line| line.raw.contains(r#"id="video-720p""#))
        .assert_success();
    let starts: Vec<_> = line.segments.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![0.0, 10.0, 20.0]);
    assert!(line.segments.iter().all(|s| s.duration == Some(10.0)));

    let map = &document.segment_details_map;
    assert_eq!(map.len(), 8);
    let init_key = ResourceKey::new("https://example.com/dash/media/video-360p/init.mp4", None);
    assert!(map.get(&init_key).assert_success().is_init_segment);
    let segment = map
        .get(&ResourceKey::new("https://example.com/dash/media/low/10000.m4s", None))
        .assert_success();
    assert_eq!(segment.init_segment.as_ref(), Some(&init_key));
    let attributes = segment.manifest_attributes.as_ref().assert_success();
    assert_eq!(attributes.bandwidth, Some(800000));
    assert_eq!(attributes.resolution.map(|r| r.width), Some(640));

    // SegmentList is reported, not silently dropped
    assert!(document.unsupported.iter().any(|node| {
        node.node_id == "Representation-0-AdaptationSet-1-Period-0"
            && node.addressing == UnsupportedAddressing::SegmentList
    }));

    let renditions = document.rendition_attributes.as_ref().assert_success();
    assert_eq!(renditions.len(), 3);
    assert!(renditions
        .iter()
        .all(|r| r.url.as_deref() == Some(MANIFEST_URL)));

    Ok(())
}

#[tokio::test]
async fn template_with_duration() -> anyhow::Result<()> {
    let data = include_str!("../fixtures/dash/template-duration.mpd");
    let document =
        parse_manifest(&HttpClient::default(), data, MANIFEST_URL, Dialect::Dash, None).await?;

    let line = document
        .lines
        .iter()
        .find(|line| !line.segments.is_empty())
        .assert_success();
    let segments: Vec<_> = line
        .segments
        .iter()
        .map(|s| (s.url.as_str(), s.start))
        .collect();
    assert_eq!(
        segments,
        vec![
            ("https://example.com/dash/seg-1.m4s", 0.0),
            ("https://example.com/dash/seg-2.m4s", 4.0),
            ("https://example.com/dash/seg-3.m4s", 8.0),
        ]
    );
    assert_eq!(
        line.segments[0].init_segment.as_ref().assert_success().url,
        "https://example.com/dash/init-500000.mp4"
    );

    Ok(())
}

#[tokio::test]
async fn segment_base_with_sidx() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let sidx = sidx_box(1000, 0, &[(1000, 2000), (1500, 2000)]);
    assert_eq!(sidx.len(), 56);

    Mock::given(method("GET"))
        .and(path("/video.mp4"))
        .and(header("Range", "bytes=800-855"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(sidx))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/manifest.mpd", server.uri());
    let data = include_str!("../fixtures/dash/segment-base.mpd");
    let document = parse_manifest(&HttpClient::default(), data, &url, Dialect::Dash, None).await?;

    let video_url = format!("{}/video.mp4", server.uri());
    let line = document
        .lines
        .iter()
        .find(|line| line.raw.contains(r#"id="v""#))
        .assert_success();
    assert_eq!(line.segments.len(), 2);

    let first = &line.segments[0];
    let second = &line.segments[1];
    assert_eq!(first.byterange, Some(ByteRange::new(856, 1855)));
    assert_eq!(second.byterange, Some(ByteRange::new(1856, 3355)));
    assert_eq!((first.start, first.end), (10.0, 12.0));
    assert_eq!(first.end, second.start);
    assert_eq!(
        first.key.as_str(),
        format!("{video_url}-start-856-end-1855")
    );

    let init = first.init_segment.as_ref().assert_success();
    assert_eq!(init.url, video_url);
    assert_eq!(init.byterange, Some(ByteRange::new(0, 799)));

    // The audio index cannot be fetched; only that representation is affected
    assert!(document
        .lines
        .iter()
        .find(|line| line.raw.contains(r#"id="a""#))
        .assert_success()
        .segments
        .is_empty());
    assert_eq!(document.segment_details_map.len(), 3);

    Ok(())
}

#[tokio::test]
async fn corrupt_sidx_keeps_sibling_segments() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video.mp4"))
        .and(header("Range", "bytes=800-855"))
        .respond_with(
            ResponseTemplate::new(206).set_body_bytes(sidx_box(1000, 0, &[(1000, 2000), (1500, 2000)])),
        )
        .mount(&server)
        .await;
    // The audio index range holds some other box
    Mock::given(method("GET"))
        .and(path("/missing.mp4"))
        .and(header("Range", "bytes=600-655"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(mp4_box(b"free", &[0; 48])))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/manifest.mpd", server.uri());
    let data = include_str!("../fixtures/dash/segment-base.mpd");
    let document = parse_manifest(&HttpClient::default(), data, &url, Dialect::Dash, None).await?;

    let segments_of = |id: &str| {
        document
            .lines
            .iter()
            .find(|line| line.raw.contains(&format!(r#"id="{id}""#)))
            .map(|line| line.segments.len())
    };
    assert_eq!(segments_of("v"), Some(2));
    assert_eq!(segments_of("a"), Some(0));

    let video_url = format!("{}/video.mp4", server.uri());
    let map = &document.segment_details_map;
    assert_eq!(map.len(), 3);
    assert!(map
        .get(&ResourceKey::new(&video_url, Some(&ByteRange::new(856, 1855))))
        .is_some());
    assert!(map
        .get(&ResourceKey::new(&video_url, Some(&ByteRange::new(0, 799))))
        .assert_success()
        .is_init_segment);

    Ok(())
}

#[tokio::test]
async fn invalid_mpd() {
    parse_manifest(
        &HttpClient::default(),
        "<Playlist/>",
        MANIFEST_URL,
        Dialect::Dash,
        None,
    )
    .await
    .assert_error();
}
