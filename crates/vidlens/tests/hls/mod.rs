use vidlens::{
    manifest::parse_manifest, mime::Dialect, ByteRange, HttpClient, ResourceKey,
};

use crate::AssertWrapper;

const BASE: &str = "https://example.com/live/index.m3u8";

#[tokio::test]
async fn main_playlist_rendition_attributes() -> anyhow::Result<()> {
    let data = include_str!("../fixtures/hls/main.m3u8");
    let document = parse_manifest(&HttpClient::default(), data, BASE, Dialect::Hls, None).await?;

    assert!(document.is_main);
    assert!(document.segment_details_map.is_empty());

    let renditions = document.rendition_attributes.as_ref().assert_success();
    assert_eq!(renditions.len(), 2);
    let mid = document
        .rendition_for("https://example.com/live/mid/index.m3u8")
        .assert_success();
    assert_eq!(mid.bandwidth, Some(2560000));
    assert_eq!(mid.resolution.map(|r| (r.width, r.height)), Some((1280, 720)));

    let media_line = document
        .lines
        .iter()
        .find(|line| line.tag.as_deref() == Some("EXT-X-MEDIA"))
        .assert_success();
    assert_eq!(
        media_line.parsed_uri.as_ref().assert_success().absolute_uri,
        "https://example.com/live/audio/en.m3u8"
    );

    Ok(())
}

#[tokio::test]
async fn fmp4_byterange_playlist() -> anyhow::Result<()> {
    let data = include_str!("../fixtures/hls/fmp4-byterange.m3u8");
    let document = parse_manifest(&HttpClient::default(), data, BASE, Dialect::Hls, None).await?;

    assert!(!document.is_main);
    assert_eq!(document.media_sequence, Some(10));
    assert_eq!(document.target_duration, Some(4.0));
    assert_eq!(document.end_list, Some(true));

    let map = &document.segment_details_map;
    assert_eq!(map.len(), 4);

    let main = "https://example.com/live/main.mp4";
    let init_key = ResourceKey::new(main, Some(&ByteRange::new(0, 719)));
    assert!(map.get(&init_key).assert_success().is_init_segment);

    let first = map
        .get(&ResourceKey::new(main, Some(&ByteRange::new(720, 1719))))
        .assert_success();
    assert_eq!(first.init_segment.as_ref(), Some(&init_key));
    assert_eq!(first.timeline, Some(0.0));

    // No offset: continues after the previous sub-range
    let second = map
        .get(&ResourceKey::new(main, Some(&ByteRange::new(1720, 2919))))
        .assert_success();
    assert_eq!(second.init_segment.as_ref(), Some(&init_key));

    let tail = map
        .get(&ResourceKey::new("https://example.com/live/tail.mp4", None))
        .assert_success();
    assert_eq!(tail.byterange, None);
    assert_eq!(tail.timeline, Some(1.0));

    let linked: Vec<_> = document
        .lines
        .iter()
        .filter_map(|line| line.applicable_segment.as_ref())
        .map(|segment| segment.key.as_str().to_string())
        .collect();
    assert_eq!(
        linked,
        vec![
            format!("{main}-start-720-end-1719"),
            format!("{main}-start-1720-end-2919"),
            "https://example.com/live/tail.mp4".to_string(),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn media_playlist_inherits_attributes() -> anyhow::Result<()> {
    let data = include_str!("../fixtures/hls/aes128.m3u8");
    let attributes = vidlens::details::ManifestAttributes {
        bandwidth: Some(1280000),
        ..Default::default()
    };
    let document = parse_manifest(
        &HttpClient::default(),
        data,
        BASE,
        Dialect::Hls,
        Some(&attributes),
    )
    .await?;

    let segment = document
        .segment_details_map
        .get(&ResourceKey::new("https://example.com/live/seg6.ts", None))
        .assert_success();
    assert_eq!(segment.manifest_attributes.as_ref(), Some(&attributes));

    let key_file = segment.key_file.as_ref().assert_success();
    assert_eq!(key_file.uri, "https://example.com/keys/0.key");
    assert_eq!(key_file.iv[15], 6);

    Ok(())
}
