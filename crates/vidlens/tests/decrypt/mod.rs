use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use vidlens::{
    decrypt::derive_iv,
    event::SessionEvent,
    handler::{batch::BatchProcessor, FileData},
    VidlensError,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{drain_events, test_handler, AssertWrapper};

const KEY: [u8; 16] = *b"0123456789abcdef";

fn encrypt(data: &[u8], iv: &[u8; 16]) -> Vec<u8> {
    cbc::Encryptor::<aes::Aes128>::new(&KEY.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(data)
}

fn manifest(base: &str) -> FileData {
    FileData {
        url: format!("{base}/hls/index.m3u8"),
        mime_type: Some("application/vnd.apple.mpegurl".to_string()),
        data: include_str!("../fixtures/hls/aes128.m3u8").into(),
        number: 1,
        ..Default::default()
    }
}

fn segment(base: &str, name: &str, data: Vec<u8>, number: u64) -> FileData {
    FileData {
        url: format!("{base}/hls/{name}"),
        mime_type: Some("video/mp2t".to_string()),
        data: data.into(),
        number,
        ..Default::default()
    }
}

#[tokio::test]
async fn aes128_segments_are_decrypted() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/keys/0.key"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(KEY.to_vec()))
        // The key is fetched once and reused for the next segment
        .expect(1)
        .mount(&server)
        .await;

    let (handler, storage, mut events) = test_handler();
    let mut processor = BatchProcessor::new(handler);
    let base = server.uri();

    processor.process(manifest(&base)).await?;

    let first = vec![0x47; 188];
    let second = vec![0x48; 376];
    processor
        .process(segment(&base, "seg5.ts", encrypt(&first, &derive_iv(None, 5, 0)), 1))
        .await?
        .assert_success();
    processor
        .process(segment(&base, "seg6.ts", encrypt(&second, &derive_iv(None, 6, 0)), 2))
        .await?
        .assert_success();

    assert_eq!(storage.get("segments/1.ts").assert_success().as_ref(), first.as_slice());
    assert_eq!(storage.get("segments/2.ts").assert_success().as_ref(), second.as_slice());

    let key_uri = format!("{base}/keys/0.key");
    assert_eq!(
        processor.state().segment_details_map.key_bytes(&key_uri),
        Some(KEY)
    );

    let segments: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Segment(data) => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(segments.len(), 2);
    let key_file = segments[0].key_file.as_ref().assert_success();
    assert_eq!(key_file.uri, key_uri);
    assert_eq!(key_file.method, "AES-128");
    assert_eq!(segments[1].key_file.as_ref().assert_success().iv[15], 6);

    Ok(())
}

#[tokio::test]
async fn missing_key_file() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/keys/0.key"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (handler, storage, _events) = test_handler();
    let mut processor = BatchProcessor::new(handler);
    let base = server.uri();

    processor.process(manifest(&base)).await?;
    let error = processor
        .process(segment(&base, "seg5.ts", vec![0; 32], 1))
        .await
        .unwrap_err();

    match error {
        VidlensError::KeyFetchFailed { url, source } => {
            assert_eq!(url, format!("{base}/keys/0.key"));
            assert!(matches!(*source, VidlensError::HttpError(status) if status.as_u16() == 404));
        }
        e => panic!("unexpected error: {e}"),
    }
    assert!(storage.get("segments/1.ts").is_none());

    Ok(())
}
