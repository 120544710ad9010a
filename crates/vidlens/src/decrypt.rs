use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use crate::{
    details::KeyFileDescriptor,
    error::{VidlensError, VidlensResult},
    fetch::Fetcher,
};

/// IV of a segment: the explicit hexadecimal `IV` attribute, or the media
/// sequence number of the segment as a big-endian 128-bit integer.
pub fn derive_iv(explicit: Option<&str>, media_sequence: u64, index: usize) -> [u8; 16] {
    explicit
        .and_then(|iv| {
            let iv = iv
                .strip_prefix("0x")
                .or_else(|| iv.strip_prefix("0X"))
                .unwrap_or(iv);
            u128::from_str_radix(iv, 16).ok()
        })
        .unwrap_or((media_sequence + index as u64) as u128)
        .to_be_bytes()
}

pub fn aes128_decrypt(data: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> VidlensResult<Vec<u8>> {
    let decryptor = cbc::Decryptor::<aes::Aes128>::new(key.into(), iv.into());
    Ok(decryptor.decrypt_padded_vec_mut::<Pkcs7>(data)?)
}

pub struct DecryptResult {
    pub buffer: Vec<u8>,
    pub key_bytes: [u8; 16],
}

/// Decrypt one AES-128 segment, fetching the key when `key_bytes` is unknown.
pub async fn decrypt<F>(
    fetcher: &F,
    data: &[u8],
    key_file: &KeyFileDescriptor,
    key_bytes: Option<[u8; 16]>,
) -> VidlensResult<DecryptResult>
where
    F: Fetcher,
{
    let key_bytes = match key_bytes {
        Some(key_bytes) => key_bytes,
        None => {
            tracing::debug!(url = %key_file.uri, "Fetching key file");
            let response = fetcher.fetch(&key_file.uri, None).await.map_err(|e| {
                VidlensError::KeyFetchFailed {
                    url: key_file.uri.clone(),
                    source: Box::new(e),
                }
            })?;
            let bytes = response.bytes.to_vec();
            bytes
                .try_into()
                .map_err(VidlensError::InvalidAes128Key)?
        }
    };

    let buffer = aes128_decrypt(data, &key_bytes, &key_file.iv)?;
    Ok(DecryptResult { buffer, key_bytes })
}
