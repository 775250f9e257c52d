//! Origin payload decryption and parsing
//!
//! Info responses arrive as a base64 blob: a 16-byte IV followed by
//! AES-128-CBC ciphertext under a fixed key. The plaintext is JSON, but the
//! origin pads it with trailing NUL bytes instead of standard block padding
//! and sometimes wraps it in extraneous bytes, so decoding trims NULs and
//! parses only the span between the first `{` and the last `}`.

use aes::Aes128;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use serde::Deserialize;

use crate::types::{ArchwayError, Result};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Fixed symmetric key the origin encrypts info payloads with (hex)
const PAYLOAD_KEY_HEX: &str = "C5D58EF67A7584E4A29F6C35BBC4EB12";

/// AES block / IV length in bytes
const BLOCK_LEN: usize = 16;

/// How much of a malformed plaintext to keep for diagnostics
const DIAGNOSTIC_LEN: usize = 500;

/// Structured info decoded from an origin payload.
///
/// `resolution_key` is the opaque origin-issued token required for
/// subsequent download-candidate probing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecodedInfo {
    pub title: String,
    #[serde(rename = "durationLabel")]
    pub duration_label: String,
    #[serde(rename = "thumbnail")]
    pub thumbnail_url: String,
    #[serde(rename = "key")]
    pub resolution_key: String,
}

/// Decrypt and parse an origin info payload.
///
/// Deterministic: the same blob always yields the same record. Any
/// decryption, decoding, or structural failure surfaces as
/// `ArchwayError::Decode`; nothing is silently swallowed.
pub fn decode_payload(blob: &str) -> Result<DecodedInfo> {
    // Origin responses embed whitespace and newlines in the base64
    let cleaned: String = blob.chars().filter(|c| !c.is_whitespace()).collect();
    let data = BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| ArchwayError::Decode(format!("invalid base64 payload: {e}")))?;

    if data.len() < BLOCK_LEN {
        return Err(ArchwayError::Decode(format!(
            "payload too short: {} bytes",
            data.len()
        )));
    }

    let (iv, ciphertext) = data.split_at(BLOCK_LEN);
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(ArchwayError::Decode(format!(
            "ciphertext length {} is not a multiple of the block size",
            ciphertext.len()
        )));
    }

    let key = hex::decode(PAYLOAD_KEY_HEX)
        .map_err(|e| ArchwayError::Internal(format!("bad payload key constant: {e}")))?;

    let mut buf = ciphertext.to_vec();
    let plaintext = Aes128CbcDec::new_from_slices(&key, iv)
        .map_err(|e| ArchwayError::Internal(format!("bad key or IV length: {e}")))?
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| ArchwayError::Decode(format!("decryption failed: {e}")))?;

    // The origin NUL-pads plaintext to the block boundary
    let trimmed_len = plaintext.len() - plaintext.iter().rev().take_while(|b| **b == 0).count();
    let text = std::str::from_utf8(&plaintext[..trimmed_len])
        .map_err(|e| ArchwayError::Decode(format!("plaintext is not UTF-8: {e}")))?
        .trim();

    parse_info_json(text)
}

/// Parse the JSON span of a decrypted payload.
///
/// Locates the first `{` and the last `}` and parses only that span; falls
/// back to the whole trimmed string if no braces are found.
fn parse_info_json(text: &str) -> Result<DecodedInfo> {
    let span = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    };

    serde_json::from_str(span).map_err(|e| {
        ArchwayError::Decode(format!(
            "failed to parse info payload: {e}; plaintext: {}",
            truncate_for_log(text)
        ))
    })
}

fn truncate_for_log(text: &str) -> String {
    if text.chars().count() <= DIAGNOSTIC_LEN {
        text.to_string()
    } else {
        let head: String = text.chars().take(DIAGNOSTIC_LEN).collect();
        format!("{head}...")
    }
}

/// Build an encrypted payload for a plaintext string, for use in tests.
#[cfg(test)]
pub(crate) fn encrypt_fixture(plaintext: &str) -> String {
    use cbc::cipher::BlockEncryptMut;
    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    let key = hex::decode(PAYLOAD_KEY_HEX).unwrap();
    let iv = [7u8; BLOCK_LEN];

    // NUL-pad to the block boundary, as the origin does
    let mut buf = plaintext.as_bytes().to_vec();
    let padded_len = buf.len().div_ceil(BLOCK_LEN) * BLOCK_LEN;
    buf.resize(padded_len.max(BLOCK_LEN), 0);

    let msg_len = buf.len();
    let ciphertext = Aes128CbcEnc::new_from_slices(&key, &iv)
        .unwrap()
        .encrypt_padded_mut::<NoPadding>(&mut buf, msg_len)
        .unwrap();

    let mut data = iv.to_vec();
    data.extend_from_slice(ciphertext);
    BASE64.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_JSON: &str = r#"{"title":"A Song","durationLabel":"3:21","thumbnail":"https://cdn.example/t.jpg","key":"res-key-1"}"#;

    #[test]
    fn test_decode_roundtrip() {
        let blob = encrypt_fixture(CLEAN_JSON);
        let info = decode_payload(&blob).unwrap();

        assert_eq!(info.title, "A Song");
        assert_eq!(info.duration_label, "3:21");
        assert_eq!(info.thumbnail_url, "https://cdn.example/t.jpg");
        assert_eq!(info.resolution_key, "res-key-1");
    }

    #[test]
    fn test_decode_idempotent() {
        let blob = encrypt_fixture(CLEAN_JSON);
        let first = decode_payload(&blob).unwrap();
        let second = decode_payload(&blob).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_tolerates_embedded_whitespace() {
        let blob = encrypt_fixture(CLEAN_JSON);
        // Re-wrap the base64 with newlines and spaces
        let wrapped: String = blob
            .chars()
            .enumerate()
            .flat_map(|(i, c)| {
                if i > 0 && i % 20 == 0 {
                    vec!['\n', ' ', c]
                } else {
                    vec![c]
                }
            })
            .collect();

        let info = decode_payload(&wrapped).unwrap();
        assert_eq!(info.title, "A Song");
    }

    #[test]
    fn test_decode_with_extraneous_bytes() {
        // Origin sometimes prepends/appends garbage around the JSON
        let dirty = format!("xx\u{1}{CLEAN_JSON}trailing junk");
        let clean_info = decode_payload(&encrypt_fixture(CLEAN_JSON)).unwrap();
        let dirty_info = decode_payload(&encrypt_fixture(&dirty)).unwrap();
        assert_eq!(clean_info, dirty_info);
    }

    #[test]
    fn test_decode_invalid_base64() {
        let err = decode_payload("!!! not base64 !!!").unwrap_err();
        assert!(matches!(err, ArchwayError::Decode(_)));
    }

    #[test]
    fn test_decode_too_short() {
        let blob = BASE64.encode([0u8; 8]);
        let err = decode_payload(&blob).unwrap_err();
        assert!(matches!(err, ArchwayError::Decode(_)));
    }

    #[test]
    fn test_decode_bad_json_keeps_diagnostics() {
        let blob = encrypt_fixture("this is not json at all");
        let err = decode_payload(&blob).unwrap_err();
        match err {
            ArchwayError::Decode(msg) => assert!(msg.contains("not json")),
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_diagnostic_truncation() {
        let long = "x".repeat(2000);
        let truncated = truncate_for_log(&long);
        assert!(truncated.len() < 600);
        assert!(truncated.ends_with("..."));
    }
}
