// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Callback signature and payload encryption.
//!
//! Signatures are SHA-1 over the token, timestamp, nonce, and ciphertext,
//! sorted and concatenated. Payloads are AES-256-CBC with the IV taken from
//! the first 16 key bytes, padded PKCS#7-style to a 32-byte block. The
//! plaintext frame is 16 random bytes, a big-endian `u32` message length,
//! the message, and the receiver (corp) id.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use ring::rand::{SecureRandom, SystemRandom};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use wecom_core::error::{DecryptError, WecomError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Block size used for padding. Twice the cipher block.
const PAD_BLOCK: usize = 32;

/// Length of the random prefix in the plaintext frame.
const RANDOM_PREFIX: usize = 16;

/// Encoded length of an `EncodingAESKey`.
pub const ENCODING_AES_KEY_LEN: usize = 43;

/// `EncodingAESKey` values are 43 characters without padding, and their
/// final character usually carries nonzero trailing bits.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded 32-byte callback key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CallbackKey([u8; 32]);

impl CallbackKey {
    /// Decodes a 43-character `EncodingAESKey`.
    ///
    /// The error string describes the problem without echoing the key.
    pub fn from_encoding_aes_key(encoded: &str) -> Result<Self, String> {
        let encoded = encoded.trim();
        if encoded.len() != ENCODING_AES_KEY_LEN {
            return Err(format!(
                "expected {ENCODING_AES_KEY_LEN} characters, got {}",
                encoded.len()
            ));
        }
        let mut bytes = KEY_ENGINE
            .decode(encoded)
            .map_err(|_| "not valid base64".to_string())?;
        let key: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("decodes to {} bytes, expected 32", bytes.len()))?;
        bytes.zeroize();
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    fn iv(&self) -> &[u8] {
        &self.0[..16]
    }
}

impl std::fmt::Debug for CallbackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CallbackKey([redacted])")
    }
}

/// Computes the lowercase hex callback signature.
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str, ciphertext: &str) -> String {
    let mut parts = [token, timestamp, nonce, ciphertext];
    parts.sort_unstable();
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Checks a callback signature in constant time. Never panics; any malformed
/// input simply fails verification.
pub fn verify_signature(
    token: &str,
    timestamp: &str,
    nonce: &str,
    ciphertext: &str,
    signature: &str,
) -> bool {
    let expected = compute_signature(token, timestamp, nonce, ciphertext);
    let provided = signature.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Decrypts a base64 callback payload and checks its receiver id.
pub fn decrypt(
    key: &CallbackKey,
    ciphertext_b64: &str,
    expected_receiver: &str,
) -> Result<String, DecryptError> {
    let mut buf = STANDARD
        .decode(ciphertext_b64.trim())
        .map_err(|_| DecryptError::MalformedCiphertext)?;
    if buf.is_empty() || buf.len() % 16 != 0 {
        return Err(DecryptError::MalformedCiphertext);
    }

    let decryptor = Aes256CbcDec::new_from_slices(&key.0, key.iv())
        .map_err(|_| DecryptError::MalformedCiphertext)?;
    let plain = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| DecryptError::MalformedCiphertext)?;
    let framed = strip_padding(plain)?;

    if framed.len() < RANDOM_PREFIX + 4 {
        return Err(DecryptError::LengthMismatch);
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&framed[RANDOM_PREFIX..RANDOM_PREFIX + 4]);
    let msg_len = u32::from_be_bytes(len_bytes) as usize;

    let rest = &framed[RANDOM_PREFIX + 4..];
    if msg_len > rest.len() {
        return Err(DecryptError::LengthMismatch);
    }
    let (message, receiver) = rest.split_at(msg_len);
    if receiver != expected_receiver.as_bytes() {
        return Err(DecryptError::ReceiverMismatch);
    }

    String::from_utf8(message.to_vec()).map_err(|_| DecryptError::InvalidUtf8)
}

/// Encrypts `plaintext` for `receiver`, producing the base64 `Encrypt` value.
pub fn encrypt(key: &CallbackKey, plaintext: &str, receiver: &str) -> Result<String, WecomError> {
    let mut prefix = [0u8; RANDOM_PREFIX];
    SystemRandom::new()
        .fill(&mut prefix)
        .map_err(|_| WecomError::Internal("system random source unavailable".into()))?;
    encrypt_with_prefix(key, &prefix, plaintext, receiver)
}

fn encrypt_with_prefix(
    key: &CallbackKey,
    prefix: &[u8; RANDOM_PREFIX],
    plaintext: &str,
    receiver: &str,
) -> Result<String, WecomError> {
    let msg_len = u32::try_from(plaintext.len())
        .map_err(|_| WecomError::Internal("plaintext too large to frame".into()))?;

    let mut buf = Vec::with_capacity(RANDOM_PREFIX + 4 + plaintext.len() + receiver.len() + PAD_BLOCK);
    buf.extend_from_slice(prefix);
    buf.extend_from_slice(&msg_len.to_be_bytes());
    buf.extend_from_slice(plaintext.as_bytes());
    buf.extend_from_slice(receiver.as_bytes());

    let pad = PAD_BLOCK - buf.len() % PAD_BLOCK;
    buf.resize(buf.len() + pad, pad as u8);

    let len = buf.len();
    let encryptor = Aes256CbcEnc::new_from_slices(&key.0, key.iv())
        .map_err(|e| WecomError::Internal(format!("cipher init failed: {e}")))?;
    let ciphertext = encryptor
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| WecomError::Internal("cipher rejected frame length".into()))?;

    Ok(STANDARD.encode(ciphertext))
}

/// Removes PKCS#7 padding computed over a 32-byte block.
fn strip_padding(data: &[u8]) -> Result<&[u8], DecryptError> {
    let pad = *data.last().ok_or(DecryptError::InvalidPadding)? as usize;
    if pad == 0 || pad > PAD_BLOCK || pad > data.len() {
        return Err(DecryptError::InvalidPadding);
    }
    let (body, padding) = data.split_at(data.len() - pad);
    if padding.iter().any(|&b| b as usize != pad) {
        return Err(DecryptError::InvalidPadding);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";
    const CORP: &str = "wx5823bf96d3bd56c7";

    fn key() -> CallbackKey {
        CallbackKey::from_encoding_aes_key(KEY).unwrap()
    }

    #[test]
    fn key_with_trailing_bits_decodes_to_32_bytes() {
        let key = key();
        assert_eq!(key.0.len(), 32);
        assert_eq!(&key.0[..3], &[0x69, 0xb7, 0x1d]);
    }

    #[test]
    fn key_of_wrong_length_is_rejected() {
        let err = CallbackKey::from_encoding_aes_key("short").unwrap_err();
        assert!(err.contains("43"), "{err}");
        assert!(CallbackKey::from_encoding_aes_key(&format!("{}!", &KEY[..42])).is_err());
    }

    #[test]
    fn key_debug_is_redacted() {
        assert_eq!(format!("{:?}", key()), "CallbackKey([redacted])");
    }

    #[test]
    fn signature_is_order_independent_sha1() {
        let sig = compute_signature("token", "1409659813", "1372623149", "msg");
        assert_eq!(sig.len(), 40);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // Sorting makes argument order irrelevant for the digest.
        assert_eq!(sig, compute_signature("msg", "1372623149", "1409659813", "token"));
    }

    #[test]
    fn verify_accepts_valid_and_rejects_tampered() {
        let sig = compute_signature("token", "1409659813", "nonce", "cipher");
        assert!(verify_signature("token", "1409659813", "nonce", "cipher", &sig));
        assert!(verify_signature(
            "token",
            "1409659813",
            "nonce",
            "cipher",
            &sig.to_uppercase()
        ));
        assert!(!verify_signature("token", "1409659814", "nonce", "cipher", &sig));
        assert!(!verify_signature("token", "1409659813", "nonce", "cipheR", &sig));
        assert!(!verify_signature("token", "1409659813", "nonce", "cipher", ""));
        assert!(!verify_signature("token", "1409659813", "nonce", "cipher", "zz"));
    }

    #[test]
    fn round_trip_preserves_message() {
        let key = key();
        let plaintext = "<xml><Content><![CDATA[你好, world]]></Content></xml>";
        let encrypted = encrypt(&key, plaintext, CORP).unwrap();
        assert_eq!(decrypt(&key, &encrypted, CORP).unwrap(), plaintext);
    }

    #[test]
    fn padding_is_a_full_block_when_frame_is_aligned() {
        // 16 + 4 + 8 + 4 = 32 bytes of frame, so 32 bytes of padding follow.
        let key = key();
        let encrypted = encrypt_with_prefix(&key, &[7u8; 16], "12345678", "corp").unwrap();
        let raw = STANDARD.decode(&encrypted).unwrap();
        assert_eq!(raw.len(), 64);
        assert_eq!(decrypt(&key, &encrypted, "corp").unwrap(), "12345678");
    }

    #[test]
    fn wrong_receiver_is_rejected() {
        let key = key();
        let encrypted = encrypt(&key, "hello", CORP).unwrap();
        assert_eq!(
            decrypt(&key, &encrypted, "wx-other-corp"),
            Err(DecryptError::ReceiverMismatch)
        );
    }

    #[test]
    fn wrong_key_fails_closed() {
        let encrypted = encrypt(&key(), "hello", CORP).unwrap();
        let other = CallbackKey::from_bytes([9u8; 32]);
        assert!(decrypt(&other, &encrypted, CORP).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = key();
        let encrypted = encrypt(&key, "hello world, this is a payload", CORP).unwrap();
        let mut raw = STANDARD.decode(&encrypted).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(decrypt(&key, &STANDARD.encode(&raw), CORP).is_err());
    }

    #[test]
    fn malformed_ciphertext_is_rejected() {
        let key = key();
        assert_eq!(
            decrypt(&key, "not base64!!", CORP),
            Err(DecryptError::MalformedCiphertext)
        );
        assert_eq!(
            decrypt(&key, &STANDARD.encode([1u8; 15]), CORP),
            Err(DecryptError::MalformedCiphertext)
        );
        assert_eq!(decrypt(&key, "", CORP), Err(DecryptError::MalformedCiphertext));
    }

    #[test]
    fn oversized_length_field_is_rejected() {
        let key = key();
        let mut frame = vec![0u8; 16];
        frame.extend_from_slice(&1000u32.to_be_bytes());
        frame.extend_from_slice(b"tiny");
        let pad = PAD_BLOCK - frame.len() % PAD_BLOCK;
        frame.resize(frame.len() + pad, pad as u8);
        let len = frame.len();
        let enc = Aes256CbcEnc::new_from_slices(&key.0, key.iv()).unwrap();
        let ct = enc.encrypt_padded_mut::<NoPadding>(&mut frame, len).unwrap().to_vec();
        assert_eq!(
            decrypt(&key, &STANDARD.encode(ct), ""),
            Err(DecryptError::LengthMismatch)
        );
    }

    #[test]
    fn strip_padding_rules() {
        assert_eq!(strip_padding(&[1, 2, 3, 2, 2]).unwrap(), &[1, 2, 3]);
        assert_eq!(strip_padding(&[1, 2, 0]), Err(DecryptError::InvalidPadding));
        assert_eq!(strip_padding(&[1, 3, 2]), Err(DecryptError::InvalidPadding));
        assert_eq!(strip_padding(&[33u8; 33]), Err(DecryptError::InvalidPadding));
        assert_eq!(strip_padding(&[]), Err(DecryptError::InvalidPadding));
    }
}
