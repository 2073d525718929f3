//! Passphrase-based authenticated encryption.
//!
//! Blob layout (base64 of): `salt[16] || iv[12] || ciphertext || tag[16]`.
//! Key: PBKDF2-HMAC-SHA256 over the passphrase and salt, 256 bits.
//! Cipher: AES-256-GCM with an empty AAD.
//!
//! Changing either length is a breaking format change.

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;

/// PBKDF2 rounds for every file-backed vault. Blobs do not record it.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Low-level crypto failures. Callers outside this crate only ever see the
/// generic "incorrect passphrase" for decryption failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("blob is not valid base64")]
    Encoding,

    #[error("blob is too short")]
    Truncated,

    #[error("authentication failed")]
    Authentication,

    #[error("system random source failed")]
    Random,

    #[error("encryption failed")]
    Seal,
}

/// Stretch a passphrase into a 256-bit key.
pub fn derive_key(passphrase: &str, salt: &[u8], iterations: NonZeroU32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        passphrase.as_bytes(),
        &mut key,
    );
    key
}

fn aead_key(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, CryptoError> {
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| CryptoError::Seal)
}

/// Encrypt `plaintext` under a fresh random salt and IV, returning the base64 blob.
pub fn seal(
    plaintext: &[u8],
    passphrase: &str,
    iterations: NonZeroU32,
) -> Result<String, CryptoError> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rng.fill(&mut salt).map_err(|_| CryptoError::Random)?;
    rng.fill(&mut iv).map_err(|_| CryptoError::Random)?;

    let key = aead_key(&derive_key(passphrase, &salt, iterations))?;
    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Seal)?;

    let mut blob = Vec::with_capacity(SALT_LEN + IV_LEN + in_out.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&in_out);
    Ok(STANDARD.encode(blob))
}

/// Decrypt a base64 blob. Fails closed: no plaintext unless the tag verifies.
pub fn open(blob: &str, passphrase: &str, iterations: NonZeroU32) -> Result<Vec<u8>, CryptoError> {
    let raw = STANDARD
        .decode(blob.trim())
        .map_err(|_| CryptoError::Encoding)?;
    if raw.len() < SALT_LEN + IV_LEN + TAG_LEN {
        return Err(CryptoError::Truncated);
    }

    let (salt, rest) = raw.split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);
    let nonce = Nonce::try_assume_unique_for_key(iv).map_err(|_| CryptoError::Truncated)?;

    let key = aead_key(&derive_key(passphrase, salt, iterations))?;
    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Authentication)?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> NonZeroU32 {
        NonZeroU32::new(1).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let blob = seal(b"{\"openai\":\"k1\"}", "p1", fast()).unwrap();
        assert_eq!(open(&blob, "p1", fast()).unwrap(), b"{\"openai\":\"k1\"}");
    }

    #[test]
    fn test_blob_layout_lengths() {
        let blob = seal(b"abc", "p", fast()).unwrap();
        let raw = STANDARD.decode(blob).unwrap();
        assert_eq!(raw.len(), SALT_LEN + IV_LEN + 3 + TAG_LEN);
    }

    #[test]
    fn test_fresh_salt_and_iv_every_seal() {
        let a = STANDARD.decode(seal(b"same", "p", fast()).unwrap()).unwrap();
        let b = STANDARD.decode(seal(b"same", "p", fast()).unwrap()).unwrap();
        assert_ne!(a[..SALT_LEN], b[..SALT_LEN]);
        assert_ne!(a[SALT_LEN..SALT_LEN + IV_LEN], b[SALT_LEN..SALT_LEN + IV_LEN]);
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let blob = seal(b"secret", "p1", fast()).unwrap();
        assert_eq!(open(&blob, "p2", fast()), Err(CryptoError::Authentication));
    }

    #[test]
    fn test_iterations_are_part_of_the_key() {
        let blob = seal(b"secret", "p1", fast()).unwrap();
        let two = NonZeroU32::new(2).unwrap();
        assert_eq!(open(&blob, "p1", two), Err(CryptoError::Authentication));
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let blob = seal(b"{\"openai\":\"k1\"}", "p1", fast()).unwrap();
        let raw = STANDARD.decode(&blob).unwrap();
        for i in 0..raw.len() {
            for bit in 0..8 {
                let mut tampered = raw.clone();
                tampered[i] ^= 1 << bit;
                let result = open(&STANDARD.encode(&tampered), "p1", fast());
                assert_eq!(result, Err(CryptoError::Authentication), "byte {} bit {}", i, bit);
            }
        }
    }

    #[test]
    fn test_malformed_blobs() {
        assert_eq!(open("not base64!!", "p", fast()), Err(CryptoError::Encoding));
        let short = STANDARD.encode([0u8; SALT_LEN + IV_LEN + TAG_LEN - 1]);
        assert_eq!(open(&short, "p", fast()), Err(CryptoError::Truncated));
    }
}
