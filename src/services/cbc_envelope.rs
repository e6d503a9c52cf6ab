// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # CBC Envelope Service
//!
//! AES-256-CBC encryption and decryption of the vault body with the format's
//! padding discipline.
//!
//! ## Padding
//!
//! On encrypt the plaintext is padded with `p = 16 - (len mod 16)` copies of
//! the byte `p`; `p` is always in `1..=16`, so an exact multiple of the block
//! size gains a full padding block. On decrypt the last byte is *trusted* as
//! the padding length and that many bytes are truncated, without verifying
//! the padding bytes themselves. The contents hash stored in the header is
//! the integrity gate; validating padding here would only change which error
//! a wrong key produces.

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroize;

use crate::VaultError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// Encrypts the body plaintext under the final key and IV.
///
/// The returned ciphertext length is `plaintext.len()` rounded up to the
/// next multiple of 16 (a full extra block when already aligned).
pub fn encrypt(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let pad = BLOCK_LEN - (plaintext.len() % BLOCK_LEN);
    let mut padded = Vec::with_capacity(plaintext.len() + pad);
    padded.extend_from_slice(plaintext);
    padded.resize(plaintext.len() + pad, pad as u8);

    let ciphertext = Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_vec_mut::<NoPadding>(&padded);
    padded.zeroize();
    ciphertext
}

/// Decrypts the body ciphertext and strips the padding.
///
/// # Errors
/// Returns `VaultError::DecryptFailed` when the ciphertext is not a whole
/// number of blocks. An empty ciphertext yields an empty plaintext; whether
/// that is acceptable depends on the header's group count and is judged by
/// the caller.
pub fn decrypt(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, VaultError> {
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }

    let mut plaintext = Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| VaultError::DecryptFailed)?;

    if let Some(&pad) = plaintext.last() {
        plaintext.truncate(plaintext.len().saturating_sub(pad as usize));
    }
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: [u8; 32] = [0x42; 32];
    const IV: [u8; 16] = [0x24; 16];

    #[test]
    fn test_ciphertext_is_block_aligned_and_grows() {
        for len in [0usize, 1, 15, 16, 17, 31, 32, 100] {
            let plaintext = vec![0xABu8; len];
            let ciphertext = encrypt(&KEY, &IV, &plaintext);
            assert_eq!(ciphertext.len() % BLOCK_LEN, 0, "len {}", len);
            // Padding is always 1..=16 bytes, never zero.
            assert_eq!(ciphertext.len(), (len / BLOCK_LEN + 1) * BLOCK_LEN, "len {}", len);
        }
    }

    #[test]
    fn test_empty_ciphertext_decrypts_to_empty() {
        assert_eq!(decrypt(&KEY, &IV, &[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_partial_block_rejected() {
        let ciphertext = encrypt(&KEY, &IV, b"hello");
        assert_eq!(
            decrypt(&KEY, &IV, &ciphertext[..ciphertext.len() - 1]),
            Err(VaultError::DecryptFailed)
        );
    }

    #[test]
    fn test_wrong_key_changes_plaintext() {
        let ciphertext = encrypt(&KEY, &IV, b"attack at dawn!!");
        let mut wrong = KEY;
        wrong[0] ^= 1;
        // Wrong-key decryption is garbage (or an error if the trusted pad
        // byte swallows everything), never the original text.
        match decrypt(&wrong, &IV, &ciphertext) {
            Ok(recovered) => assert_ne!(recovered, b"attack at dawn!!"),
            Err(err) => assert_eq!(err, VaultError::DecryptFailed),
        }
    }

    proptest! {
        /// Padding law: encrypt-then-decrypt with the same key and IV
        /// recovers the original bytes for any plaintext length.
        #[test]
        fn prop_encrypt_decrypt_round_trip(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let ciphertext = encrypt(&KEY, &IV, &plaintext);
            let recovered = decrypt(&KEY, &IV, &ciphertext).unwrap();
            prop_assert_eq!(recovered, plaintext);
        }
    }
}
