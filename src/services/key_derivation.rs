// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # Key Derivation Service
//!
//! This module turns the caller's credentials into the 32-byte AES key that
//! encrypts the vault body. Derivation has three stages:
//!
//! 1. **Keyfile reading**: a keyfile becomes 32 bytes by one of three
//!    size-dependent rules (raw, hex-decoded, or hashed).
//! 2. **Composition**: the passphrase hash, the keyfile key, or a hash of
//!    both becomes the master key.
//! 3. **Stretch**: the master key is encrypted `rounds` times with
//!    AES-256-ECB under the transform seed, hashed, then hashed once more
//!    together with the final seed.
//!
//! ## Keyfile Rules
//!
//! - exactly 32 bytes: the raw content is the key
//! - exactly 64 bytes: the content is decoded as hex; when it is not valid
//!   hex, the whole file is hashed like any other size
//! - any other size: SHA-256 over the full content, streamed in 2KiB chunks
//!
//! ## Memory Security
//!
//! Master keys and intermediate stretch state are wiped after use; callers
//! receive the final key inside [`Zeroizing`] so the same holds for them.
//!
//! ## Performance
//!
//! The stretch is the only CPU-bound hot spot in the codec (150000 rounds by
//! default). The two 16-byte halves of the master key are independent under
//! ECB, so they are stretched on parallel rayon workers.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::VaultError;

/// Chunk size for streaming keyfile digests.
const KEYFILE_CHUNK: usize = 2048;

/// Reads a keyfile and reduces it to a 32-byte key.
///
/// # Errors
/// - `VaultError::KeyfileMissing` when the path does not exist
/// - `VaultError::KeyfileIO` when the file cannot be read
pub fn keyfile_key(path: &Path) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    if !path.exists() {
        return Err(VaultError::KeyfileMissing(path.display().to_string()));
    }
    let mut file = File::open(path).map_err(|e| VaultError::KeyfileIO(e.to_string()))?;
    let size = file
        .metadata()
        .map_err(|e| VaultError::KeyfileIO(e.to_string()))?
        .len();

    if size == 32 {
        let mut key = Zeroizing::new([0u8; 32]);
        file.read_exact(key.as_mut())
            .map_err(|e| VaultError::KeyfileIO(e.to_string()))?;
        return Ok(key);
    }

    if size == 64 {
        let mut hex_buf = Zeroizing::new([0u8; 64]);
        file.read_exact(hex_buf.as_mut())
            .map_err(|e| VaultError::KeyfileIO(e.to_string()))?;
        let mut key = Zeroizing::new([0u8; 32]);
        if hex::decode_to_slice(hex_buf.as_ref(), key.as_mut()).is_ok() {
            return Ok(key);
        }
        // Not valid hex: hash the whole file from the start instead.
        file.seek(SeekFrom::Start(0))
            .map_err(|e| VaultError::KeyfileIO(e.to_string()))?;
    }

    let mut hasher = Sha256::new();
    let mut chunk = Zeroizing::new([0u8; KEYFILE_CHUNK]);
    loop {
        let n = file
            .read(chunk.as_mut())
            .map_err(|e| VaultError::KeyfileIO(e.to_string()))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(Zeroizing::new(hasher.finalize().into()))
}

/// Composes the master key from a passphrase, a keyfile, or both.
///
/// - passphrase only: `SHA256(passphrase)`
/// - keyfile only: the keyfile key
/// - both: `SHA256(SHA256(passphrase) || keyfile_key)`
///
/// # Errors
/// Returns `VaultError::MissingCredentials` when neither secret is given,
/// plus the keyfile reader's errors.
pub fn compose_master_key(
    password: Option<&str>,
    keyfile: Option<&Path>,
) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    match (password, keyfile) {
        (None, None) => Err(VaultError::MissingCredentials),
        (Some(password), None) => Ok(password_key(password)),
        (None, Some(keyfile)) => keyfile_key(keyfile),
        (Some(password), Some(keyfile)) => {
            let password_key = password_key(password);
            let file_key = keyfile_key(keyfile)?;
            let mut hasher = Sha256::new();
            hasher.update(password_key.as_ref());
            hasher.update(file_key.as_ref());
            Ok(Zeroizing::new(hasher.finalize().into()))
        }
    }
}

/// Hashes a passphrase into its 32-byte key.
fn password_key(password: &str) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(Sha256::digest(password.as_bytes()).into())
}

/// Stretches the master key into the final 32-byte AES key.
///
/// The master key is encrypted `rounds` times with AES-256-ECB keyed by the
/// transform seed, hashed with SHA-256, and the digest is hashed once more
/// prefixed by the final seed. The two ECB blocks never mix, so the halves
/// run on parallel rayon workers.
pub fn transform_key(
    master: &[u8; 32],
    transf_randomseed: &[u8; 32],
    final_randomseed: &[u8; 16],
    rounds: u32,
) -> Zeroizing<[u8; 32]> {
    let cipher = Aes256::new(GenericArray::from_slice(transf_randomseed));

    let mut left = Zeroizing::new([0u8; 16]);
    let mut right = Zeroizing::new([0u8; 16]);
    left.copy_from_slice(&master[..16]);
    right.copy_from_slice(&master[16..]);

    rayon::join(
        || {
            let block = GenericArray::from_mut_slice(left.as_mut());
            for _ in 0..rounds {
                cipher.encrypt_block(block);
            }
        },
        || {
            let block = GenericArray::from_mut_slice(right.as_mut());
            for _ in 0..rounds {
                cipher.encrypt_block(block);
            }
        },
    );

    let mut hasher = Sha256::new();
    hasher.update(left.as_ref());
    hasher.update(right.as_ref());
    let mut stretched: [u8; 32] = hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(final_randomseed);
    hasher.update(stretched);
    stretched.zeroize();

    Zeroizing::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_keyfile(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_missing_keyfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.key");
        assert!(matches!(keyfile_key(&path), Err(VaultError::KeyfileMissing(_))));
    }

    #[test]
    fn test_32_byte_keyfile_is_raw() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..32).collect();
        let path = write_keyfile(&dir, "raw.key", &content);
        assert_eq!(keyfile_key(&path).unwrap().as_ref(), content.as_slice());
    }

    #[test]
    fn test_64_byte_hex_keyfile_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let raw: Vec<u8> = (0u8..32).map(|i| i.wrapping_mul(7)).collect();
        let path = write_keyfile(&dir, "hex.key", hex::encode(&raw).as_bytes());
        assert_eq!(keyfile_key(&path).unwrap().as_ref(), raw.as_slice());
    }

    #[test]
    fn test_64_byte_non_hex_keyfile_is_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = hex::encode([0xABu8; 32]).into_bytes();
        content[10] = b'g'; // one non-hex digit
        let path = write_keyfile(&dir, "nothex.key", &content);
        let expected: [u8; 32] = Sha256::digest(&content).into();
        assert_eq!(keyfile_key(&path).unwrap().as_ref(), &expected);
    }

    #[test]
    fn test_other_sizes_are_hashed() {
        let dir = tempfile::tempdir().unwrap();
        for size in [0usize, 31, 33, 63, 65, 5000] {
            let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let path = write_keyfile(&dir, &format!("sz{}.key", size), &content);
            let expected: [u8; 32] = Sha256::digest(&content).into();
            assert_eq!(keyfile_key(&path).unwrap().as_ref(), &expected, "size {}", size);
        }
    }

    #[test]
    fn test_compose_requires_a_secret() {
        assert_eq!(
            compose_master_key(None, None).map(|_| ()),
            Err(VaultError::MissingCredentials)
        );
    }

    #[test]
    fn test_compose_password_only() {
        let key = compose_master_key(Some("correct horse"), None).unwrap();
        let expected: [u8; 32] = Sha256::digest(b"correct horse").into();
        assert_eq!(key.as_ref(), &expected);
    }

    #[test]
    fn test_compose_both_hashes_the_pair() {
        let dir = tempfile::tempdir().unwrap();
        let file_key: Vec<u8> = (100..132).collect();
        let path = write_keyfile(&dir, "both.key", &file_key);

        let key = compose_master_key(Some("pw"), Some(&path)).unwrap();

        let password_key: [u8; 32] = Sha256::digest(b"pw").into();
        let mut hasher = Sha256::new();
        hasher.update(password_key);
        hasher.update(&file_key);
        let expected: [u8; 32] = hasher.finalize().into();
        assert_eq!(key.as_ref(), &expected);
    }

    #[test]
    fn test_transform_zero_rounds_is_double_hash() {
        // With no ECB rounds the stretch reduces to two chained hashes,
        // which an independent oracle can compute.
        let master = [0x42u8; 32];
        let transf_seed = [0x01u8; 32];
        let final_seed = [0x02u8; 16];

        let key = transform_key(&master, &transf_seed, &final_seed, 0);

        let inner: [u8; 32] = Sha256::digest(master).into();
        let mut hasher = Sha256::new();
        hasher.update(final_seed);
        hasher.update(inner);
        let expected: [u8; 32] = hasher.finalize().into();
        assert_eq!(key.as_ref(), &expected);
    }

    #[test]
    fn test_transform_single_round_matches_ecb_oracle() {
        let master = [0x13u8; 32];
        let transf_seed = [0x37u8; 32];
        let final_seed = [0x99u8; 16];

        let cipher = Aes256::new(GenericArray::from_slice(&transf_seed));
        let mut oracle = master;
        let (left, right) = oracle.split_at_mut(16);
        cipher.encrypt_block(GenericArray::from_mut_slice(left));
        cipher.encrypt_block(GenericArray::from_mut_slice(right));
        let inner: [u8; 32] = Sha256::digest(oracle).into();
        let mut hasher = Sha256::new();
        hasher.update(final_seed);
        hasher.update(inner);
        let expected: [u8; 32] = hasher.finalize().into();

        let key = transform_key(&master, &transf_seed, &final_seed, 1);
        assert_eq!(key.as_ref(), &expected);
    }

    #[test]
    fn test_transform_depends_on_every_input() {
        let master = [0u8; 32];
        let base = transform_key(&master, &[1; 32], &[2; 16], 3);
        assert_ne!(base, transform_key(&[1; 32], &[1; 32], &[2; 16], 3));
        assert_ne!(base, transform_key(&master, &[9; 32], &[2; 16], 3));
        assert_ne!(base, transform_key(&master, &[1; 32], &[9; 16], 3));
        assert_ne!(base, transform_key(&master, &[1; 32], &[2; 16], 4));
    }
}
