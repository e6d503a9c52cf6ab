// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # Vault File Header
//!
//! This module defines [`VaultHeader`], the fixed 124-byte header at the
//! start of every vault file, and its binary codec.
//!
//! ## Binary Layout
//!
//! All multi-byte integers are little-endian regardless of host:
//!
//! ```text
//! offset  size  field
//! 0       4     signature1         = 0x9AA2D903
//! 4       4     signature2         = 0xB54BFB65
//! 8       4     enc_flag           (bit 1 set means AES)
//! 12      4     version            (high 24 bits must match 0x00030002)
//! 16      16    final_randomseed
//! 32      16    enc_iv
//! 48      4     num_groups
//! 52      4     num_entries
//! 56      32    contents_hash      (SHA-256 of the decrypted body)
//! 88      32    transf_randomseed
//! 120     4     key_transf_rounds
//! 124           encrypted body, no alignment padding
//! ```
//!
//! ## Validation
//!
//! Parsing rejects wrong signatures, versions whose high three bytes differ
//! from the supported one, and encryption flags without the AES bit. The
//! contents hash is *not* checked here - it covers the decrypted body and is
//! verified by the facade once decryption has happened.

use crate::VaultError;
use rand::rngs::OsRng;
use rand::RngCore;

/// First magic word of a vault file.
pub const SIGNATURE_1: u32 = 0x9AA2_D903;

/// Second magic word of a vault file.
pub const SIGNATURE_2: u32 = 0xB54B_FB65;

/// Format version written on save. On read only the high three bytes are
/// compared, so any `0x000302xx` variant is accepted.
pub const VERSION: u32 = 0x0003_0002;

/// Encryption flag bit selecting AES-256-CBC, the only supported cipher.
pub const ENC_FLAG_AES: u32 = 2;

/// Byte length of the fixed header.
pub const HEADER_LEN: usize = 124;

/// Floor for the key transform round count; lower stored values are raised
/// to this on save.
pub const MIN_KEY_TRANSF_ROUNDS: u32 = 150_000;

/// The fixed 124-byte vault file header.
///
/// The header carries everything needed to derive the final key and decrypt
/// the body: seeds, IV, round count, the record counts, and the SHA-256 of
/// the plaintext body used as the integrity gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultHeader {
    /// Cipher selection flags; bit 1 set means AES.
    pub enc_flag: u32,
    /// Format version word.
    pub version: u32,
    /// Seed hashed into the final key, regenerated on every save.
    pub final_randomseed: [u8; 16],
    /// CBC initialization vector, regenerated on every save.
    pub enc_iv: [u8; 16],
    /// Number of group records in the body.
    pub num_groups: u32,
    /// Number of entry records in the body.
    pub num_entries: u32,
    /// SHA-256 of the decrypted body.
    pub contents_hash: [u8; 32],
    /// Seed keying the ECB key stretch.
    pub transf_randomseed: [u8; 32],
    /// Number of ECB rounds in the key stretch.
    pub key_transf_rounds: u32,
}

impl VaultHeader {
    /// Creates the header state of a fresh vault: AES flag, current version,
    /// a newly drawn transform seed, and the default round count. Seeds for
    /// the envelope itself are drawn on save.
    pub fn new() -> Self {
        let mut transf_randomseed = [0u8; 32];
        OsRng.fill_bytes(&mut transf_randomseed);
        VaultHeader {
            enc_flag: ENC_FLAG_AES,
            version: VERSION,
            final_randomseed: [0u8; 16],
            enc_iv: [0u8; 16],
            num_groups: 0,
            num_entries: 0,
            contents_hash: [0u8; 32],
            transf_randomseed,
            key_transf_rounds: MIN_KEY_TRANSF_ROUNDS,
        }
    }

    /// Parses and validates a header from the start of a vault file.
    ///
    /// # Errors
    /// - `VaultError::ShortFile` when fewer than 124 bytes are available
    /// - `VaultError::BadSignature` when either magic word is wrong
    /// - `VaultError::UnsupportedVersion` when the high three version bytes
    ///   differ from the supported format
    /// - `VaultError::UnsupportedCipher` when the AES flag bit is clear
    pub fn parse(buf: &[u8]) -> Result<Self, VaultError> {
        if buf.len() < HEADER_LEN {
            return Err(VaultError::ShortFile(buf.len()));
        }

        let sig1 = read_u32(buf, 0);
        let sig2 = read_u32(buf, 4);
        if sig1 != SIGNATURE_1 || sig2 != SIGNATURE_2 {
            return Err(VaultError::BadSignature);
        }

        let header = VaultHeader {
            enc_flag: read_u32(buf, 8),
            version: read_u32(buf, 12),
            final_randomseed: read_array(buf, 16),
            enc_iv: read_array(buf, 32),
            num_groups: read_u32(buf, 48),
            num_entries: read_u32(buf, 52),
            contents_hash: read_array(buf, 56),
            transf_randomseed: read_array(buf, 88),
            key_transf_rounds: read_u32(buf, 120),
        };

        if header.version & 0xFFFF_FF00 != VERSION & 0xFFFF_FF00 {
            return Err(VaultError::UnsupportedVersion(header.version));
        }
        if header.enc_flag & ENC_FLAG_AES == 0 {
            return Err(VaultError::UnsupportedCipher(header.enc_flag));
        }

        Ok(header)
    }

    /// Packs the header into its 124-byte wire form.
    pub fn pack(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&SIGNATURE_1.to_le_bytes());
        out[4..8].copy_from_slice(&SIGNATURE_2.to_le_bytes());
        out[8..12].copy_from_slice(&self.enc_flag.to_le_bytes());
        out[12..16].copy_from_slice(&self.version.to_le_bytes());
        out[16..32].copy_from_slice(&self.final_randomseed);
        out[32..48].copy_from_slice(&self.enc_iv);
        out[48..52].copy_from_slice(&self.num_groups.to_le_bytes());
        out[52..56].copy_from_slice(&self.num_entries.to_le_bytes());
        out[56..88].copy_from_slice(&self.contents_hash);
        out[88..120].copy_from_slice(&self.transf_randomseed);
        out[120..124].copy_from_slice(&self.key_transf_rounds.to_le_bytes());
        out
    }

    /// Draws a fresh final seed and IV from the operating system RNG.
    /// Called once per save so that no two ciphertexts share an IV.
    pub fn regenerate_envelope_material(&mut self) {
        OsRng.fill_bytes(&mut self.final_randomseed);
        OsRng.fill_bytes(&mut self.enc_iv);
    }
}

impl Default for VaultHeader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_header() -> VaultHeader {
        VaultHeader {
            enc_flag: ENC_FLAG_AES,
            version: VERSION,
            final_randomseed: [0xA5; 16],
            enc_iv: [0x5A; 16],
            num_groups: 3,
            num_entries: 7,
            contents_hash: [0x11; 32],
            transf_randomseed: [0x22; 32],
            key_transf_rounds: 150_000,
        }
    }

    #[test]
    fn test_pack_parse_round_trip() {
        let header = sample_header();
        let packed = header.pack();
        assert_eq!(packed.len(), HEADER_LEN);
        let parsed = VaultHeader::parse(&packed).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let packed = sample_header().pack();
        assert_eq!(
            VaultHeader::parse(&packed[..HEADER_LEN - 1]),
            Err(VaultError::ShortFile(HEADER_LEN - 1))
        );
    }

    #[test]
    fn test_wrong_signatures_rejected() {
        let mut packed = sample_header().pack();
        packed[0] ^= 0xFF;
        assert_eq!(VaultHeader::parse(&packed), Err(VaultError::BadSignature));

        let mut packed = sample_header().pack();
        packed[7] ^= 0x01;
        assert_eq!(VaultHeader::parse(&packed), Err(VaultError::BadSignature));
    }

    #[test]
    fn test_version_high_bytes_checked() {
        // The low byte is a don't-care on read.
        let mut header = sample_header();
        header.version = (VERSION & 0xFFFF_FF00) | 0xFF;
        let parsed = VaultHeader::parse(&header.pack()).unwrap();
        assert_eq!(parsed.version & 0xFFFF_FF00, VERSION & 0xFFFF_FF00);

        header.version = 0x0004_0002;
        assert_eq!(
            VaultHeader::parse(&header.pack()),
            Err(VaultError::UnsupportedVersion(0x0004_0002))
        );
    }

    #[test]
    fn test_cipher_flag_checked() {
        let mut header = sample_header();
        header.enc_flag = 8; // Twofish bit, unsupported
        assert_eq!(
            VaultHeader::parse(&header.pack()),
            Err(VaultError::UnsupportedCipher(8))
        );

        // Extra bits alongside AES are tolerated.
        header.enc_flag = ENC_FLAG_AES | 1;
        assert!(VaultHeader::parse(&header.pack()).is_ok());
    }

    #[test]
    fn test_fresh_header_draws_distinct_seeds() {
        let a = VaultHeader::new();
        let b = VaultHeader::new();
        assert_ne!(a.transf_randomseed, b.transf_randomseed);

        let mut c = VaultHeader::new();
        let before = (c.final_randomseed, c.enc_iv);
        c.regenerate_envelope_material();
        assert_ne!((c.final_randomseed, c.enc_iv), before);
    }

    proptest! {
        /// Header round-trip law: packing then parsing recovers all eleven
        /// fields exactly.
        #[test]
        fn prop_header_round_trip(
            seed in proptest::array::uniform16(any::<u8>()),
            iv in proptest::array::uniform16(any::<u8>()),
            hash in proptest::array::uniform32(any::<u8>()),
            transf in proptest::array::uniform32(any::<u8>()),
            num_groups in any::<u32>(),
            num_entries in any::<u32>(),
            rounds in any::<u32>(),
            version_low in any::<u8>(),
        ) {
            let header = VaultHeader {
                enc_flag: ENC_FLAG_AES,
                version: (VERSION & 0xFFFF_FF00) | version_low as u32,
                final_randomseed: seed,
                enc_iv: iv,
                num_groups,
                num_entries,
                contents_hash: hash,
                transf_randomseed: transf,
                key_transf_rounds: rounds,
            };
            let parsed = VaultHeader::parse(&header.pack()).unwrap();
            prop_assert_eq!(parsed, header);
        }
    }
}
