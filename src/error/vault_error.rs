// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # Vault Error System
//!
//! This module provides the closed error enumeration for the vault codec.
//! Every failure produced by the header codec, the body codec, the key
//! derivation chain, the tree builder, and the vault facade maps to exactly
//! one variant of [`VaultError`].
//!
//! ## Error Architecture
//!
//! The variants fall into a small number of categories:
//!
//! - **Usage**: `MissingCredentials`, `BadArgument`, `ReadOnly`, `NoPath`,
//!   `EmptyVault`, `NotFound`, `IndexOutOfRange`
//! - **File access**: `FileIO`, `ShortFile`, `KeyfileMissing`, `KeyfileIO`
//! - **Envelope**: `BadSignature`, `UnsupportedVersion`, `UnsupportedCipher`,
//!   `DecryptFailed`, `HashMismatch`
//! - **Body**: `TruncatedBody`, `UnknownField`, `OrphanEntry`, `InvalidTree`,
//!   `BadDate`
//!
//! ## Propagation
//!
//! Errors propagate unchanged to the caller. A failed `load` leaves the vault
//! locked with no partially populated object graph; a failed `save` leaves the
//! in-memory graph untouched.

use thiserror::Error;

/// Domain-specific errors for the vault codec.
///
/// This enum represents all possible errors that can occur while loading,
/// saving, or mutating a KeePass 1.x vault. Each variant represents a
/// specific failure mode and carries the context needed to understand what
/// went wrong.
///
/// ## Design Principles
///
/// - **Closed**: the set of failure kinds is fixed; callers can match
///   exhaustively
/// - **Specific**: one variant per failure mode, never a catch-all
/// - **Actionable**: messages carry enough context for debugging
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Missing credentials: a password or a keyfile is needed")]
    MissingCredentials,

    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("The vault has been opened read-only")]
    ReadOnly,

    #[error("No file path is associated with the vault")]
    NoPath,

    #[error("Need at least one group")]
    EmptyVault,

    #[error("IO error: {0}")]
    FileIO(String),

    #[error("Unexpected file size: expected at least 124 bytes but got {0}")]
    ShortFile(usize),

    #[error("Wrong file signatures")]
    BadSignature,

    #[error("Unsupported file version: {0:#010x}")]
    UnsupportedVersion(u32),

    #[error("Unsupported file encryption: flags {0:#06x}")]
    UnsupportedCipher(u32),

    #[error("Keyfile does not exist: {0}")]
    KeyfileMissing(String),

    #[error("Could not read keyfile: {0}")]
    KeyfileIO(String),

    #[error("Decryption failed: the key is wrong or the file is damaged")]
    DecryptFailed,

    #[error("Hash test failed: the key is wrong or the file is damaged")]
    HashMismatch,

    #[error("Vault body ends inside a field")]
    TruncatedBody,

    #[error("Unknown field type {field_type:#06x} in a {record} record")]
    UnknownField { record: &'static str, field_type: u16 },

    #[error("Found an entry without a matching group")]
    OrphanEntry,

    #[error("Invalid group tree: {0}")]
    InvalidTree(String),

    #[error("No legal date")]
    BadDate,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index out of range")]
    IndexOutOfRange,
}

impl VaultError {
    /// Creates a new bad-argument error
    pub fn bad_argument(msg: impl Into<String>) -> Self {
        Self::BadArgument(msg.into())
    }

    /// Creates a new invalid-tree error
    pub fn invalid_tree(msg: impl Into<String>) -> Self {
        Self::InvalidTree(msg.into())
    }

    /// Creates a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::FileIO(msg.into())
    }

    /// Checks whether the error indicates a wrong master secret.
    ///
    /// A wrong passphrase surfaces either as `DecryptFailed` (the unpadded
    /// plaintext is implausible) or as `HashMismatch` (unpadding happened to
    /// succeed but the contents hash disagrees), depending on the garbage the
    /// wrong key decrypts to.
    pub fn is_key_failure(&self) -> bool {
        matches!(self, VaultError::DecryptFailed | VaultError::HashMismatch)
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            VaultError::MissingCredentials => "usage",
            VaultError::BadArgument(_) => "usage",
            VaultError::ReadOnly => "usage",
            VaultError::NoPath => "usage",
            VaultError::EmptyVault => "usage",
            VaultError::NotFound(_) => "usage",
            VaultError::IndexOutOfRange => "usage",
            VaultError::FileIO(_) => "io",
            VaultError::ShortFile(_) => "io",
            VaultError::KeyfileMissing(_) => "keyfile",
            VaultError::KeyfileIO(_) => "keyfile",
            VaultError::BadSignature => "envelope",
            VaultError::UnsupportedVersion(_) => "envelope",
            VaultError::UnsupportedCipher(_) => "envelope",
            VaultError::DecryptFailed => "envelope",
            VaultError::HashMismatch => "envelope",
            VaultError::TruncatedBody => "body",
            VaultError::UnknownField { .. } => "body",
            VaultError::OrphanEntry => "body",
            VaultError::InvalidTree(_) => "body",
            VaultError::BadDate => "body",
        }
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::FileIO(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_failures_are_grouped() {
        assert!(VaultError::DecryptFailed.is_key_failure());
        assert!(VaultError::HashMismatch.is_key_failure());
        assert!(!VaultError::BadSignature.is_key_failure());
        assert!(!VaultError::MissingCredentials.is_key_failure());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: VaultError = io.into();
        assert!(matches!(err, VaultError::FileIO(_)));
        assert_eq!(err.category(), "io");
    }

    #[test]
    fn test_unknown_field_display() {
        let err = VaultError::UnknownField {
            record: "group",
            field_type: 0x0042,
        };
        assert!(err.to_string().contains("0x0042"));
        assert!(err.to_string().contains("group"));
    }
}
