// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # KeePass 1.x Vault Codec
//!
//! This crate reads, mutates, and writes password-manager vaults in the
//! KeePass 1.x on-disk format: a fixed 124-byte header followed by an
//! AES-256-CBC encrypted body of TLV records describing a tree of groups
//! and a flat list of entries.
//!
//! ## Module Structure
//!
//! - [`error`]: the closed failure taxonomy ([`VaultError`])
//! - [`value_objects`]: the wire-level building blocks - packed dates, the
//!   file header, TLV field primitives, typed ids
//! - [`services`]: key derivation, the CBC envelope, the body stream codec,
//!   and the tree builder
//! - [`entities`]: [`Group`] and [`Entry`]
//! - [`aggregates`]: the [`Vault`] facade owning the object graph
//!
//! ## Usage
//!
//! ```no_run
//! use kdb_vault::{EntryOptions, GroupOptions, Vault};
//!
//! # fn main() -> Result<(), kdb_vault::VaultError> {
//! let mut vault = Vault::create();
//! let group = vault.create_group(GroupOptions::new("Mail"))?;
//! vault.create_entry(
//!     group,
//!     EntryOptions::new("webmail")
//!         .with_username("alice")
//!         .with_password("correct horse"),
//! )?;
//! vault.save(Some("passwords.kdb".as_ref()), Some("master phrase"), None)?;
//!
//! let reopened = Vault::open("passwords.kdb", Some("master phrase"), None, false)?;
//! assert_eq!(reopened.num_entries(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Scope
//!
//! The crate is the codec and the typed object graph; command-line tools,
//! UI layers, and vault-browsing conveniences belong to callers. Only the
//! 1.x binary format with AES is handled - the 2.x XML container, other
//! ciphers, and other KDFs are different beasts entirely.
//!
//! ## Concurrency
//!
//! Everything is synchronous and single-threaded; a [`Vault`] needs outside
//! synchronization to be shared across threads. The key stretch is the one
//! CPU-heavy operation (callers on cooperative runtimes should offload
//! `open`/`save` to a worker); internally its two independent halves run on
//! rayon workers.
//!
//! ## Secret Hygiene
//!
//! Master keys, final keys, decrypted body buffers, stored passphrases, and
//! entry passwords are zeroized when replaced, cleared, or dropped.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
pub use aggregates::{EntryOptions, GroupOptions, Vault};
pub use entities::{Entry, Group};
pub use error::VaultError;
pub use value_objects::{GroupId, VaultDate, VaultHeader};
