//! # Vault Codec Services
//!
//! Stateless operations that do not belong to a single entity or value
//! object: the key derivation chain, the CBC envelope, the body stream
//! codec, and the tree builder.
//!
//! ## Service Map
//!
//! - [`key_derivation`]: keyfile reading and the master-key stretch
//! - [`cbc_envelope`]: AES-256-CBC with the format's padding discipline
//! - [`body_codec`]: the TLV stream of group and entry records
//! - [`tree_builder`]: level-stream-to-tree reconstruction and entry linking
//!
//! All services are synchronous and side-effect free apart from the keyfile
//! reader's file access; the facade owns every other I/O boundary.

pub mod body_codec;
pub mod cbc_envelope;
pub mod key_derivation;
pub mod tree_builder;
