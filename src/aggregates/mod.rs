//! # Vault Aggregate
//!
//! The aggregate root of the codec: [`Vault`] owns the flat group list, the
//! entry list, and the header state, and is the only writer of the tree
//! edges, the pre-order flat ordering, and the record counters. Every load,
//! save, and mutation goes through it so the invariants hold at every
//! return.

mod vault;

pub use vault::{EntryOptions, GroupOptions, Vault};
