//! # Vault Entities
//!
//! The two objects with identity in a vault: [`Group`] (a tree node owning
//! entries) and [`Entry`] (a credential record). Both live in vectors owned
//! by the vault aggregate; relationships between them are expressed through
//! stable handles - [`crate::GroupId`] for groups, the 16-byte UUID for
//! entries - never through references, so the object graph stays free of
//! ownership cycles.

mod entry;
mod group;

pub use entry::Entry;
pub use group::Group;
