// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # Tree Builder Service
//!
//! The body stream stores groups as a flat pre-order list annotated with
//! depth levels. This module reconstructs the parent/child tree from that
//! level stream and binds every entry to its owning group.
//!
//! ## Level Stream Rules
//!
//! - the first group must be at level 0
//! - a group at level `L > 0` is attached to the nearest preceding group at
//!   level `L - 1`; a preceding group at a level below `L - 1` before one at
//!   `L - 1` is found means the stream skipped a depth and is invalid
//! - any violation fails with `InvalidTree` and no partial graph escapes
//!
//! The inverse direction needs no builder: a vault maintained by the facade
//! keeps its flat list in pre-order with correct levels, so saving emits the
//! groups as they are.

use crate::entities::{Entry, Group};
use crate::value_objects::GroupId;
use crate::VaultError;

/// Reconstructs the group tree from the parallel level stream and binds
/// entries to their groups.
///
/// On success the groups' `parent`/`children` links are populated and every
/// entry's UUID is recorded in its owning group; the returned vector holds
/// the ids of the top-level groups in flat order.
///
/// # Errors
/// - `VaultError::InvalidTree` when the level stream violates the rules
///   above or does not match the group list
/// - `VaultError::OrphanEntry` when an entry references a group id that does
///   not exist
pub fn link_tree(
    groups: &mut [Group],
    levels: &[u16],
    entries: &mut [Entry],
) -> Result<Vec<GroupId>, VaultError> {
    if groups.len() != levels.len() {
        return Err(VaultError::invalid_tree("level stream does not match group list"));
    }

    let mut root_children = Vec::new();

    for i in 0..groups.len() {
        let level = levels[i];
        if i == 0 && level != 0 {
            return Err(VaultError::invalid_tree("first group must be at level 0"));
        }

        if level == 0 {
            groups[i].parent = None;
            root_children.push(groups[i].id);
            continue;
        }

        // Scan backwards for the nearest shallower group; it must sit
        // exactly one level up.
        let mut j = i - 1;
        loop {
            if levels[j] < level {
                if level - levels[j] != 1 {
                    return Err(VaultError::invalid_tree(format!(
                        "group at level {} under a group at level {}",
                        level, levels[j]
                    )));
                }
                let child = groups[i].id;
                groups[i].parent = Some(groups[j].id);
                groups[j].children.push(child);
                break;
            }
            if j == 0 {
                return Err(VaultError::invalid_tree(format!(
                    "no parent for group at level {}",
                    level
                )));
            }
            j -= 1;
        }
    }

    for entry in entries.iter_mut() {
        let owner = groups
            .iter_mut()
            .find(|group| group.id == entry.group_id)
            .ok_or(VaultError::OrphanEntry)?;
        owner.entries.push(entry.uuid);
    }

    Ok(root_children)
}
