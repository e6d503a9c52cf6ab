// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # Body Stream Codec
//!
//! The decrypted vault body is `num_groups` group records followed by
//! `num_entries` entry records, each record a run of TLV fields closed by
//! the `0xFFFF` terminator. This module walks that stream on load and emits
//! it on save.
//!
//! ## Reading
//!
//! A running cursor advances through the plaintext; every field header and
//! payload is bounds-checked before it is consumed, so a truncated body -
//! even one cut inside a terminator - surfaces as `TruncatedBody` instead of
//! a wild read. Group records contribute their depth to a parallel `levels`
//! array consumed by the tree builder. Unknown field types are an error;
//! the comment type `0x0000` is skipped.
//!
//! ## Writing
//!
//! Fields are emitted in ascending type order (1..=9 for groups, 1..=14 for
//! entries), skipping attributes the record does not carry, each record
//! closed by the terminator. Text payloads are UTF-8 plus a trailing NUL.

use uuid::Uuid;

use crate::entities::{Entry, Group};
use crate::value_objects::field::{self, entry_field, group_field, FieldRef};
use crate::value_objects::{GroupId, VaultDate};
use crate::VaultError;

/// The materialized body: groups in flat file order, their parallel depth
/// levels, and entries in file order.
#[derive(Debug, Default, PartialEq)]
pub struct VaultBody {
    pub groups: Vec<Group>,
    pub levels: Vec<u16>,
    pub entries: Vec<Entry>,
}

/// Walks the plaintext and materializes every group and entry record.
///
/// # Errors
/// - `VaultError::TruncatedBody` when any read would pass the end of the
///   plaintext or a fixed-width payload has the wrong size
/// - `VaultError::UnknownField` on an unrecognized field type
/// - `VaultError::OrphanEntry` when an entry record ends without a group id
/// - `VaultError::InvalidTree` when a group record ends without an id or a
///   level, leaving it impossible to place in the tree
pub fn read_body(plaintext: &[u8], num_groups: u32, num_entries: u32) -> Result<VaultBody, VaultError> {
    let mut body = VaultBody::default();
    let mut pos = 0usize;

    let mut group = PartialGroup::default();
    while (body.groups.len() as u32) < num_groups {
        let field = FieldRef::read_at(plaintext, &mut pos)?;
        if field.is_terminator() {
            let (finished, level) = std::mem::take(&mut group).finish()?;
            body.groups.push(finished);
            body.levels.push(level);
        } else {
            group.apply(&field)?;
        }
    }

    let mut entry = PartialEntry::default();
    while (body.entries.len() as u32) < num_entries {
        let field = FieldRef::read_at(plaintext, &mut pos)?;
        if field.is_terminator() {
            body.entries.push(std::mem::take(&mut entry).finish()?);
        } else {
            entry.apply(&field)?;
        }
    }

    Ok(body)
}

/// Emits the body stream for the given groups and entries.
pub fn write_body(groups: &[Group], entries: &[Entry]) -> Vec<u8> {
    let mut out = Vec::new();
    for group in groups {
        write_group(&mut out, group);
    }
    for entry in entries {
        write_entry(&mut out, entry);
    }
    out
}

/// Accumulates one group record until its terminator.
#[derive(Default)]
struct PartialGroup {
    id: Option<u32>,
    title: Option<String>,
    image: Option<u32>,
    level: Option<u16>,
    flags: Option<u32>,
    creation: Option<VaultDate>,
    last_mod: Option<VaultDate>,
    last_access: Option<VaultDate>,
    expire: Option<VaultDate>,
}

impl PartialGroup {
    fn apply(&mut self, field: &FieldRef<'_>) -> Result<(), VaultError> {
        match field.field_type {
            group_field::COMMENT => {}
            group_field::ID => self.id = Some(field.as_u32()?),
            group_field::TITLE => self.title = Some(field.as_text()?),
            group_field::CREATION => self.creation = Some(field.as_date()?),
            group_field::LAST_MOD => self.last_mod = Some(field.as_date()?),
            group_field::LAST_ACCESS => self.last_access = Some(field.as_date()?),
            group_field::EXPIRE => self.expire = Some(field.as_date()?),
            group_field::IMAGE => self.image = Some(field.as_u32()?),
            group_field::LEVEL => self.level = Some(field.as_u16()?),
            group_field::FLAGS => self.flags = Some(field.as_u32()?),
            other => {
                return Err(VaultError::UnknownField {
                    record: "group",
                    field_type: other,
                })
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<(Group, u16), VaultError> {
        let id = self
            .id
            .ok_or_else(|| VaultError::invalid_tree("group record without an id"))?;
        let level = self
            .level
            .ok_or_else(|| VaultError::invalid_tree("group record without a level"))?;
        let group = Group {
            id: GroupId::new(id),
            title: self.title,
            image: self.image,
            level,
            flags: self.flags,
            creation: self.creation,
            last_mod: self.last_mod,
            last_access: self.last_access,
            expire: self.expire,
            parent: None,
            children: Vec::new(),
            entries: Vec::new(),
        };
        Ok((group, level))
    }
}

/// Accumulates one entry record until its terminator.
#[derive(Default)]
struct PartialEntry {
    uuid: Option<Uuid>,
    group_id: Option<u32>,
    image: Option<u32>,
    title: Option<String>,
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    comment: Option<String>,
    creation: Option<VaultDate>,
    last_mod: Option<VaultDate>,
    last_access: Option<VaultDate>,
    expire: Option<VaultDate>,
    binary_desc: Option<String>,
    binary: Option<Vec<u8>>,
}

impl PartialEntry {
    fn apply(&mut self, field: &FieldRef<'_>) -> Result<(), VaultError> {
        match field.field_type {
            entry_field::COMMENT => {}
            entry_field::UUID => self.uuid = Some(field.as_uuid()?),
            entry_field::GROUP_ID => self.group_id = Some(field.as_u32()?),
            entry_field::IMAGE => self.image = Some(field.as_u32()?),
            entry_field::TITLE => self.title = Some(field.as_text()?),
            entry_field::URL => self.url = Some(field.as_text()?),
            entry_field::USERNAME => self.username = Some(field.as_text()?),
            entry_field::PASSWORD => self.password = Some(field.as_text()?),
            entry_field::NOTES => self.comment = Some(field.as_text()?),
            entry_field::CREATION => self.creation = Some(field.as_date()?),
            entry_field::LAST_MOD => self.last_mod = Some(field.as_date()?),
            entry_field::LAST_ACCESS => self.last_access = Some(field.as_date()?),
            entry_field::EXPIRE => self.expire = Some(field.as_date()?),
            entry_field::BINARY_DESC => self.binary_desc = Some(field.as_text()?),
            entry_field::BINARY => self.binary = Some(field.payload.to_vec()),
            other => {
                return Err(VaultError::UnknownField {
                    record: "entry",
                    field_type: other,
                })
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Entry, VaultError> {
        // An entry that never named its group cannot be linked anywhere.
        let group_id = self.group_id.ok_or(VaultError::OrphanEntry)?;
        Ok(Entry {
            // Real writers always emit the UUID field; tolerate its absence
            // with the nil UUID rather than inventing identity.
            uuid: self.uuid.unwrap_or_else(Uuid::nil),
            group_id: GroupId::new(group_id),
            image: self.image,
            title: self.title,
            url: self.url,
            username: self.username,
            password: self.password,
            comment: self.comment,
            creation: self.creation,
            last_mod: self.last_mod,
            last_access: self.last_access,
            expire: self.expire,
            binary_desc: self.binary_desc,
            binary: self.binary,
        })
    }
}

fn write_group(out: &mut Vec<u8>, group: &Group) {
    field::put_field(out, group_field::ID, &group.id.value().to_le_bytes());
    if let Some(title) = &group.title {
        field::put_text_field(out, group_field::TITLE, title);
    }
    if let Some(date) = &group.creation {
        field::put_field(out, group_field::CREATION, &date.pack());
    }
    if let Some(date) = &group.last_mod {
        field::put_field(out, group_field::LAST_MOD, &date.pack());
    }
    if let Some(date) = &group.last_access {
        field::put_field(out, group_field::LAST_ACCESS, &date.pack());
    }
    if let Some(date) = &group.expire {
        field::put_field(out, group_field::EXPIRE, &date.pack());
    }
    if let Some(image) = group.image {
        field::put_field(out, group_field::IMAGE, &image.to_le_bytes());
    }
    field::put_field(out, group_field::LEVEL, &group.level.to_le_bytes());
    if let Some(flags) = group.flags {
        field::put_field(out, group_field::FLAGS, &flags.to_le_bytes());
    }
    field::put_terminator(out);
}

fn write_entry(out: &mut Vec<u8>, entry: &Entry) {
    field::put_field(out, entry_field::UUID, entry.uuid.as_bytes());
    field::put_field(out, entry_field::GROUP_ID, &entry.group_id.value().to_le_bytes());
    if let Some(image) = entry.image {
        field::put_field(out, entry_field::IMAGE, &image.to_le_bytes());
    }
    if let Some(title) = &entry.title {
        field::put_text_field(out, entry_field::TITLE, title);
    }
    if let Some(url) = &entry.url {
        field::put_text_field(out, entry_field::URL, url);
    }
    if let Some(username) = &entry.username {
        field::put_text_field(out, entry_field::USERNAME, username);
    }
    if let Some(password) = &entry.password {
        field::put_text_field(out, entry_field::PASSWORD, password);
    }
    if let Some(comment) = &entry.comment {
        field::put_text_field(out, entry_field::NOTES, comment);
    }
    if let Some(date) = &entry.creation {
        field::put_field(out, entry_field::CREATION, &date.pack());
    }
    if let Some(date) = &entry.last_mod {
        field::put_field(out, entry_field::LAST_MOD, &date.pack());
    }
    if let Some(date) = &entry.last_access {
        field::put_field(out, entry_field::LAST_ACCESS, &date.pack());
    }
    if let Some(date) = &entry.expire {
        field::put_field(out, entry_field::EXPIRE, &date.pack());
    }
    if let Some(desc) = &entry.binary_desc {
        field::put_text_field(out, entry_field::BINARY_DESC, desc);
    }
    if let Some(binary) = &entry.binary {
        field::put_field(out, entry_field::BINARY, binary);
    }
    field::put_terminator(out);
}
