// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # Entry Entity
//!
//! A credential record: title, URL, username, password, comment, timestamps,
//! and an optional binary attachment. Every entry belongs to exactly one
//! group, referenced by id; its own identity is a 16-byte UUID drawn from
//! the operating system RNG at creation.
//!
//! ## Memory Security
//!
//! The password is the one attribute worth wiping: it is zeroized when the
//! entry is dropped and when a new password replaces it. The remaining
//! attributes are ordinary metadata.

use crate::value_objects::{GroupId, VaultDate};
use uuid::Uuid;
use zeroize::Zeroize;

/// A credential record owned by one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub(crate) uuid: Uuid,
    pub(crate) group_id: GroupId,
    pub(crate) image: Option<u32>,
    pub(crate) title: Option<String>,
    pub(crate) url: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) comment: Option<String>,
    pub(crate) creation: Option<VaultDate>,
    pub(crate) last_mod: Option<VaultDate>,
    pub(crate) last_access: Option<VaultDate>,
    pub(crate) expire: Option<VaultDate>,
    pub(crate) binary_desc: Option<String>,
    pub(crate) binary: Option<Vec<u8>>,
}

impl Entry {
    /// Creates a bare entry. The caller wires it into its group.
    pub(crate) fn new(uuid: Uuid, group_id: GroupId) -> Self {
        Entry {
            uuid,
            group_id,
            image: None,
            title: None,
            url: None,
            username: None,
            password: None,
            comment: None,
            creation: None,
            last_mod: None,
            last_access: None,
            expire: None,
            binary_desc: None,
            binary: None,
        }
    }

    /// Gets the entry UUID
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Gets the owning group id
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Gets the icon index, if any
    pub fn image(&self) -> Option<u32> {
        self.image
    }

    /// Sets the icon index
    pub fn set_image(&mut self, image: u32) {
        self.image = Some(image);
    }

    /// Gets the title; an entry that never had one reads as empty.
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    /// Sets the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Gets the URL
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    /// Sets the URL
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    /// Gets the username
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or("")
    }

    /// Sets the username
    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
    }

    /// Gets the password
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }

    /// Sets the password, wiping the previous one.
    pub fn set_password(&mut self, password: impl Into<String>) {
        if let Some(old) = self.password.as_mut() {
            old.zeroize();
        }
        self.password = Some(password.into());
    }

    /// Gets the comment
    pub fn comment(&self) -> &str {
        self.comment.as_deref().unwrap_or("")
    }

    /// Sets the comment
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = Some(comment.into());
    }

    /// Gets the creation time, if any
    pub fn creation(&self) -> Option<VaultDate> {
        self.creation
    }

    /// Gets the last modification time, if any
    pub fn last_mod(&self) -> Option<VaultDate> {
        self.last_mod
    }

    /// Gets the last access time, if any
    pub fn last_access(&self) -> Option<VaultDate> {
        self.last_access
    }

    /// Gets the expiry time, if any
    pub fn expire(&self) -> Option<VaultDate> {
        self.expire
    }

    /// Sets the expiry time
    pub fn set_expire(&mut self, expire: VaultDate) {
        self.expire = Some(expire);
    }

    /// Checks whether the entry ever expires.
    pub fn expires(&self) -> bool {
        match self.expire {
            Some(date) => !date.is_never_expires(),
            None => false,
        }
    }

    /// Gets the attachment description, if any
    pub fn binary_desc(&self) -> Option<&str> {
        self.binary_desc.as_deref()
    }

    /// Gets the attachment bytes, if any
    pub fn binary(&self) -> Option<&[u8]> {
        self.binary.as_deref()
    }

    /// Attaches binary data with a description.
    pub fn set_binary(&mut self, desc: impl Into<String>, data: Vec<u8>) {
        self.binary_desc = Some(desc.into());
        self.binary = Some(data);
    }

    /// Stamps creation, last modification, and last access with the current
    /// local time.
    pub(crate) fn touch_all(&mut self) {
        let now = VaultDate::now();
        self.creation = Some(now);
        self.last_mod = Some(now);
        self.last_access = Some(now);
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        if let Some(password) = self.password.as_mut() {
            password.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_bare() {
        let uuid = Uuid::from_bytes([7; 16]);
        let entry = Entry::new(uuid, GroupId::new(3));
        assert_eq!(entry.uuid(), uuid);
        assert_eq!(entry.group_id(), GroupId::new(3));
        assert_eq!(entry.title(), "");
        assert_eq!(entry.password(), "");
        assert!(!entry.expires());
        assert_eq!(entry.binary(), None);
    }

    #[test]
    fn test_set_password_replaces() {
        let mut entry = Entry::new(Uuid::from_bytes([1; 16]), GroupId::new(1));
        entry.set_password("old");
        entry.set_password("new");
        assert_eq!(entry.password(), "new");
    }

    #[test]
    fn test_never_expires_sentinel_means_no_expiry() {
        let mut entry = Entry::new(Uuid::from_bytes([2; 16]), GroupId::new(1));
        entry.set_expire(VaultDate::never_expires());
        assert!(!entry.expires());
        entry.set_expire(VaultDate::new(2030, 1, 1, 0, 0, 0).unwrap());
        assert!(entry.expires());
    }

    #[test]
    fn test_binary_attachment() {
        let mut entry = Entry::new(Uuid::from_bytes([3; 16]), GroupId::new(1));
        entry.set_binary("backup.bin", vec![1, 2, 3]);
        assert_eq!(entry.binary_desc(), Some("backup.bin"));
        assert_eq!(entry.binary(), Some(&[1u8, 2, 3][..]));
    }
}
