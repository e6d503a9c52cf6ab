// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # Vault Facade
//!
//! [`Vault`] is the aggregate root of the codec. It owns the object graph -
//! the flat group list in pre-order, the entry list in file order, and the
//! top-level group ids standing in for the implicit root - together with the
//! header state and the credentials used for the next save.
//!
//! ## Load Path
//!
//! ```text
//! bytes -> header parse -> key derivation -> CBC decrypt -> hash check
//!       -> body stream -> tree linking -> graph committed to the vault
//! ```
//!
//! The contents hash is verified before any record is materialized for the
//! caller, and the graph is committed only after the tree links; a failure
//! at any stage leaves the vault exactly as it was.
//!
//! ## Save Path
//!
//! ```text
//! graph -> body stream -> contents hash -> fresh seed/IV -> header pack
//!       -> CBC encrypt -> temp file + rename -> lock sidecar
//! ```
//!
//! The header is packed only after the body bytes it describes exist, and
//! the target file is replaced with a rename so an interrupted save leaves
//! the previous vault intact.
//!
//! ## Mutations
//!
//! All structural mutations (create, remove, move) maintain three facts at
//! every return: the flat list is a pre-order traversal of the tree with
//! correct depth levels, every entry's group id names an existing group, and
//! the record counters equal the collection lengths.
//!
//! ## Concurrency
//!
//! A vault is a plain mutable aggregate: single-threaded, synchronous, no
//! internal locking. The `.lock` sidecar next to the file is advisory only.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use crate::entities::{Entry, Group};
use crate::services::{body_codec, cbc_envelope, key_derivation, tree_builder};
use crate::value_objects::vault_header::{HEADER_LEN, MIN_KEY_TRANSF_ROUNDS};
use crate::value_objects::{GroupId, VaultDate, VaultHeader};
use crate::VaultError;

/// Longest plaintext body accepted on load. Anything larger is taken as
/// evidence of a wrong key or a damaged file.
const MAX_BODY_LEN: usize = 2_147_483_446;

/// Title of the group seeded into a freshly created vault.
const DEFAULT_GROUP_TITLE: &str = "Internet";

/// Credentials retained for the next save. The password is wiped when the
/// holder is cleared, replaced, or dropped.
#[derive(Default)]
struct Credentials {
    password: Option<String>,
    keyfile: Option<PathBuf>,
}

impl Credentials {
    fn is_empty(&self) -> bool {
        self.password.is_none() && self.keyfile.is_none()
    }

    fn set_password(&mut self, password: &str) {
        if let Some(old) = self.password.as_mut() {
            old.zeroize();
        }
        self.password = Some(password.to_owned());
    }

    fn clear(&mut self) {
        if let Some(old) = self.password.as_mut() {
            old.zeroize();
        }
        self.password = None;
        self.keyfile = None;
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Configuration for [`Vault::create_group`].
///
/// Defaults: no parent (top-level), icon 1, never expires.
#[derive(Debug, Clone)]
pub struct GroupOptions {
    title: String,
    parent: Option<GroupId>,
    image: u32,
    expire: VaultDate,
}

impl GroupOptions {
    /// Starts options for a group with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        GroupOptions {
            title: title.into(),
            parent: None,
            image: 1,
            expire: VaultDate::never_expires(),
        }
    }

    /// Places the group under a parent instead of at the top level.
    pub fn with_parent(mut self, parent: GroupId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the icon index (must be at least 1 for groups).
    pub fn with_image(mut self, image: u32) -> Self {
        self.image = image;
        self
    }

    /// Sets the expiry time.
    pub fn with_expire(mut self, expire: VaultDate) -> Self {
        self.expire = expire;
        self
    }
}

/// Configuration for [`Vault::create_entry`].
///
/// Defaults: empty strings, icon 1, never expires, a freshly drawn UUID.
#[derive(Clone, Default)]
pub struct EntryOptions {
    title: String,
    url: String,
    username: String,
    password: String,
    comment: String,
    image: Option<u32>,
    expire: Option<VaultDate>,
    uuid: Option<Uuid>,
}

impl EntryOptions {
    /// Starts options for an entry with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        EntryOptions {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Sets the URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Sets the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Sets the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Sets the icon index.
    pub fn with_image(mut self, image: u32) -> Self {
        self.image = Some(image);
        self
    }

    /// Sets the expiry time.
    pub fn with_expire(mut self, expire: VaultDate) -> Self {
        self.expire = Some(expire);
        self
    }

    /// Fixes the UUID instead of drawing a random one.
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }
}

impl fmt::Debug for EntryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryOptions")
            .field("title", &self.title)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("comment", &self.comment)
            .field("image", &self.image)
            .finish_non_exhaustive()
    }
}

/// A KeePass 1.x vault: the decrypted object graph plus everything needed
/// to write it back.
pub struct Vault {
    groups: Vec<Group>,
    entries: Vec<Entry>,
    root_children: Vec<GroupId>,
    header: VaultHeader,
    num_groups: u32,
    num_entries: u32,
    filepath: Option<PathBuf>,
    credentials: Credentials,
    read_only: bool,
}

impl Vault {
    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Opens an existing vault file.
    ///
    /// # Purpose
    /// Reads, decrypts, verifies, and materializes the vault at `path`. On
    /// success a `.lock` sidecar is created next to the file (advisory
    /// only).
    ///
    /// # Arguments
    /// * `path` - the vault file
    /// * `password` - the passphrase, if any
    /// * `keyfile` - the keyfile path, if any
    /// * `read_only` - refuse later saves when set
    ///
    /// # Errors
    /// `MissingCredentials` when neither secret is given; otherwise the
    /// errors of the load path (`FileIO`, `ShortFile`, `BadSignature`,
    /// `UnsupportedVersion`, `UnsupportedCipher`, keyfile errors,
    /// `DecryptFailed`, `HashMismatch`, `TruncatedBody`, `UnknownField`,
    /// `OrphanEntry`, `InvalidTree`).
    pub fn open(
        path: impl AsRef<Path>,
        password: Option<&str>,
        keyfile: Option<&Path>,
        read_only: bool,
    ) -> Result<Self, VaultError> {
        if password.is_none() && keyfile.is_none() {
            return Err(VaultError::MissingCredentials);
        }
        let path = path.as_ref().to_path_buf();
        let bytes = Zeroizing::new(fs::read(&path)?);

        let mut vault = Vault::bare();
        vault.filepath = Some(path);
        vault.read_only = read_only;
        if let Some(password) = password {
            vault.credentials.set_password(password);
        }
        vault.credentials.keyfile = keyfile.map(Path::to_path_buf);

        vault.load_bytes(&bytes)?;
        vault.create_lock_file()?;
        Ok(vault)
    }

    /// Opens a vault from an in-memory buffer. No path is associated and no
    /// lock sidecar is created; `save` needs an explicit path later.
    pub fn open_bytes(
        buf: &[u8],
        password: Option<&str>,
        keyfile: Option<&Path>,
    ) -> Result<Self, VaultError> {
        if password.is_none() && keyfile.is_none() {
            return Err(VaultError::MissingCredentials);
        }
        let mut vault = Vault::bare();
        if let Some(password) = password {
            vault.credentials.set_password(password);
        }
        vault.credentials.keyfile = keyfile.map(Path::to_path_buf);
        vault.load_bytes(buf)?;
        Ok(vault)
    }

    /// Creates a new empty vault seeded with one top-level "Internet"
    /// group. The format requires at least one group, so an entirely empty
    /// vault is never observable.
    pub fn create() -> Self {
        let mut vault = Vault::bare();
        let group = Group::new(GroupId::new(1), DEFAULT_GROUP_TITLE.to_owned(), 1, 0);
        vault.root_children.push(group.id());
        vault.groups.push(group);
        vault.num_groups = 1;
        vault
    }

    fn bare() -> Self {
        Vault {
            groups: Vec::new(),
            entries: Vec::new(),
            root_children: Vec::new(),
            header: VaultHeader::new(),
            num_groups: 0,
            num_entries: 0,
            filepath: None,
            credentials: Credentials::default(),
            read_only: false,
        }
    }

    /// Saves the vault.
    ///
    /// # Purpose
    /// Serializes the object graph, recomputes the contents hash, draws a
    /// fresh seed and IV, encrypts, and atomically replaces the target file
    /// (write to a sibling temp file, then rename).
    ///
    /// # Arguments
    /// * `path` - alternative target; defaults to the opened path
    /// * `password` / `keyfile` - freshly supplied credentials replace the
    ///   stored ones before the save
    ///
    /// # Errors
    /// `ReadOnly`, `BadArgument` (empty credential strings),
    /// `MissingCredentials`, `NoPath`, `EmptyVault`, keyfile errors, and
    /// `FileIO` from the filesystem.
    pub fn save(
        &mut self,
        path: Option<&Path>,
        password: Option<&str>,
        keyfile: Option<&Path>,
    ) -> Result<(), VaultError> {
        if let Some(password) = password {
            if password.is_empty() {
                return Err(VaultError::bad_argument("password must not be empty"));
            }
            self.credentials.set_password(password);
        }
        if let Some(keyfile) = keyfile {
            if keyfile.as_os_str().is_empty() {
                return Err(VaultError::bad_argument("keyfile path must not be empty"));
            }
            self.credentials.keyfile = Some(keyfile.to_path_buf());
        }

        if self.read_only {
            return Err(VaultError::ReadOnly);
        }
        if self.credentials.is_empty() {
            return Err(VaultError::MissingCredentials);
        }
        let target = match (path, &self.filepath) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(path)) => path.clone(),
            (None, None) => return Err(VaultError::NoPath),
        };
        if self.num_groups == 0 {
            return Err(VaultError::EmptyVault);
        }

        let plaintext = Zeroizing::new(body_codec::write_body(&self.groups, &self.entries));

        self.header.regenerate_envelope_material();
        self.header.contents_hash = Sha256::digest(plaintext.as_slice()).into();
        self.header.num_groups = self.num_groups;
        self.header.num_entries = self.num_entries;
        if self.header.key_transf_rounds < MIN_KEY_TRANSF_ROUNDS {
            warn!(
                rounds = self.header.key_transf_rounds,
                floor = MIN_KEY_TRANSF_ROUNDS,
                "raising key transform rounds to the supported floor"
            );
            self.header.key_transf_rounds = MIN_KEY_TRANSF_ROUNDS;
        }

        let master = key_derivation::compose_master_key(
            self.credentials.password.as_deref(),
            self.credentials.keyfile.as_deref(),
        )?;
        let final_key = key_derivation::transform_key(
            &master,
            &self.header.transf_randomseed,
            &self.header.final_randomseed,
            self.header.key_transf_rounds,
        );
        let ciphertext = cbc_envelope::encrypt(&final_key, &self.header.enc_iv, &plaintext);

        let mut file_bytes = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        file_bytes.extend_from_slice(&self.header.pack());
        file_bytes.extend_from_slice(&ciphertext);

        let tmp = sibling_temp_path(&target);
        fs::write(&tmp, &file_bytes)?;
        if let Err(err) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }

        if self.filepath.is_none() {
            self.filepath = Some(target.clone());
        }
        self.ensure_lock_file()?;

        debug!(
            groups = self.num_groups,
            entries = self.num_entries,
            path = %target.display(),
            "vault saved"
        );
        Ok(())
    }

    /// Closes the vault: removes the lock sidecar, forgets the path, drops
    /// the read-only flag, and locks.
    ///
    /// # Errors
    /// `NoPath` when the vault has no associated file.
    pub fn close(&mut self) -> Result<(), VaultError> {
        let Some(path) = self.filepath.take() else {
            return Err(VaultError::NoPath);
        };
        let lock = lock_path(&path);
        if lock.exists() {
            if let Err(err) = fs::remove_file(&lock) {
                warn!(path = %lock.display(), error = %err, "could not remove lock sidecar");
            }
        }
        self.read_only = false;
        self.lock();
        Ok(())
    }

    /// Locks the vault: wipes the credentials and drops the whole object
    /// graph. The header state (transform seed, round count) survives so
    /// that `unlock` works against the same file.
    pub fn lock(&mut self) {
        self.credentials.clear();
        self.groups.clear();
        self.entries.clear();
        self.root_children.clear();
        self.num_groups = 0;
        self.num_entries = 0;
    }

    /// Unlocks the vault with fresh credentials, reloading the graph from
    /// the given buffer or from the associated file.
    ///
    /// Empty credential strings count as absent.
    ///
    /// # Errors
    /// `MissingCredentials` when both secrets are absent, `NoPath` when no
    /// buffer is given and no file is associated, plus the load-path
    /// errors.
    pub fn unlock(
        &mut self,
        password: Option<&str>,
        keyfile: Option<&Path>,
        buf: Option<&[u8]>,
    ) -> Result<(), VaultError> {
        let password = password.filter(|p| !p.is_empty());
        let keyfile = keyfile.filter(|k| !k.as_os_str().is_empty());
        if password.is_none() && keyfile.is_none() {
            return Err(VaultError::MissingCredentials);
        }
        self.credentials.clear();
        if let Some(password) = password {
            self.credentials.set_password(password);
        }
        self.credentials.keyfile = keyfile.map(Path::to_path_buf);

        let file_bytes;
        let data: &[u8] = match buf {
            Some(buf) => buf,
            None => {
                let Some(path) = self.filepath.clone() else {
                    return Err(VaultError::NoPath);
                };
                file_bytes = Zeroizing::new(fs::read(&path)?);
                &file_bytes
            }
        };
        self.load_bytes(data)?;
        if self.filepath.is_some() {
            self.create_lock_file()?;
        }
        Ok(())
    }

    /// Decrypts and materializes a vault image, committing the graph only
    /// when every stage has succeeded.
    fn load_bytes(&mut self, buf: &[u8]) -> Result<(), VaultError> {
        let header = VaultHeader::parse(buf)?;
        let ciphertext = &buf[HEADER_LEN..];

        let master = key_derivation::compose_master_key(
            self.credentials.password.as_deref(),
            self.credentials.keyfile.as_deref(),
        )?;
        let final_key = key_derivation::transform_key(
            &master,
            &header.transf_randomseed,
            &header.final_randomseed,
            header.key_transf_rounds,
        );
        let plaintext = Zeroizing::new(cbc_envelope::decrypt(&final_key, &header.enc_iv, ciphertext)?);

        if plaintext.len() > MAX_BODY_LEN || (plaintext.is_empty() && header.num_groups > 0) {
            return Err(VaultError::DecryptFailed);
        }
        let digest: [u8; 32] = Sha256::digest(plaintext.as_slice()).into();
        if digest != header.contents_hash {
            return Err(VaultError::HashMismatch);
        }

        let mut body = body_codec::read_body(&plaintext, header.num_groups, header.num_entries)?;
        let root_children = tree_builder::link_tree(&mut body.groups, &body.levels, &mut body.entries)?;

        debug!(
            groups = body.groups.len(),
            entries = body.entries.len(),
            rounds = header.key_transf_rounds,
            "vault body decoded"
        );

        self.num_groups = body.groups.len() as u32;
        self.num_entries = body.entries.len() as u32;
        self.groups = body.groups;
        self.entries = body.entries;
        self.root_children = root_children;
        self.header = header;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Group mutations
    // ---------------------------------------------------------------------

    /// Creates a group and returns its id.
    ///
    /// The id is `max(existing) + 1`. A top-level group is appended at the
    /// end of the flat list; a child group is inserted immediately after its
    /// parent. An expiry that is not a valid calendar date falls back to the
    /// never-expires sentinel.
    ///
    /// # Errors
    /// `BadArgument` when the icon index is 0, `NotFound` when the parent
    /// does not exist.
    pub fn create_group(&mut self, options: GroupOptions) -> Result<GroupId, VaultError> {
        if options.image < 1 {
            return Err(VaultError::bad_argument("group image index must be at least 1"));
        }
        let id = GroupId::new(
            self.groups
                .iter()
                .map(|group| group.id().value())
                .max()
                .map_or(1, |max| max.wrapping_add(1)),
        );
        let expire = if options.expire.validate_calendar().is_ok() {
            options.expire
        } else {
            VaultDate::never_expires()
        };

        let mut group = Group::new(id, options.title, options.image, 0);
        group.touch_all();
        group.set_expire(expire);

        match options.parent {
            None => {
                self.root_children.push(id);
                self.groups.push(group);
            }
            Some(parent_id) => {
                let parent_pos = self
                    .position(parent_id)
                    .ok_or_else(|| VaultError::not_found("parent group"))?;
                group.level = self.groups[parent_pos].level + 1;
                group.parent = Some(parent_id);
                self.groups[parent_pos].children.push(id);
                self.groups.insert(parent_pos + 1, group);
            }
        }
        self.num_groups += 1;
        Ok(id)
    }

    /// Removes a group and cascades over its subtree: every descendant
    /// group and every entry owned by the subtree goes with it.
    ///
    /// # Errors
    /// `NotFound` when the group does not exist.
    pub fn remove_group(&mut self, id: GroupId) -> Result<(), VaultError> {
        let pos = self.position(id).ok_or_else(|| VaultError::not_found("group"))?;
        let span = self.subtree_span(pos);
        let removed: HashSet<GroupId> = self.groups[span.clone()].iter().map(|g| g.id()).collect();

        match self.groups[pos].parent {
            None => self.root_children.retain(|&child| child != id),
            Some(parent_id) => {
                if let Some(parent_pos) = self.position(parent_id) {
                    self.groups[parent_pos].children.retain(|&child| child != id);
                }
            }
        }

        let removed_groups = span.len() as u32;
        self.groups.drain(span);

        let entries_before = self.entries.len();
        self.entries.retain(|entry| !removed.contains(&entry.group_id()));
        self.num_entries -= (entries_before - self.entries.len()) as u32;
        self.num_groups -= removed_groups;
        Ok(())
    }

    /// Moves a group (with its whole subtree) under a new parent, or to the
    /// top level when `parent` is `None`. The subtree is repositioned after
    /// the new parent's existing descendants in the flat order, depths are
    /// recomputed, and the group's modification time is touched.
    ///
    /// # Errors
    /// `BadArgument` when the group is moved under itself or its own
    /// subtree, `NotFound` when either handle is unknown.
    pub fn move_group(&mut self, id: GroupId, parent: Option<GroupId>) -> Result<(), VaultError> {
        if parent == Some(id) {
            return Err(VaultError::bad_argument("group and parent must not be the same group"));
        }
        let pos = self.position(id).ok_or_else(|| VaultError::not_found("group"))?;
        let span = self.subtree_span(pos);
        if let Some(parent_id) = parent {
            let parent_pos = self
                .position(parent_id)
                .ok_or_else(|| VaultError::not_found("parent group"))?;
            if span.contains(&parent_pos) {
                return Err(VaultError::bad_argument("cannot move a group under its own subtree"));
            }
        }

        let old_level = self.groups[pos].level;
        let mut subtree: Vec<Group> = self.groups.drain(span).collect();

        match subtree[0].parent {
            None => self.root_children.retain(|&child| child != id),
            Some(old_parent) => {
                if let Some(old_pos) = self.position(old_parent) {
                    self.groups[old_pos].children.retain(|&child| child != id);
                }
            }
        }

        let (new_level, insert_at) = match parent {
            None => {
                self.root_children.push(id);
                (0u16, self.groups.len())
            }
            Some(parent_id) => {
                let parent_pos = self
                    .position(parent_id)
                    .ok_or_else(|| VaultError::not_found("parent group"))?;
                let parent_span = self.subtree_span(parent_pos);
                self.groups[parent_pos].children.push(id);
                (self.groups[parent_pos].level + 1, parent_span.end)
            }
        };

        let delta = new_level as i32 - old_level as i32;
        for group in &mut subtree {
            group.level = (group.level as i32 + delta) as u16;
        }
        subtree[0].parent = parent;
        subtree[0].touch_last_mod();

        self.groups.splice(insert_at..insert_at, subtree);
        Ok(())
    }

    /// Swaps a group with the sibling at `index` in its parent's child
    /// list, mirroring the swap in the flat order (whole subtrees move).
    /// Touches the group's modification time.
    ///
    /// # Errors
    /// `NotFound` when the group does not exist, `IndexOutOfRange` when the
    /// index is not a valid sibling position.
    pub fn move_group_in_parent(&mut self, id: GroupId, index: usize) -> Result<(), VaultError> {
        let pos = self.position(id).ok_or_else(|| VaultError::not_found("group"))?;
        let parent = self.groups[pos].parent;

        let (current_index, other_id) = {
            let siblings: &[GroupId] = match parent {
                None => &self.root_children,
                Some(parent_id) => {
                    let parent_pos = self
                        .position(parent_id)
                        .ok_or_else(|| VaultError::not_found("parent group"))?;
                    &self.groups[parent_pos].children
                }
            };
            if index >= siblings.len() {
                return Err(VaultError::IndexOutOfRange);
            }
            let current_index = siblings
                .iter()
                .position(|&sibling| sibling == id)
                .ok_or_else(|| VaultError::not_found("group in its parent"))?;
            (current_index, siblings[index])
        };

        if other_id == id {
            if let Some(pos) = self.position(id) {
                self.groups[pos].touch_last_mod();
            }
            return Ok(());
        }

        match parent {
            None => self.root_children.swap(current_index, index),
            Some(parent_id) => {
                if let Some(parent_pos) = self.position(parent_id) {
                    self.groups[parent_pos].children.swap(current_index, index);
                }
            }
        }

        let pos_a = self.position(id).ok_or_else(|| VaultError::not_found("group"))?;
        let pos_b = self.position(other_id).ok_or_else(|| VaultError::not_found("group"))?;
        let (first_pos, second_pos) = if pos_a < pos_b { (pos_a, pos_b) } else { (pos_b, pos_a) };
        let first_span = self.subtree_span(first_pos);
        let second_span = self.subtree_span(second_pos);

        // prefix | first subtree | middle | second subtree | suffix
        // becomes prefix | second subtree | middle | first subtree | suffix
        let mut all = std::mem::take(&mut self.groups);
        let suffix = all.split_off(second_span.end);
        let second = all.split_off(second_span.start);
        let middle = all.split_off(first_span.end);
        let first = all.split_off(first_span.start);
        let mut rebuilt = all;
        rebuilt.extend(second);
        rebuilt.extend(middle);
        rebuilt.extend(first);
        rebuilt.extend(suffix);
        self.groups = rebuilt;

        if let Some(pos) = self.position(id) {
            self.groups[pos].touch_last_mod();
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Entry mutations
    // ---------------------------------------------------------------------

    /// Creates an entry in a group and returns its UUID.
    ///
    /// # Errors
    /// `NotFound` when the group does not exist, `BadDate` when the expiry
    /// is not a valid calendar date (February is capped at 28).
    pub fn create_entry(&mut self, group: GroupId, options: EntryOptions) -> Result<Uuid, VaultError> {
        let group_pos = self.position(group).ok_or_else(|| VaultError::not_found("group"))?;
        let expire = options.expire.unwrap_or_else(VaultDate::never_expires);
        expire.validate_calendar()?;

        let uuid = options.uuid.unwrap_or_else(|| {
            let mut bytes = [0u8; 16];
            OsRng.fill_bytes(&mut bytes);
            Uuid::from_bytes(bytes)
        });

        let mut entry = Entry::new(uuid, group);
        entry.title = Some(options.title);
        entry.url = Some(options.url);
        entry.username = Some(options.username);
        entry.password = Some(options.password);
        entry.comment = Some(options.comment);
        entry.image = Some(options.image.unwrap_or(1));
        entry.touch_all();
        entry.expire = Some(expire);

        self.groups[group_pos].entries.push(uuid);
        self.entries.push(entry);
        self.num_entries += 1;
        Ok(uuid)
    }

    /// Removes an entry.
    ///
    /// # Errors
    /// `NotFound` when the entry does not exist.
    pub fn remove_entry(&mut self, uuid: Uuid) -> Result<(), VaultError> {
        let pos = self
            .entries
            .iter()
            .position(|entry| entry.uuid() == uuid)
            .ok_or_else(|| VaultError::not_found("entry"))?;
        let group_id = self.entries[pos].group_id();
        if let Some(group_pos) = self.position(group_id) {
            self.groups[group_pos].entries.retain(|&owned| owned != uuid);
        }
        self.entries.remove(pos);
        self.num_entries -= 1;
        Ok(())
    }

    /// Moves an entry to another group.
    ///
    /// # Errors
    /// `NotFound` when the entry or the group does not exist.
    pub fn move_entry(&mut self, uuid: Uuid, group: GroupId) -> Result<(), VaultError> {
        let entry_pos = self
            .entries
            .iter()
            .position(|entry| entry.uuid() == uuid)
            .ok_or_else(|| VaultError::not_found("entry"))?;
        let group_pos = self.position(group).ok_or_else(|| VaultError::not_found("group"))?;

        let old_group = self.entries[entry_pos].group_id();
        if let Some(old_pos) = self.position(old_group) {
            self.groups[old_pos].entries.retain(|&owned| owned != uuid);
        }
        self.groups[group_pos].entries.push(uuid);
        self.entries[entry_pos].group_id = group;
        Ok(())
    }

    /// Swaps an entry with the one at `index` in its group's entry list,
    /// mirroring the swap in the flat entry order.
    ///
    /// # Errors
    /// `NotFound` when the entry does not exist, `IndexOutOfRange` when the
    /// index is not a valid position in the owning group.
    pub fn move_entry_in_group(&mut self, uuid: Uuid, index: usize) -> Result<(), VaultError> {
        let entry_pos = self
            .entries
            .iter()
            .position(|entry| entry.uuid() == uuid)
            .ok_or_else(|| VaultError::not_found("entry"))?;
        let group_id = self.entries[entry_pos].group_id();
        let group_pos = self
            .position(group_id)
            .ok_or_else(|| VaultError::not_found("owning group"))?;

        let owned = &self.groups[group_pos].entries;
        if index >= owned.len() {
            return Err(VaultError::IndexOutOfRange);
        }
        let current_index = owned
            .iter()
            .position(|&candidate| candidate == uuid)
            .ok_or_else(|| VaultError::not_found("entry in its group"))?;
        let other = owned[index];

        self.groups[group_pos].entries.swap(current_index, index);
        if other != uuid {
            let other_pos = self
                .entries
                .iter()
                .position(|entry| entry.uuid() == other)
                .ok_or_else(|| VaultError::not_found("entry"))?;
            self.entries.swap(entry_pos, other_pos);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Gets the flat group list in pre-order file order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Gets the entries in file order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Gets the ids of the top-level groups in order.
    pub fn root_children(&self) -> &[GroupId] {
        &self.root_children
    }

    /// Looks up a group by id.
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|group| group.id() == id)
    }

    /// Looks up a group by id for mutation of its own attributes. The tree
    /// links are not reachable this way; structural changes go through the
    /// move and remove operations.
    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.iter_mut().find(|group| group.id() == id)
    }

    /// Looks up an entry by UUID.
    pub fn entry(&self, uuid: Uuid) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.uuid() == uuid)
    }

    /// Looks up an entry by UUID for mutation.
    pub fn entry_mut(&mut self, uuid: Uuid) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.uuid() == uuid)
    }

    /// Gets the group counter (equal to `groups().len()` at rest).
    pub fn num_groups(&self) -> u32 {
        self.num_groups
    }

    /// Gets the entry counter (equal to `entries().len()` at rest).
    pub fn num_entries(&self) -> u32 {
        self.num_entries
    }

    /// Gets the associated file path, if any.
    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    /// Checks whether the vault was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Gets the key transform round count used on the next save.
    pub fn key_transf_rounds(&self) -> u32 {
        self.header.key_transf_rounds
    }

    /// Sets the key transform round count. Values below the supported floor
    /// are raised back to it on save.
    pub fn set_key_transf_rounds(&mut self, rounds: u32) {
        self.header.key_transf_rounds = rounds;
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn position(&self, id: GroupId) -> Option<usize> {
        self.groups.iter().position(|group| group.id() == id)
    }

    /// The contiguous flat range covering a group and all its descendants.
    fn subtree_span(&self, pos: usize) -> Range<usize> {
        let level = self.groups[pos].level;
        let mut end = pos + 1;
        while end < self.groups.len() && self.groups[end].level > level {
            end += 1;
        }
        pos..end
    }

    /// Creates (or truncates) the lock sidecar for the associated file.
    fn create_lock_file(&self) -> Result<(), VaultError> {
        if let Some(path) = &self.filepath {
            fs::File::create(lock_path(path))?;
        }
        Ok(())
    }

    /// Creates the lock sidecar only when it does not exist yet.
    fn ensure_lock_file(&self) -> Result<(), VaultError> {
        if let Some(path) = &self.filepath {
            let lock = lock_path(path);
            if !lock.exists() {
                fs::File::create(&lock)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("groups", &self.num_groups)
            .field("entries", &self.num_entries)
            .field("filepath", &self.filepath)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

/// Path of the advisory lock sidecar: the vault path with `.lock` appended.
fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Sibling temp path used for atomic replacement on save.
fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault_with_tree() -> (Vault, GroupId, GroupId, GroupId) {
        // g1(0) { g1a(1) }, g2(0)
        let mut vault = Vault::create();
        let g1 = vault.groups()[0].id();
        let g1a = vault
            .create_group(GroupOptions::new("Child").with_parent(g1))
            .unwrap();
        let g2 = vault.create_group(GroupOptions::new("Second")).unwrap();
        (vault, g1, g1a, g2)
    }

    fn flat_titles(vault: &Vault) -> Vec<&str> {
        vault.groups().iter().map(|g| g.title()).collect()
    }

    fn flat_levels(vault: &Vault) -> Vec<u16> {
        vault.groups().iter().map(|g| g.level()).collect()
    }

    #[test]
    fn test_create_seeds_default_group() {
        let vault = Vault::create();
        assert_eq!(vault.num_groups(), 1);
        assert_eq!(vault.num_entries(), 0);
        let group = &vault.groups()[0];
        assert_eq!(group.id(), GroupId::new(1));
        assert_eq!(group.title(), "Internet");
        assert_eq!(group.level(), 0);
        assert_eq!(vault.root_children(), &[GroupId::new(1)]);
    }

    #[test]
    fn test_group_ids_grow_from_max() {
        let mut vault = Vault::create();
        let a = vault.create_group(GroupOptions::new("a")).unwrap();
        assert_eq!(a, GroupId::new(2));
        vault.remove_group(a).unwrap();
        let b = vault.create_group(GroupOptions::new("b")).unwrap();
        assert_eq!(b, GroupId::new(2));
        let c = vault.create_group(GroupOptions::new("c")).unwrap();
        assert_eq!(c, GroupId::new(3));
    }

    #[test]
    fn test_child_group_inserted_after_parent() {
        let (vault, g1, g1a, g2) = vault_with_tree();
        assert_eq!(flat_titles(&vault), vec!["Internet", "Child", "Second"]);
        assert_eq!(flat_levels(&vault), vec![0, 1, 0]);
        assert_eq!(vault.group(g1a).unwrap().parent(), Some(g1));
        assert_eq!(vault.group(g1).unwrap().children(), &[g1a]);
        assert_eq!(vault.root_children(), &[g1, g2]);
    }

    #[test]
    fn test_create_group_rejects_zero_image() {
        let mut vault = Vault::create();
        assert!(matches!(
            vault.create_group(GroupOptions::new("x").with_image(0)),
            Err(VaultError::BadArgument(_))
        ));
    }

    #[test]
    fn test_create_group_invalid_expire_falls_back_to_sentinel() {
        let mut vault = Vault::create();
        let bad_expire = VaultDate::new(2024, 2, 29, 0, 0, 0).unwrap();
        let id = vault
            .create_group(GroupOptions::new("x").with_expire(bad_expire))
            .unwrap();
        assert_eq!(vault.group(id).unwrap().expire(), Some(VaultDate::never_expires()));
    }

    #[test]
    fn test_counters_track_collections() {
        let (mut vault, _g1, g1a, g2) = vault_with_tree();
        let e1 = vault.create_entry(g1a, EntryOptions::new("one")).unwrap();
        let _e2 = vault.create_entry(g2, EntryOptions::new("two")).unwrap();
        assert_eq!(vault.num_groups() as usize, vault.groups().len());
        assert_eq!(vault.num_entries() as usize, vault.entries().len());

        vault.remove_entry(e1).unwrap();
        vault.remove_group(g2).unwrap();
        assert_eq!(vault.num_groups() as usize, vault.groups().len());
        assert_eq!(vault.num_entries() as usize, vault.entries().len());
    }

    #[test]
    fn test_remove_group_cascades() {
        let (mut vault, g1, g1a, g2) = vault_with_tree();
        let deep = vault
            .create_group(GroupOptions::new("Deep").with_parent(g1a))
            .unwrap();
        vault.create_entry(g1a, EntryOptions::new("in child")).unwrap();
        vault.create_entry(deep, EntryOptions::new("in deep")).unwrap();
        let survivor = vault.create_entry(g2, EntryOptions::new("other")).unwrap();

        let groups_before = vault.num_groups();
        let entries_before = vault.num_entries();
        vault.remove_group(g1a).unwrap();

        // g1a and deep are gone (2 groups), with their 2 entries.
        assert_eq!(vault.num_groups(), groups_before - 2);
        assert_eq!(vault.num_entries(), entries_before - 2);
        assert!(vault.group(g1a).is_none());
        assert!(vault.group(deep).is_none());
        assert!(vault.entry(survivor).is_some());
        assert_eq!(vault.group(g1).unwrap().children(), &[] as &[GroupId]);
    }

    #[test]
    fn test_move_group_to_new_parent_recomputes_levels() {
        let (mut vault, g1, g1a, g2) = vault_with_tree();
        let deep = vault
            .create_group(GroupOptions::new("Deep").with_parent(g1a))
            .unwrap();

        vault.move_group(g1a, Some(g2)).unwrap();

        assert_eq!(flat_titles(&vault), vec!["Internet", "Second", "Child", "Deep"]);
        assert_eq!(flat_levels(&vault), vec![0, 0, 1, 2]);
        assert_eq!(vault.group(g1a).unwrap().parent(), Some(g2));
        assert_eq!(vault.group(g2).unwrap().children(), &[g1a]);
        assert_eq!(vault.group(g1).unwrap().children(), &[] as &[GroupId]);
        assert_eq!(vault.group(deep).unwrap().level(), 2);
        assert!(vault.group(g1a).unwrap().last_mod().is_some());
    }

    #[test]
    fn test_move_group_to_root() {
        let (mut vault, g1, g1a, g2) = vault_with_tree();
        vault.move_group(g1a, None).unwrap();
        assert_eq!(flat_levels(&vault), vec![0, 0, 0]);
        assert_eq!(vault.root_children(), &[g1, g2, g1a]);
        assert_eq!(vault.group(g1a).unwrap().parent(), None);
    }

    #[test]
    fn test_move_group_rejects_self_and_descendants() {
        let (mut vault, _g1, g1a, _g2) = vault_with_tree();
        let deep = vault
            .create_group(GroupOptions::new("Deep").with_parent(g1a))
            .unwrap();
        assert!(matches!(
            vault.move_group(g1a, Some(g1a)),
            Err(VaultError::BadArgument(_))
        ));
        assert!(matches!(
            vault.move_group(g1a, Some(deep)),
            Err(VaultError::BadArgument(_))
        ));
    }

    #[test]
    fn test_move_group_in_parent_swaps_subtrees() {
        let (mut vault, g1, g1a, g2) = vault_with_tree();
        // root children: [g1, g2]; swap g1 to index 1
        vault.move_group_in_parent(g1, 1).unwrap();
        assert_eq!(vault.root_children(), &[g2, g1]);
        assert_eq!(flat_titles(&vault), vec!["Second", "Internet", "Child"]);
        assert_eq!(flat_levels(&vault), vec![0, 0, 1]);
        assert_eq!(vault.group(g1a).unwrap().parent(), Some(g1));
    }

    #[test]
    fn test_move_group_in_parent_bad_index() {
        let (mut vault, g1, _g1a, _g2) = vault_with_tree();
        assert_eq!(vault.move_group_in_parent(g1, 5), Err(VaultError::IndexOutOfRange));
    }

    #[test]
    fn test_create_entry_validates_calendar() {
        let (mut vault, _g1, g1a, _g2) = vault_with_tree();
        let feb29 = VaultDate::new(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(
            vault.create_entry(g1a, EntryOptions::new("x").with_expire(feb29)),
            Err(VaultError::BadDate)
        );
        assert_eq!(vault.num_entries(), 0);
    }

    #[test]
    fn test_move_entry_between_groups() {
        let (mut vault, _g1, g1a, g2) = vault_with_tree();
        let uuid = vault.create_entry(g1a, EntryOptions::new("moving")).unwrap();
        vault.move_entry(uuid, g2).unwrap();
        assert_eq!(vault.entry(uuid).unwrap().group_id(), g2);
        assert!(vault.group(g1a).unwrap().entries().is_empty());
        assert_eq!(vault.group(g2).unwrap().entries(), &[uuid]);
    }

    #[test]
    fn test_move_entry_in_group_swaps() {
        let (mut vault, _g1, g1a, _g2) = vault_with_tree();
        let first = vault.create_entry(g1a, EntryOptions::new("first")).unwrap();
        let second = vault.create_entry(g1a, EntryOptions::new("second")).unwrap();

        vault.move_entry_in_group(second, 0).unwrap();
        assert_eq!(vault.group(g1a).unwrap().entries(), &[second, first]);
        assert_eq!(vault.entries()[0].uuid(), second);

        assert_eq!(
            vault.move_entry_in_group(second, 2),
            Err(VaultError::IndexOutOfRange)
        );
    }

    #[test]
    fn test_lock_clears_graph_and_counters() {
        let (mut vault, _g1, g1a, _g2) = vault_with_tree();
        vault.create_entry(g1a, EntryOptions::new("secret")).unwrap();
        vault.lock();
        assert_eq!(vault.num_groups(), 0);
        assert_eq!(vault.num_entries(), 0);
        assert!(vault.groups().is_empty());
        assert!(vault.entries().is_empty());
        assert!(vault.root_children().is_empty());
    }

    #[test]
    fn test_save_without_credentials_or_path() {
        let mut vault = Vault::create();
        assert_eq!(vault.save(None, None, None), Err(VaultError::MissingCredentials));
        assert_eq!(vault.save(None, Some("pw"), None), Err(VaultError::NoPath));
    }

    #[test]
    fn test_save_rejects_empty_credential_strings() {
        let mut vault = Vault::create();
        assert!(matches!(
            vault.save(None, Some(""), None),
            Err(VaultError::BadArgument(_))
        ));
        assert!(matches!(
            vault.save(None, None, Some(Path::new(""))),
            Err(VaultError::BadArgument(_))
        ));
    }

    #[test]
    fn test_read_only_blocks_save() {
        let mut vault = Vault::create();
        vault.read_only = true;
        assert_eq!(
            vault.save(None, Some("pw"), None),
            Err(VaultError::ReadOnly)
        );
    }

    #[test]
    fn test_empty_vault_cannot_be_saved() {
        let mut vault = Vault::create();
        vault.lock(); // drops the seeded group
        assert_eq!(
            vault.save(Some(Path::new("/tmp/never-written.kdb")), Some("pw"), None),
            Err(VaultError::EmptyVault)
        );
    }

    #[test]
    fn test_close_without_path() {
        let mut vault = Vault::create();
        assert_eq!(vault.close(), Err(VaultError::NoPath));
    }

    #[test]
    fn test_unlock_normalizes_empty_strings() {
        let mut vault = Vault::create();
        assert_eq!(
            vault.unlock(Some(""), None, None),
            Err(VaultError::MissingCredentials)
        );
        assert_eq!(
            vault.unlock(Some(""), Some(Path::new("")), None),
            Err(VaultError::MissingCredentials)
        );
    }

    #[test]
    fn test_entry_options_debug_hides_password() {
        let options = EntryOptions::new("t").with_password("s3cret");
        let rendered = format!("{:?}", options);
        assert!(!rendered.contains("s3cret"));
    }
}
