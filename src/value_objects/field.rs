// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # TLV Field Primitives
//!
//! The decrypted vault body is a stream of TLV fields: a `u16` type, a `u32`
//! payload size (both little-endian), then `size` payload bytes. A group or
//! entry record is a run of fields closed by the `0xFFFF`/size-0 terminator.
//!
//! This module is the wire layer under the body codec. It provides:
//!
//! - the field-type constants for group and entry records
//! - [`FieldRef`], a borrowed view of one field with a bounds-checked cursor
//! - payload readers for the fixed-width and text payload shapes
//! - [`put_field`], the emission helper used on save
//!
//! ## Bounds Discipline
//!
//! `FieldRef::read_at` verifies that the 6-byte field header *and* the whole
//! declared payload lie inside the plaintext before anything is consumed. A
//! field that overruns the buffer - terminator included - is reported as
//! `TruncatedBody` rather than read past the end.

use crate::value_objects::vault_date::PACKED_DATE_LEN;
use crate::value_objects::VaultDate;
use crate::VaultError;
use uuid::Uuid;

/// Field type closing every group and entry record. Its payload size is 0.
pub const TERMINATOR: u16 = 0xFFFF;

/// Size of the `type` + `size` prefix in front of every payload.
pub const FIELD_HEADER_LEN: usize = 6;

/// Field type ids of a group record.
pub mod group_field {
    /// Free-form comment block; ignored on read, never written.
    pub const COMMENT: u16 = 0x0000;
    /// Group id (`u32`).
    pub const ID: u16 = 0x0001;
    /// Title (NUL-terminated text).
    pub const TITLE: u16 = 0x0002;
    /// Creation time (packed date).
    pub const CREATION: u16 = 0x0003;
    /// Last modification time (packed date).
    pub const LAST_MOD: u16 = 0x0004;
    /// Last access time (packed date).
    pub const LAST_ACCESS: u16 = 0x0005;
    /// Expiry time (packed date).
    pub const EXPIRE: u16 = 0x0006;
    /// Icon index (`u32`).
    pub const IMAGE: u16 = 0x0007;
    /// Tree depth (`u16`), 0 for top-level groups.
    pub const LEVEL: u16 = 0x0008;
    /// Flag word (`u32`).
    pub const FLAGS: u16 = 0x0009;
}

/// Field type ids of an entry record.
pub mod entry_field {
    /// Free-form comment block; ignored on read, never written.
    pub const COMMENT: u16 = 0x0000;
    /// Entry UUID (16 bytes).
    pub const UUID: u16 = 0x0001;
    /// Owning group id (`u32`).
    pub const GROUP_ID: u16 = 0x0002;
    /// Icon index (`u32`).
    pub const IMAGE: u16 = 0x0003;
    /// Title (NUL-terminated text).
    pub const TITLE: u16 = 0x0004;
    /// URL (NUL-terminated text).
    pub const URL: u16 = 0x0005;
    /// Username (NUL-terminated text).
    pub const USERNAME: u16 = 0x0006;
    /// Password (NUL-terminated text).
    pub const PASSWORD: u16 = 0x0007;
    /// Comment (NUL-terminated text).
    pub const NOTES: u16 = 0x0008;
    /// Creation time (packed date).
    pub const CREATION: u16 = 0x0009;
    /// Last modification time (packed date).
    pub const LAST_MOD: u16 = 0x000A;
    /// Last access time (packed date).
    pub const LAST_ACCESS: u16 = 0x000B;
    /// Expiry time (packed date).
    pub const EXPIRE: u16 = 0x000C;
    /// Attachment description (NUL-terminated text).
    pub const BINARY_DESC: u16 = 0x000D;
    /// Attachment bytes (raw, no trailing NUL).
    pub const BINARY: u16 = 0x000E;
}

/// Borrowed view of one field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef<'a> {
    /// Field type id.
    pub field_type: u16,
    /// Payload bytes; the declared size is `payload.len()`.
    pub payload: &'a [u8],
}

impl<'a> FieldRef<'a> {
    /// Reads the field at `*pos` and advances the cursor past it.
    ///
    /// # Errors
    /// Returns `VaultError::TruncatedBody` when fewer than 6 bytes remain
    /// for the field header, or when the declared payload extends past the
    /// end of the buffer.
    pub fn read_at(buf: &'a [u8], pos: &mut usize) -> Result<Self, VaultError> {
        let start = *pos;
        if buf.len().saturating_sub(start) < FIELD_HEADER_LEN {
            return Err(VaultError::TruncatedBody);
        }
        let field_type = u16::from_le_bytes([buf[start], buf[start + 1]]);
        let size = u32::from_le_bytes([buf[start + 2], buf[start + 3], buf[start + 4], buf[start + 5]]) as usize;

        let payload_start = start + FIELD_HEADER_LEN;
        if buf.len() - payload_start < size {
            return Err(VaultError::TruncatedBody);
        }
        *pos = payload_start + size;
        Ok(FieldRef {
            field_type,
            payload: &buf[payload_start..payload_start + size],
        })
    }

    /// Checks whether this field is the record terminator.
    pub fn is_terminator(&self) -> bool {
        self.field_type == TERMINATOR
    }

    /// Reads the payload as a little-endian `u16`.
    pub fn as_u16(&self) -> Result<u16, VaultError> {
        match self.payload {
            [a, b] => Ok(u16::from_le_bytes([*a, *b])),
            _ => Err(VaultError::TruncatedBody),
        }
    }

    /// Reads the payload as a little-endian `u32`.
    pub fn as_u32(&self) -> Result<u32, VaultError> {
        match self.payload {
            [a, b, c, d] => Ok(u32::from_le_bytes([*a, *b, *c, *d])),
            _ => Err(VaultError::TruncatedBody),
        }
    }

    /// Reads the payload as a packed date.
    pub fn as_date(&self) -> Result<VaultDate, VaultError> {
        let bytes: &[u8; PACKED_DATE_LEN] = self
            .payload
            .try_into()
            .map_err(|_| VaultError::TruncatedBody)?;
        VaultDate::unpack(bytes)
    }

    /// Reads the payload as a 16-byte UUID.
    pub fn as_uuid(&self) -> Result<Uuid, VaultError> {
        let bytes: [u8; 16] = self
            .payload
            .try_into()
            .map_err(|_| VaultError::TruncatedBody)?;
        Ok(Uuid::from_bytes(bytes))
    }

    /// Reads the payload as NUL-terminated text.
    ///
    /// The declared size includes the trailing NUL. Invalid UTF-8 falls back
    /// to a Latin-1 reading so that vaults written before the format settled
    /// on UTF-8 still load; the text is re-encoded as UTF-8 on save.
    pub fn as_text(&self) -> Result<String, VaultError> {
        let Some((_, text)) = self.payload.split_last() else {
            return Err(VaultError::TruncatedBody);
        };
        Ok(decode_text(text))
    }
}

/// Decodes text bytes as UTF-8, falling back to Latin-1.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Appends one field (header and payload) to the output buffer.
pub fn put_field(out: &mut Vec<u8>, field_type: u16, payload: &[u8]) {
    out.extend_from_slice(&field_type.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Appends a NUL-terminated text field; the size on the wire is the UTF-8
/// byte length plus one.
pub fn put_text_field(out: &mut Vec<u8>, field_type: u16, text: &str) {
    out.extend_from_slice(&field_type.to_le_bytes());
    out.extend_from_slice(&((text.len() + 1) as u32).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out.push(0);
}

/// Appends the record terminator.
pub fn put_terminator(out: &mut Vec<u8>) {
    put_field(out, TERMINATOR, &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_at_advances_cursor() {
        let mut buf = Vec::new();
        put_field(&mut buf, 0x0001, &7u32.to_le_bytes());
        put_terminator(&mut buf);

        let mut pos = 0;
        let field = FieldRef::read_at(&buf, &mut pos).unwrap();
        assert_eq!(field.field_type, 0x0001);
        assert_eq!(field.as_u32().unwrap(), 7);
        assert_eq!(pos, 10);

        let term = FieldRef::read_at(&buf, &mut pos).unwrap();
        assert!(term.is_terminator());
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn test_truncated_header_rejected() {
        let buf = [0x01, 0x00, 0x04, 0x00, 0x00]; // 5 of 6 header bytes
        let mut pos = 0;
        assert_eq!(FieldRef::read_at(&buf, &mut pos), Err(VaultError::TruncatedBody));
        assert_eq!(pos, 0);
    }

    #[test]
    fn test_overrunning_payload_rejected() {
        let mut buf = Vec::new();
        put_field(&mut buf, 0x0002, b"abc\0");
        buf.truncate(buf.len() - 2); // cut into the payload
        let mut pos = 0;
        assert_eq!(FieldRef::read_at(&buf, &mut pos), Err(VaultError::TruncatedBody));
    }

    #[test]
    fn test_fixed_width_payload_sizes_enforced() {
        let field = FieldRef {
            field_type: 0x0001,
            payload: &[1, 2, 3],
        };
        assert_eq!(field.as_u32(), Err(VaultError::TruncatedBody));
        assert_eq!(field.as_u16(), Err(VaultError::TruncatedBody));
        assert_eq!(field.as_date(), Err(VaultError::TruncatedBody));
        assert!(field.as_uuid().is_err());
    }

    #[test]
    fn test_text_round_trip() {
        let mut buf = Vec::new();
        put_text_field(&mut buf, entry_field::TITLE, "müller");
        let mut pos = 0;
        let field = FieldRef::read_at(&buf, &mut pos).unwrap();
        assert_eq!(field.payload.len(), "müller".len() + 1);
        assert_eq!(field.payload.last(), Some(&0));
        assert_eq!(field.as_text().unwrap(), "müller");
    }

    #[test]
    fn test_empty_text_field() {
        let mut buf = Vec::new();
        put_text_field(&mut buf, group_field::TITLE, "");
        let mut pos = 0;
        let field = FieldRef::read_at(&buf, &mut pos).unwrap();
        assert_eq!(field.payload, &[0]);
        assert_eq!(field.as_text().unwrap(), "");
    }

    #[test]
    fn test_latin1_fallback() {
        // 0xE9 is 'é' in Latin-1 and invalid standalone UTF-8.
        let field = FieldRef {
            field_type: group_field::TITLE,
            payload: &[0x63, 0x61, 0x66, 0xE9, 0x00],
        };
        assert_eq!(field.as_text().unwrap(), "café");
    }

    #[test]
    fn test_zero_size_text_is_truncated() {
        let field = FieldRef {
            field_type: group_field::TITLE,
            payload: &[],
        };
        assert_eq!(field.as_text(), Err(VaultError::TruncatedBody));
    }
}
