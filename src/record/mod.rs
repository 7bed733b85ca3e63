//! Mutation record codec.
//!
//! Every mutation buffered by the batch is encoded as one tagged,
//! variable-length record appended to the mutation log. This module owns
//! that wire format: one tag byte, then the payload slices the tag calls
//! for, each written as a `u32` little-endian length prefix followed by the
//! raw bytes. Explicit-column-family tag variants carry the family id as a
//! `u32` little-endian field between the tag and the first slice; the
//! default-family variants omit it.
//!
//! ```text
//! [TAG u8][CF u32 LE]?[LEN u32 LE][BYTES]...
//! ```
//!
//! The format is hand-written rather than derived so that decoding can hand
//! back the **absolute byte offset of the key** inside the log buffer — the
//! ordered index stores that offset instead of a copy of the key, and it
//! must stay meaningful for the life of the batch.
//!
//! Decoding is strict: an unrecognized tag or a length prefix that runs past
//! the end of the buffer is corruption, never a silent truncation.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

const U32_SIZE: usize = std::mem::size_of::<u32>();

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors produced while decoding a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The tag byte does not name any known record type.
    #[error("unknown record tag 0x{0:02X}")]
    UnknownTag(u8),

    /// The buffer ended inside a record.
    #[error("truncated record (need {needed} bytes, have {available})")]
    Truncated {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Tags
// ------------------------------------------------------------------------------------------------

/// Record tag byte.
///
/// The numbering is part of the wire format and never changes. Keyed tags
/// (the put / delete / single-delete / delete-range / merge pairs) increment
/// the log's count header and get an index entry; meta tags do neither.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    /// Point tombstone, default family.
    Delete = 0x00,
    /// Key/value insert, default family.
    Put = 0x01,
    /// Merge operand, default family.
    Merge = 0x02,
    /// Opaque user blob riding along in the log; never indexed.
    LogData = 0x03,
    /// Point tombstone, explicit family.
    DeleteCf = 0x04,
    /// Key/value insert, explicit family.
    PutCf = 0x05,
    /// Merge operand, explicit family.
    MergeCf = 0x06,
    /// Single-delete tombstone, default family.
    SingleDelete = 0x07,
    /// Single-delete tombstone, explicit family.
    SingleDeleteCf = 0x08,
    /// Transaction prepare section opens.
    BeginPrepare = 0x09,
    /// Transaction prepare section closes; carries the transaction id.
    EndPrepare = 0x0A,
    /// Transaction commit marker; carries the transaction id.
    Commit = 0x0B,
    /// Transaction rollback marker; carries the transaction id.
    Rollback = 0x0C,
    /// Padding record with no payload.
    Noop = 0x0D,
    /// Range tombstone `[begin, end)`, explicit family.
    DeleteRangeCf = 0x0E,
    /// Range tombstone `[begin, end)`, default family.
    DeleteRange = 0x0F,
}

impl RecordTag {
    /// Decode a tag byte.
    pub fn from_u8(byte: u8) -> Result<Self, RecordError> {
        Ok(match byte {
            0x00 => Self::Delete,
            0x01 => Self::Put,
            0x02 => Self::Merge,
            0x03 => Self::LogData,
            0x04 => Self::DeleteCf,
            0x05 => Self::PutCf,
            0x06 => Self::MergeCf,
            0x07 => Self::SingleDelete,
            0x08 => Self::SingleDeleteCf,
            0x09 => Self::BeginPrepare,
            0x0A => Self::EndPrepare,
            0x0B => Self::Commit,
            0x0C => Self::Rollback,
            0x0D => Self::Noop,
            0x0E => Self::DeleteRangeCf,
            0x0F => Self::DeleteRange,
            other => return Err(RecordError::UnknownTag(other)),
        })
    }

    /// Whether this tag carries an explicit column family id.
    pub fn has_column_family(self) -> bool {
        matches!(
            self,
            Self::DeleteCf
                | Self::PutCf
                | Self::MergeCf
                | Self::SingleDeleteCf
                | Self::DeleteRangeCf
        )
    }

    /// The write operation this tag encodes, or `None` for meta tags.
    pub fn write_op(self) -> Option<WriteOpKind> {
        Some(match self {
            Self::Put | Self::PutCf => WriteOpKind::Put,
            Self::Delete | Self::DeleteCf => WriteOpKind::Delete,
            Self::SingleDelete | Self::SingleDeleteCf => WriteOpKind::SingleDelete,
            Self::DeleteRange | Self::DeleteRangeCf => WriteOpKind::DeleteRange,
            Self::Merge | Self::MergeCf => WriteOpKind::Merge,
            _ => return None,
        })
    }

    /// Whether this tag is counted by the log header and indexed.
    pub fn is_keyed(self) -> bool {
        self.write_op().is_some()
    }
}

/// The five kinds of keyed mutation, independent of family addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOpKind {
    /// Key/value insert.
    Put,
    /// Point tombstone.
    Delete,
    /// Single-delete tombstone.
    SingleDelete,
    /// Range tombstone; the record's key is the begin bound, its value the
    /// end bound.
    DeleteRange,
    /// Merge operand.
    Merge,
}

// ------------------------------------------------------------------------------------------------
// Decoded view
// ------------------------------------------------------------------------------------------------

/// Borrowed view of one decoded record.
///
/// Slices borrow from the buffer handed to [`read_record`]; fields a tag
/// does not use are empty. `key_offset` is the absolute position of the key
/// bytes within that buffer, which is what the index stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef<'a> {
    /// The record's tag.
    pub tag: RecordTag,
    /// Explicit family id, or 0 for default-family tags.
    pub column_family: u32,
    /// User key (begin bound for range tombstones).
    pub key: &'a [u8],
    /// Absolute offset of `key` within the decoded buffer.
    pub key_offset: usize,
    /// Value, merge operand, or end bound for range tombstones.
    pub value: &'a [u8],
    /// Log-data payload.
    pub blob: &'a [u8],
    /// Transaction id for prepare/commit/rollback markers.
    pub xid: &'a [u8],
}

impl<'a> RecordRef<'a> {
    fn empty(tag: RecordTag) -> Self {
        Self {
            tag,
            column_family: 0,
            key: &[],
            key_offset: 0,
            value: &[],
            blob: &[],
            xid: &[],
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Decoding
// ------------------------------------------------------------------------------------------------

fn read_u32(buf: &[u8], pos: usize) -> Result<(u32, usize), RecordError> {
    let end = pos + U32_SIZE;
    if end > buf.len() {
        return Err(RecordError::Truncated {
            needed: U32_SIZE,
            available: buf.len().saturating_sub(pos),
        });
    }
    let mut raw = [0u8; U32_SIZE];
    raw.copy_from_slice(&buf[pos..end]);
    Ok((u32::from_le_bytes(raw), end))
}

/// Read one `[LEN u32 LE][BYTES]` slice, returning the slice, its absolute
/// offset, and the position after it.
fn read_slice(buf: &[u8], pos: usize) -> Result<(&[u8], usize, usize), RecordError> {
    let (len, data_start) = read_u32(buf, pos)?;
    let len = len as usize;
    let end = data_start
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or(RecordError::Truncated {
            needed: len,
            available: buf.len().saturating_sub(data_start),
        })?;
    Ok((&buf[data_start..end], data_start, end))
}

/// Decode the record starting at `pos`.
///
/// Returns the decoded view and the position of the next record. Offsets in
/// the returned view are absolute within `buf`, so callers that decode from
/// the middle of the log get index-ready spans.
pub fn read_record(buf: &[u8], pos: usize) -> Result<(RecordRef<'_>, usize), RecordError> {
    if pos >= buf.len() {
        return Err(RecordError::Truncated {
            needed: 1,
            available: 0,
        });
    }
    let tag = RecordTag::from_u8(buf[pos])?;
    let mut rec = RecordRef::empty(tag);
    let mut cursor = pos + 1;

    if tag.has_column_family() {
        let (cf, next) = read_u32(buf, cursor)?;
        rec.column_family = cf;
        cursor = next;
    }

    match tag {
        RecordTag::Put | RecordTag::PutCf | RecordTag::Merge | RecordTag::MergeCf => {
            let (key, key_offset, next) = read_slice(buf, cursor)?;
            let (value, _, next) = read_slice(buf, next)?;
            rec.key = key;
            rec.key_offset = key_offset;
            rec.value = value;
            cursor = next;
        }
        RecordTag::Delete
        | RecordTag::DeleteCf
        | RecordTag::SingleDelete
        | RecordTag::SingleDeleteCf => {
            let (key, key_offset, next) = read_slice(buf, cursor)?;
            rec.key = key;
            rec.key_offset = key_offset;
            cursor = next;
        }
        RecordTag::DeleteRange | RecordTag::DeleteRangeCf => {
            // begin bound rides in the key slot, end bound in the value slot
            let (begin, key_offset, next) = read_slice(buf, cursor)?;
            let (end, _, next) = read_slice(buf, next)?;
            rec.key = begin;
            rec.key_offset = key_offset;
            rec.value = end;
            cursor = next;
        }
        RecordTag::LogData => {
            let (blob, _, next) = read_slice(buf, cursor)?;
            rec.blob = blob;
            cursor = next;
        }
        RecordTag::EndPrepare | RecordTag::Commit | RecordTag::Rollback => {
            let (xid, _, next) = read_slice(buf, cursor)?;
            rec.xid = xid;
            cursor = next;
        }
        RecordTag::BeginPrepare | RecordTag::Noop => {}
    }

    Ok((rec, cursor))
}

// ------------------------------------------------------------------------------------------------
// Encoding
// ------------------------------------------------------------------------------------------------

fn write_slice(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn write_header(buf: &mut Vec<u8>, default_tag: RecordTag, cf_tag: RecordTag, cf: u32) {
    if cf == 0 {
        buf.push(default_tag as u8);
    } else {
        buf.push(cf_tag as u8);
        buf.extend_from_slice(&cf.to_le_bytes());
    }
}

/// Append an encoded put record.
pub fn encode_put(buf: &mut Vec<u8>, cf: u32, key: &[u8], value: &[u8]) {
    write_header(buf, RecordTag::Put, RecordTag::PutCf, cf);
    write_slice(buf, key);
    write_slice(buf, value);
}

/// Append an encoded point-delete record.
pub fn encode_delete(buf: &mut Vec<u8>, cf: u32, key: &[u8]) {
    write_header(buf, RecordTag::Delete, RecordTag::DeleteCf, cf);
    write_slice(buf, key);
}

/// Append an encoded single-delete record.
pub fn encode_single_delete(buf: &mut Vec<u8>, cf: u32, key: &[u8]) {
    write_header(buf, RecordTag::SingleDelete, RecordTag::SingleDeleteCf, cf);
    write_slice(buf, key);
}

/// Append an encoded range-tombstone record for `[begin, end)`.
pub fn encode_delete_range(buf: &mut Vec<u8>, cf: u32, begin: &[u8], end: &[u8]) {
    write_header(buf, RecordTag::DeleteRange, RecordTag::DeleteRangeCf, cf);
    write_slice(buf, begin);
    write_slice(buf, end);
}

/// Append an encoded merge record.
pub fn encode_merge(buf: &mut Vec<u8>, cf: u32, key: &[u8], value: &[u8]) {
    write_header(buf, RecordTag::Merge, RecordTag::MergeCf, cf);
    write_slice(buf, key);
    write_slice(buf, value);
}

/// Append an encoded log-data record.
pub fn encode_log_data(buf: &mut Vec<u8>, blob: &[u8]) {
    buf.push(RecordTag::LogData as u8);
    write_slice(buf, blob);
}

/// Append a begin-prepare marker.
pub fn encode_begin_prepare(buf: &mut Vec<u8>) {
    buf.push(RecordTag::BeginPrepare as u8);
}

/// Append an end-prepare marker carrying the transaction id.
pub fn encode_end_prepare(buf: &mut Vec<u8>, xid: &[u8]) {
    buf.push(RecordTag::EndPrepare as u8);
    write_slice(buf, xid);
}

/// Append a commit marker carrying the transaction id.
pub fn encode_commit(buf: &mut Vec<u8>, xid: &[u8]) {
    buf.push(RecordTag::Commit as u8);
    write_slice(buf, xid);
}

/// Append a rollback marker carrying the transaction id.
pub fn encode_rollback(buf: &mut Vec<u8>, xid: &[u8]) {
    buf.push(RecordTag::Rollback as u8);
    write_slice(buf, xid);
}

/// Append a no-op record.
pub fn encode_noop(buf: &mut Vec<u8>) {
    buf.push(RecordTag::Noop as u8);
}
