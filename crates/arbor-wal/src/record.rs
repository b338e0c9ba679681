//! WAL log record format.

use arbor_common::{ArborError, BlockNumber, OffsetNumber, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Log Sequence Number.
///
/// A monotonically increasing 64-bit position in the WAL. Pages are stamped
/// with the LSN just past the record that last modified them, so comparing a
/// page LSN (or NSN) with a remembered position tells whether the page
/// changed after that position was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Lsn(pub u64);

impl Lsn {
    /// Invalid/uninitialized LSN.
    pub const INVALID: Lsn = Lsn(0);

    /// First valid LSN.
    pub const FIRST: Lsn = Lsn(1);

    /// Creates a new LSN from segment ID and offset.
    pub fn new(segment_id: u32, offset: u32) -> Self {
        Self(((segment_id as u64) << 32) | (offset as u64))
    }

    /// Returns the segment ID portion of this LSN.
    pub fn segment_id(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the offset within the segment.
    pub fn offset(&self) -> u32 {
        self.0 as u32
    }

    /// Returns true if this is a valid LSN.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }

    /// Returns the LSN after advancing by the given number of bytes.
    pub fn advance(&self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }
}

impl std::fmt::Display for Lsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:X}/{:08X}", self.segment_id(), self.offset())
    }
}

/// Types of log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogRecordType {
    /// Invalid/padding record.
    Invalid = 0,
    /// Removal of a batch of entries from one GiST page.
    GistPageUpdate = 1,
    /// Unlink of an empty GiST leaf from its parent.
    GistPageDelete = 2,
}

impl TryFrom<u8> for LogRecordType {
    type Error = ArborError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LogRecordType::Invalid),
            1 => Ok(LogRecordType::GistPageUpdate),
            2 => Ok(LogRecordType::GistPageDelete),
            _ => Err(ArborError::WalCorrupted {
                lsn: 0,
                reason: format!("invalid record type: {}", value),
            }),
        }
    }
}

/// A single log record in the WAL.
///
/// Record format on disk:
/// - header (12 bytes):
///   - lsn: 8 bytes
///   - record_type: 1 byte
///   - flags: 1 byte
///   - payload_len: 2 bytes
/// - payload: variable length
/// - checksum: 4 bytes (CRC32 of header + payload)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Start position of this record.
    pub lsn: Lsn,
    /// Type of this record.
    pub record_type: LogRecordType,
    /// Record flags.
    pub flags: u8,
    /// Record payload.
    pub payload: Bytes,
}

impl LogRecord {
    /// Size of the record header in bytes.
    pub const HEADER_SIZE: usize = 12;
    /// Size of the checksum in bytes.
    pub const CHECKSUM_SIZE: usize = 4;
    /// Maximum payload size.
    pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

    /// Creates a new log record.
    pub fn new(lsn: Lsn, record_type: LogRecordType, payload: Bytes) -> Self {
        Self {
            lsn,
            record_type,
            flags: 0,
            payload,
        }
    }

    /// Returns the total size of this record on disk.
    pub fn size_on_disk(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len() + Self::CHECKSUM_SIZE
    }

    /// Returns the position just past this record.
    pub fn end_lsn(&self) -> Lsn {
        self.lsn.advance(self.size_on_disk() as u64)
    }

    /// Serializes this record to bytes.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size_on_disk());
        self.write_body(&mut buf);

        let checksum = crc32fast::hash(&buf);
        buf.put_u32_le(checksum);

        buf.freeze()
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.lsn.0);
        buf.put_u8(self.record_type as u8);
        buf.put_u8(self.flags);
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_slice(&self.payload);
    }

    /// Deserializes a record from the front of `data`.
    ///
    /// Trailing bytes after the record are ignored; use
    /// [`LogRecord::size_on_disk`] to advance past it.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < Self::HEADER_SIZE + Self::CHECKSUM_SIZE {
            return Err(ArborError::WalCorrupted {
                lsn: 0,
                reason: "record too short".to_string(),
            });
        }

        let mut cursor = data;
        let lsn = Lsn(cursor.get_u64_le());
        let type_byte = cursor.get_u8();
        let flags = cursor.get_u8();
        let payload_len = cursor.get_u16_le() as usize;

        if cursor.len() < payload_len + Self::CHECKSUM_SIZE {
            return Err(ArborError::WalCorrupted {
                lsn: lsn.0,
                reason: "truncated record".to_string(),
            });
        }

        let body_len = Self::HEADER_SIZE + payload_len;
        let computed_checksum = crc32fast::hash(&data[..body_len]);
        let stored_checksum = (&data[body_len..]).get_u32_le();
        if stored_checksum != computed_checksum {
            return Err(ArborError::WalCorrupted {
                lsn: lsn.0,
                reason: format!(
                    "checksum mismatch: stored={}, computed={}",
                    stored_checksum, computed_checksum
                ),
            });
        }

        let record_type = LogRecordType::try_from(type_byte).map_err(|_| {
            ArborError::WalCorrupted {
                lsn: lsn.0,
                reason: format!("invalid record type: {}", type_byte),
            }
        })?;

        Ok(Self {
            lsn,
            record_type,
            flags,
            payload: Bytes::copy_from_slice(&cursor[..payload_len]),
        })
    }

    /// Parses every record in a contiguous buffer.
    ///
    /// A zero-filled tail (preallocated but unwritten space) ends the scan.
    pub fn parse_all(data: &[u8]) -> Result<Vec<Self>> {
        let mut records = Vec::new();
        let mut offset = 0;

        while offset + Self::HEADER_SIZE <= data.len() {
            if data[offset..offset + Self::HEADER_SIZE].iter().all(|&b| b == 0) {
                break;
            }
            let record = Self::deserialize(&data[offset..])?;
            offset += record.size_on_disk();
            records.push(record);
        }

        Ok(records)
    }
}

/// Payload for removing a batch of entries from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUpdatePayload {
    /// Page being modified.
    pub block: BlockNumber,
    /// 1-based offsets of the removed entries, ascending.
    pub deleted_offsets: Vec<OffsetNumber>,
}

impl PageUpdatePayload {
    /// Serializes the payload to bytes.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6 + self.deleted_offsets.len() * 2);
        buf.put_u32_le(self.block.0);
        buf.put_u16_le(self.deleted_offsets.len() as u16);
        for &offset in &self.deleted_offsets {
            buf.put_u16_le(offset);
        }
        buf.freeze()
    }

    /// Deserializes the payload from bytes.
    pub fn deserialize(mut data: &[u8]) -> Result<Self> {
        if data.len() < 6 {
            return Err(payload_error("page update payload too short"));
        }
        let block = BlockNumber(data.get_u32_le());
        let count = data.get_u16_le() as usize;
        if data.len() < count * 2 {
            return Err(payload_error("page update offsets truncated"));
        }
        let deleted_offsets = (0..count).map(|_| data.get_u16_le()).collect();
        Ok(Self {
            block,
            deleted_offsets,
        })
    }
}

/// Payload for unlinking an empty leaf from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDeletePayload {
    /// Leaf being marked deleted.
    pub leaf: BlockNumber,
    /// Parent losing its downlink.
    pub parent: BlockNumber,
    /// Offset of the removed downlink in the parent.
    pub downlink: OffsetNumber,
    /// Full transaction id stamped on the deleted leaf.
    pub delete_xid: u64,
}

impl PageDeletePayload {
    /// Size of the payload in bytes.
    pub const SIZE: usize = 18;

    /// Serializes the payload to bytes.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u32_le(self.leaf.0);
        buf.put_u32_le(self.parent.0);
        buf.put_u16_le(self.downlink);
        buf.put_u64_le(self.delete_xid);
        buf.freeze()
    }

    /// Deserializes the payload from bytes.
    pub fn deserialize(mut data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(payload_error("page delete payload too short"));
        }
        Ok(Self {
            leaf: BlockNumber(data.get_u32_le()),
            parent: BlockNumber(data.get_u32_le()),
            downlink: data.get_u16_le(),
            delete_xid: data.get_u64_le(),
        })
    }
}

fn payload_error(reason: &str) -> ArborError {
    ArborError::WalCorrupted {
        lsn: 0,
        reason: reason.to_string(),
    }
}
