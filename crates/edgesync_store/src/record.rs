//! Framed record log.
//!
//! Every durable structure in this crate is a sequence of records appended to
//! a [`StorageBackend`]:
//!
//! ```text
//! magic "ESRL" (4) | version u16 (2) | kind u8 (1) | len u32 (4) | payload | crc32 (4)
//! ```
//!
//! All integers are little endian and the CRC covers everything before it.
//! Replay treats a partial header or payload at the end of the log as a torn
//! write and stops there; anything else that does not parse is corruption.

use crate::error::{StoreError, StoreResult};
use edgesync_storage::StorageBackend;

/// Magic bytes identifying a record.
pub const RECORD_MAGIC: [u8; 4] = *b"ESRL";

/// Current record format version.
pub const RECORD_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// CRC size.
pub const CRC_SIZE: usize = 4;

/// Kind of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// A queue entry was written.
    EntryPut = 1,
    /// Queue entries were deleted.
    EntryDelete = 2,
    /// A queue partition was purged.
    Purge = 3,
    /// The next id of a compacted queue.
    Sequence = 4,
    /// A state key was set.
    StateSet = 5,
    /// A state key was removed.
    StateRemove = 6,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::EntryPut),
            2 => Some(Self::EntryDelete),
            3 => Some(Self::Purge),
            4 => Some(Self::Sequence),
            5 => Some(Self::StateSet),
            6 => Some(Self::StateRemove),
            _ => None,
        }
    }

    /// Converts the record kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Offset of the record's first byte.
    pub offset: u64,
    /// Record kind.
    pub kind: RecordKind,
    /// Raw payload (CBOR for every kind this crate writes).
    pub payload: Vec<u8>,
}

/// Builds the on-disk bytes for one record.
pub fn encode_record(kind: RecordKind, payload: &[u8]) -> StoreResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::InvalidArgument("record payload too large".into()))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&RECORD_MAGIC);
    data.extend_from_slice(&RECORD_VERSION.to_le_bytes());
    data.push(kind.as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Result of scanning a log.
#[derive(Debug, Default)]
pub struct Replay {
    /// Every complete, valid record in order.
    pub records: Vec<LogRecord>,
    /// Offset just past the last valid record.
    pub valid_len: u64,
    /// Bytes after `valid_len` that belong to a torn write.
    pub torn_bytes: u64,
}

/// Parses every record in `data`.
pub fn scan(data: &[u8]) -> StoreResult<Replay> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let rest = &data[pos..];
        if rest.len() < HEADER_SIZE {
            break;
        }

        if rest[0..4] != RECORD_MAGIC {
            return Err(StoreError::corruption(format!("invalid magic at offset {pos}")));
        }

        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > RECORD_VERSION {
            return Err(StoreError::corruption(format!(
                "unsupported version {version} at offset {pos}"
            )));
        }

        let kind_byte = rest[6];
        let kind = RecordKind::from_byte(kind_byte).ok_or_else(|| {
            StoreError::corruption(format!("unknown record kind {kind_byte} at offset {pos}"))
        })?;

        let len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;
        let total = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < total {
            break;
        }

        let body_end = HEADER_SIZE + len;
        let stored_crc = u32::from_le_bytes([
            rest[body_end],
            rest[body_end + 1],
            rest[body_end + 2],
            rest[body_end + 3],
        ]);
        let computed_crc = compute_crc32(&rest[..body_end]);
        if stored_crc != computed_crc {
            return Err(StoreError::corruption(format!(
                "CRC mismatch at offset {pos}: stored {stored_crc:#010x}, computed {computed_crc:#010x}"
            )));
        }

        records.push(LogRecord {
            offset: pos as u64,
            kind,
            payload: rest[HEADER_SIZE..body_end].to_vec(),
        });
        pos += total;
    }

    Ok(Replay {
        records,
        valid_len: pos as u64,
        torn_bytes: (data.len() - pos) as u64,
    })
}

/// An append-only log of framed records.
pub struct RecordLog {
    backend: Box<dyn StorageBackend>,
    read_only: bool,
    torn_bytes: u64,
    /// Valid length to restore before the next write, after a failed
    /// append could not be undone.
    restore_to: Option<u64>,
}

impl RecordLog {
    /// Opens a log and replays it.
    ///
    /// A torn tail is cut off so that later appends are not hidden behind it.
    pub fn open(backend: Box<dyn StorageBackend>) -> StoreResult<(Self, Vec<LogRecord>)> {
        let (mut log, replay) = Self::replay(backend, false)?;

        if replay.torn_bytes > 0 {
            tracing::warn!(
                valid_len = replay.valid_len,
                torn_bytes = replay.torn_bytes,
                "discarding torn record at end of log"
            );
            log.backend.truncate(replay.valid_len)?;
        }

        Ok((log, replay.records))
    }

    /// Opens a log for reading only.
    ///
    /// A torn tail is reported through [`RecordLog::torn_bytes`] and left in
    /// place. Every write fails with [`StoreError::ReadOnly`].
    pub fn open_read_only(backend: Box<dyn StorageBackend>) -> StoreResult<(Self, Vec<LogRecord>)> {
        let (log, replay) = Self::replay(backend, true)?;
        Ok((log, replay.records))
    }

    fn replay(backend: Box<dyn StorageBackend>, read_only: bool) -> StoreResult<(Self, Replay)> {
        let replay = scan(&backend.read_all()?)?;
        let log = Self {
            backend,
            read_only,
            torn_bytes: replay.torn_bytes,
            restore_to: None,
        };
        Ok((log, replay))
    }

    /// Appends a record and flushes it. Returns the record's offset.
    ///
    /// If the write fails partway, the bytes that reached the backend are
    /// removed again so the next record follows the last valid one.
    pub fn append(&mut self, kind: RecordKind, payload: &[u8]) -> StoreResult<u64> {
        self.check_writable()?;
        if let Some(valid_len) = self.restore_to {
            self.backend.truncate(valid_len)?;
            self.restore_to = None;
        }

        let data = encode_record(kind, payload)?;
        let start = self.backend.size()?;
        let written = match self.backend.append(&data) {
            Ok(offset) => self.backend.flush().map(|()| offset),
            Err(e) => Err(e),
        };

        match written {
            Ok(offset) => Ok(offset),
            Err(e) => {
                let grew = !matches!(self.backend.size(), Ok(size) if size <= start);
                if grew {
                    if let Err(undo) = self.backend.truncate(start) {
                        tracing::warn!(
                            error = %undo,
                            valid_len = start,
                            "could not undo partial append"
                        );
                        self.restore_to = Some(start);
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Atomically replaces the log with `records`.
    ///
    /// On failure the previous content is kept.
    pub fn rewrite(&mut self, records: &[(RecordKind, Vec<u8>)]) -> StoreResult<()> {
        self.check_writable()?;
        let mut data = Vec::new();
        for (kind, payload) in records {
            data.extend(encode_record(*kind, payload)?);
        }
        self.backend.replace(&data)?;
        self.restore_to = None;
        Ok(())
    }

    /// Current size in bytes.
    pub fn size(&self) -> StoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Bytes of a torn record found at the end of the log on open.
    pub fn torn_bytes(&self) -> u64 {
        self.torn_bytes
    }

    /// Returns true if the log was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Forces data and metadata to stable storage.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.check_writable()?;
        self.backend.sync()?;
        Ok(())
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RecordLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLog")
            .field("size", &self.backend.size().ok())
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{Faults, FaultyBackend};
    use edgesync_storage::InMemoryBackend;

    #[test]
    fn record_kind_bytes() {
        for kind in [
            RecordKind::EntryPut,
            RecordKind::EntryDelete,
            RecordKind::Purge,
            RecordKind::Sequence,
            RecordKind::StateSet,
            RecordKind::StateRemove,
        ] {
            assert_eq!(RecordKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(RecordKind::from_byte(0), None);
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn envelope_layout() {
        let data = encode_record(RecordKind::Purge, b"xy").unwrap();
        assert_eq!(&data[0..4], b"ESRL");
        assert_eq!(u16::from_le_bytes([data[4], data[5]]), RECORD_VERSION);
        assert_eq!(data[6], RecordKind::Purge.as_byte());
        assert_eq!(u32::from_le_bytes([data[7], data[8], data[9], data[10]]), 2);
        assert_eq!(&data[11..13], b"xy");
        assert_eq!(data.len(), HEADER_SIZE + 2 + CRC_SIZE);
    }

    #[test]
    fn scan_reads_consecutive_records() {
        let mut data = encode_record(RecordKind::EntryPut, b"first").unwrap();
        let second_offset = data.len() as u64;
        data.extend(encode_record(RecordKind::EntryDelete, b"second").unwrap());

        let replay = scan(&data).unwrap();
        assert_eq!(replay.records.len(), 2);
        assert_eq!(replay.records[1].offset, second_offset);
        assert_eq!(replay.records[1].kind, RecordKind::EntryDelete);
        assert_eq!(replay.records[1].payload, b"second");
        assert_eq!(replay.torn_bytes, 0);
    }

    #[test]
    fn torn_tail_is_not_an_error() {
        let mut data = encode_record(RecordKind::EntryPut, b"kept").unwrap();
        let kept = data.len() as u64;
        let torn = encode_record(RecordKind::EntryPut, b"half written").unwrap();
        data.extend_from_slice(&torn[..torn.len() - 3]);

        let replay = scan(&data).unwrap();
        assert_eq!(replay.records.len(), 1);
        assert_eq!(replay.valid_len, kept);
        assert_eq!(replay.torn_bytes, (torn.len() - 3) as u64);

        data.truncate(kept as usize + 5);
        assert_eq!(scan(&data).unwrap().records.len(), 1);
    }

    #[test]
    fn crc_mismatch_is_corruption() {
        let mut data = encode_record(RecordKind::StateSet, b"payload").unwrap();
        data[HEADER_SIZE] ^= 0xFF;
        assert!(matches!(scan(&data), Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn bad_magic_and_kind_are_corruption() {
        let mut data = encode_record(RecordKind::StateSet, b"payload").unwrap();
        data[0] = b'X';
        assert!(matches!(scan(&data), Err(StoreError::Corruption { .. })));

        let mut data = encode_record(RecordKind::StateSet, b"payload").unwrap();
        data[6] = 42;
        assert!(matches!(scan(&data), Err(StoreError::Corruption { .. })));

        let mut data = encode_record(RecordKind::StateSet, b"payload").unwrap();
        data[4] = 9;
        assert!(matches!(scan(&data), Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn open_cuts_torn_tail_before_appending() {
        let backend = InMemoryBackend::new();
        let mut bytes = encode_record(RecordKind::Purge, b"").unwrap();
        bytes.extend_from_slice(&RECORD_MAGIC);
        let mut writer = backend.clone();
        writer.append(&bytes).unwrap();

        let (mut log, records) = RecordLog::open(Box::new(backend.clone())).unwrap();
        assert_eq!(records.len(), 1);
        log.append(RecordKind::Sequence, b"next").unwrap();

        let (_, records) = RecordLog::open(Box::new(backend)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, RecordKind::Sequence);
    }

    #[test]
    fn torn_append_is_undone_before_next_record() {
        let backend = FaultyBackend::new();
        let (mut log, _) = RecordLog::open(Box::new(backend.clone())).unwrap();
        log.append(RecordKind::EntryPut, b"first").unwrap();
        let valid = log.size().unwrap();

        backend.set(Faults {
            torn_appends: true,
            ..Faults::default()
        });
        assert!(log.append(RecordKind::EntryPut, b"half of this lands").is_err());
        assert_eq!(log.size().unwrap(), valid);

        backend.set(Faults::default());
        log.append(RecordKind::EntryPut, b"third").unwrap();

        let (_, records) = RecordLog::open(Box::new(backend)).unwrap();
        let payloads: Vec<&[u8]> = records.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(payloads, vec![b"first".as_slice(), b"third".as_slice()]);
    }

    #[test]
    fn torn_append_without_undo_is_cut_on_next_write() {
        let backend = FaultyBackend::new();
        let (mut log, _) = RecordLog::open(Box::new(backend.clone())).unwrap();
        log.append(RecordKind::EntryPut, b"first").unwrap();

        backend.set(Faults {
            torn_appends: true,
            refuse_truncate: true,
            ..Faults::default()
        });
        assert!(log.append(RecordKind::EntryPut, b"half of this lands").is_err());

        backend.set(Faults::default());
        log.append(RecordKind::EntryPut, b"third").unwrap();

        let (_, records) = RecordLog::open(Box::new(backend)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].payload, b"third");
    }

    #[test]
    fn failed_rewrite_keeps_old_records() {
        let backend = FaultyBackend::new();
        let (mut log, _) = RecordLog::open(Box::new(backend.clone())).unwrap();
        log.append(RecordKind::EntryPut, b"kept").unwrap();

        backend.set(Faults {
            refuse_replace: true,
            ..Faults::default()
        });
        assert!(log.rewrite(&[(RecordKind::Sequence, b"seq".to_vec())]).is_err());

        let (_, records) = RecordLog::open(Box::new(backend)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, b"kept");
    }

    #[test]
    fn read_only_open_leaves_torn_tail() {
        let mut bytes = encode_record(RecordKind::Purge, b"").unwrap();
        bytes.extend_from_slice(&RECORD_MAGIC);
        let backend = InMemoryBackend::with_data(bytes.clone());

        let (mut log, records) = RecordLog::open_read_only(Box::new(backend.clone())).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(log.torn_bytes(), RECORD_MAGIC.len() as u64);
        assert!(log.is_read_only());
        assert!(matches!(
            log.append(RecordKind::Purge, b""),
            Err(StoreError::ReadOnly)
        ));
        assert_eq!(backend.data(), bytes);
    }
}
