//! On-disk file format.
//!
//! The whole store is a single file:
//!
//! ```text
//! magic (8) | version (2, LE) | bucket count (4, LE)
//! per bucket:
//!   path len (4, LE) | path bytes (UTF-8)
//!   entry count (8, LE)
//!   per entry: key len (4, LE) | key | value len (4, LE) | value
//! crc32 (4, LE) over everything before it
//! ```
//!
//! Commits write the encoding to `<path>.tmp`, sync, then rename over
//! the live file, so a crash mid-commit leaves the previous file intact.

use crate::error::{StorageError, StorageResult};
use crate::snapshot::{BucketMap, Snapshot};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const MAGIC: &[u8; 8] = b"ROOSTKV\0";
const VERSION: u16 = 1;

/// Encodes a snapshot into the file format, checksum included.
pub(crate) fn encode_snapshot(snapshot: &Snapshot) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());

    let count = snapshot.iter().count() as u32;
    buf.extend_from_slice(&count.to_le_bytes());

    for (path, map) in snapshot.iter() {
        buf.extend_from_slice(&(path.len() as u32).to_le_bytes());
        buf.extend_from_slice(path.as_bytes());
        buf.extend_from_slice(&(map.len() as u64).to_le_bytes());
        for (key, value) in map.iter() {
            buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
            buf.extend_from_slice(key);
            buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
            buf.extend_from_slice(value);
        }
    }

    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Decodes a snapshot from file bytes, verifying magic, version and
/// checksum.
pub(crate) fn decode_snapshot(data: &[u8]) -> StorageResult<Snapshot> {
    let mut r = Reader::new(data);

    let magic = r.bytes(MAGIC.len())?;
    if magic != MAGIC {
        return Err(StorageError::Corrupted("bad magic".into()));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(StorageError::Corrupted(format!(
            "unsupported format version {version}"
        )));
    }

    if data.len() < 4 {
        return Err(StorageError::Corrupted("file truncated".into()));
    }
    let body_len = data.len() - 4;
    let stored_crc = u32::from_le_bytes([
        data[body_len],
        data[body_len + 1],
        data[body_len + 2],
        data[body_len + 3],
    ]);
    let computed_crc = compute_crc32(&data[..body_len]);
    if stored_crc != computed_crc {
        return Err(StorageError::Corrupted(format!(
            "checksum mismatch: expected {stored_crc:08x}, got {computed_crc:08x}"
        )));
    }

    let mut snapshot = Snapshot::default();
    let bucket_count = r.u32()?;
    for _ in 0..bucket_count {
        let path_len = r.u32()? as usize;
        let path = String::from_utf8(r.bytes(path_len)?.to_vec())
            .map_err(|_| StorageError::Corrupted("bucket path is not UTF-8".into()))?;
        let entry_count = r.u64()?;
        let mut map: BucketMap = BTreeMap::new();
        for _ in 0..entry_count {
            let key_len = r.u32()? as usize;
            let key = r.bytes(key_len)?.to_vec();
            let value_len = r.u32()? as usize;
            let value = r.bytes(value_len)?.to_vec();
            map.insert(key, value);
        }
        snapshot.insert_bucket(path, map);
    }

    Ok(snapshot)
}

/// Writes the snapshot to `path` atomically: temp file, sync, rename.
pub(crate) fn write_snapshot(path: &Path, snapshot: &Snapshot) -> StorageResult<()> {
    let data = encode_snapshot(snapshot);
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        use std::io::Write;
        file.write_all(&data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads and decodes the snapshot at `path`; an absent or empty file is
/// an empty store.
pub(crate) fn read_snapshot(path: &Path) -> StorageResult<Snapshot> {
    if !path.exists() {
        return Ok(Snapshot::default());
    }
    let data = fs::read(path)?;
    if data.is_empty() {
        return Ok(Snapshot::default());
    }
    decode_snapshot(&data)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> StorageResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| StorageError::Corrupted("file truncated".into()))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> StorageResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> StorageResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> StorageResult<u64> {
        let b = self.bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

/// Computes a CRC32 checksum (IEEE polynomial).
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
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
