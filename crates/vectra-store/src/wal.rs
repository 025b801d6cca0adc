//! Write-ahead log: append-only, CRC-footer verifiable, with replay-on-open
//! semantics and truncation after a successful snapshot.
//!
//! Segment layout: header `{MAGIC: "VLWA", VERSION: 1}` followed by records
//! `{type u8, reserved u8, id u32, metaLen u32, vecLen u32, metaBytes,
//! vecBytes}`. Multiple header+body blocks concatenate into one logical
//! stream: after consuming a record we re-enter header parsing if the next
//! 8 bytes match MAGIC+VERSION, which lets independently-appended WAL
//! segments be replayed as a single pass. An optional 8-byte footer
//! `{MAGIC: "WCRC", CRC32}` covers the body preceding it.

use byteorder::{ByteOrder, LittleEndian};
use std::sync::Arc;

use crate::blobstore::BlobStore;
use crate::codec::{read_u32, read_u8, write_u32, write_u8};
use crate::core_store::CoreStore;
use crate::error::StoreError;

mod magic {
    pub const VLWA: u32 = u32::from_le_bytes(*b"VLWA");
    pub const WCRC: u32 = u32::from_le_bytes(*b"WCRC");
}

pub const WAL_VERSION: u32 = 1;

const TYPE_UPSERT: u8 = 0;
const TYPE_REMOVE: u8 = 1;
const TYPE_SET_META: u8 = 2;

#[derive(Debug, Clone)]
pub enum WalRecord {
    Upsert {
        id: u32,
        vector: Vec<f32>,
        meta: Option<Vec<u8>>,
    },
    Remove {
        id: u32,
    },
    SetMeta {
        id: u32,
        meta: Option<Vec<u8>>,
    },
}

impl WalRecord {
    fn encode(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        match self {
            WalRecord::Upsert { id, vector, meta } => {
                write_u8(out, TYPE_UPSERT)?;
                write_u8(out, 0)?;
                write_u32(out, *id)?;
                let meta_bytes = meta.clone().unwrap_or_default();
                write_u32(out, meta_bytes.len() as u32)?;
                write_u32(out, (vector.len() * 4) as u32)?;
                out.extend_from_slice(&meta_bytes);
                for f in vector {
                    out.extend_from_slice(&f.to_le_bytes());
                }
                Ok(())
            }
            WalRecord::Remove { id } => {
                write_u8(out, TYPE_REMOVE)?;
                write_u8(out, 0)?;
                write_u32(out, *id)?;
                write_u32(out, 0)?;
                write_u32(out, 0)?;
                Ok(())
            }
            WalRecord::SetMeta { id, meta } => {
                write_u8(out, TYPE_SET_META)?;
                write_u8(out, 0)?;
                write_u32(out, *id)?;
                let meta_bytes = meta.clone().unwrap_or_default();
                write_u32(out, meta_bytes.len() as u32)?;
                write_u32(out, 0)?;
                out.extend_from_slice(&meta_bytes);
                Ok(())
            }
        }
    }
}

/// Outcome of [`replay_into`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
}

/// Outcome of [`verify`].
#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub ok: bool,
    pub error: Option<String>,
    pub checksum: Option<u32>,
}

/// Encodes a batch of records as one header+body WAL segment, optionally
/// followed by a CRC footer over the body.
pub fn encode_segment(records: &[WalRecord], with_footer: bool) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    for r in records {
        r.encode(&mut body)?;
    }

    let mut out = Vec::with_capacity(8 + body.len() + 8);
    write_u32(&mut out, magic::VLWA)?;
    write_u32(&mut out, WAL_VERSION)?;
    out.extend_from_slice(&body);

    if with_footer {
        let crc = crc32fast::hash(&body);
        write_u32(&mut out, magic::WCRC)?;
        write_u32(&mut out, crc)?;
    }
    Ok(out)
}

/// Parses every record across possibly-concatenated segments and applies
/// them, in order, to `state`. A missing/empty stream applies zero records.
/// A structurally malformed record stops replay at that point without
/// erroring; corruption detection is `verify`'s job, per the WAL's
/// idempotent-apply contract.
pub fn replay_into(bytes: &[u8], state: &mut CoreStore) -> ReplayStats {
    let mut stats = ReplayStats::default();
    let mut cursor = bytes;

    loop {
        if cursor.len() < 8 {
            break;
        }
        let magic = LittleEndian::read_u32(&cursor[0..4]);
        if magic != magic::VLWA {
            break;
        }
        let version = LittleEndian::read_u32(&cursor[4..8]);
        if version != WAL_VERSION {
            break;
        }
        cursor = &cursor[8..];

        loop {
            if cursor.len() >= 8 && LittleEndian::read_u32(&cursor[0..4]) == magic::WCRC {
                cursor = &cursor[8..];
                continue;
            }
            if cursor.len() >= 8 && LittleEndian::read_u32(&cursor[0..4]) == magic::VLWA {
                break; // next segment header
            }
            match parse_record(cursor) {
                Some((record, rest)) => {
                    cursor = rest;
                    if apply_record(state, record).is_ok() {
                        stats.applied += 1;
                    } else {
                        tracing::warn!(skipped = stats.skipped + 1, "wal record failed to apply");
                        stats.skipped += 1;
                    }
                }
                None => {
                    if !cursor.is_empty() {
                        tracing::warn!(remaining = cursor.len(), "wal replay stopped on malformed record tail");
                    }
                    tracing::info!(applied = stats.applied, skipped = stats.skipped, "wal replay finished");
                    return stats;
                }
            }
        }
    }

    tracing::info!(applied = stats.applied, skipped = stats.skipped, "wal replay finished");
    stats
}

fn parse_record(buf: &[u8]) -> Option<(WalRecord, &[u8])> {
    if buf.len() < 2 + 4 + 4 + 4 {
        return None;
    }
    let mut r = buf;
    let ty = read_u8(&mut r).ok()?;
    let _reserved = read_u8(&mut r).ok()?;
    let id = read_u32(&mut r).ok()?;
    let meta_len = read_u32(&mut r).ok()? as usize;
    let vec_len = read_u32(&mut r).ok()? as usize;

    if r.len() < meta_len + vec_len {
        return None;
    }
    let meta_bytes = &r[..meta_len];
    let meta = if meta_bytes.is_empty() {
        None
    } else {
        Some(meta_bytes.to_vec())
    };
    let vec_bytes = &r[meta_len..meta_len + vec_len];
    let rest = &r[meta_len + vec_len..];

    let record = match ty {
        TYPE_UPSERT => {
            let n = vec_len / 4;
            let mut vector = Vec::with_capacity(n);
            for i in 0..n {
                vector.push(LittleEndian::read_f32(&vec_bytes[i * 4..i * 4 + 4]));
            }
            WalRecord::Upsert { id, vector, meta }
        }
        TYPE_REMOVE => WalRecord::Remove { id },
        TYPE_SET_META => WalRecord::SetMeta { id, meta },
        _ => return None,
    };
    Some((record, rest))
}

fn apply_record(state: &mut CoreStore, record: WalRecord) -> Result<(), StoreError> {
    match record {
        WalRecord::Upsert { id, vector, meta } => {
            state.insert_or_update(id, &vector, meta, true)?;
            Ok(())
        }
        WalRecord::Remove { id } => {
            state.remove_by_id(id);
            Ok(())
        }
        WalRecord::SetMeta { id, meta } => state.update_meta(id, meta),
    }
}

/// Structurally decodes `bytes` and, if a footer is present, recomputes the
/// CRC32 over the preceding body and compares.
pub fn verify(bytes: &[u8]) -> VerifyResult {
    if bytes.is_empty() {
        return VerifyResult {
            ok: true,
            error: None,
            checksum: None,
        };
    }
    if bytes.len() < 8 {
        return VerifyResult {
            ok: false,
            error: Some("truncated header".to_string()),
            checksum: None,
        };
    }
    let magic = LittleEndian::read_u32(&bytes[0..4]);
    if magic != magic::VLWA {
        return VerifyResult {
            ok: false,
            error: Some("bad magic".to_string()),
            checksum: None,
        };
    }

    let footer_start = bytes.len().saturating_sub(8);
    if footer_start >= 8 {
        let maybe_magic = LittleEndian::read_u32(&bytes[footer_start..footer_start + 4]);
        if maybe_magic == magic::WCRC {
            let stored_crc = LittleEndian::read_u32(&bytes[footer_start + 4..footer_start + 8]);
            let body = &bytes[8..footer_start];
            let computed = crc32fast::hash(body);
            if computed != stored_crc {
                return VerifyResult {
                    ok: false,
                    error: Some("crc mismatch".to_string()),
                    checksum: Some(computed),
                };
            }
            return VerifyResult {
                ok: true,
                error: None,
                checksum: Some(computed),
            };
        }
    }

    VerifyResult {
        ok: true,
        error: None,
        checksum: None,
    }
}

/// WAL bound to a path in some blob store. Write paths call `append` after
/// every mutating operation, under the single-writer lock; the indexing
/// manager calls `truncate` in the same exclusive section as a successful
/// save.
pub struct WalRuntime {
    store: Arc<dyn BlobStore>,
    path: String,
    with_footer: bool,
}

impl WalRuntime {
    pub fn new(store: Arc<dyn BlobStore>, path: impl Into<String>, with_footer: bool) -> Self {
        Self {
            store,
            path: path.into(),
            with_footer,
        }
    }

    pub fn append(&self, records: &[WalRecord]) -> Result<(), StoreError> {
        let bytes = encode_segment(records, self.with_footer)?;
        self.store.append(&self.path, &bytes)
    }

    /// Reads the entire file and applies records in order. A missing file
    /// applies zero records.
    pub fn replay_into(&self, state: &mut CoreStore) -> Result<ReplayStats, StoreError> {
        match self.store.read(&self.path) {
            Ok(bytes) => Ok(replay_into(&bytes, state)),
            Err(StoreError::NotFound(_)) => Ok(ReplayStats::default()),
            Err(e) => Err(e),
        }
    }

    pub fn verify(&self) -> Result<VerifyResult, StoreError> {
        match self.store.read(&self.path) {
            Ok(bytes) => Ok(verify(&bytes)),
            Err(StoreError::NotFound(_)) => Ok(VerifyResult {
                ok: true,
                error: None,
                checksum: None,
            }),
            Err(e) => Err(e),
        }
    }

    pub fn truncate(&self) -> Result<(), StoreError> {
        self.store.atomic_write(&self.path, &[])
    }
}
