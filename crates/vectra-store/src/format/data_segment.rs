//! Data segment format (`VLDT`, v1): an immutable, append-in-insertion-order
//! sequence of `(id, meta, vector)` rows produced by the segmenter and
//! consumed when rehydrating a store on open/rebuild.

use crate::codec::{
    check_magic, check_version, read_block, read_u32, read_f32_vec, write_block, write_f32_slice,
    write_u32,
};
use crate::error::StoreError;

const MAGIC: u32 = u32::from_le_bytes(*b"VLDT");
const VERSION: u32 = 1;

/// A single decoded row plus its byte offset/length within the segment, so
/// the index file can point straight back into it.
#[derive(Debug, Clone)]
pub struct SegmentRow {
    pub id: u32,
    pub meta: Option<Vec<u8>>,
    pub vector: Vec<f32>,
    pub offset: u32,
    pub length: u32,
}

/// Encodes `rows` (id, meta, vector) as a complete data segment.
pub fn encode(rows: &[(u32, Option<Vec<u8>>, Vec<f32>)]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    write_u32(&mut out, MAGIC)?;
    write_u32(&mut out, VERSION)?;
    for (id, meta, vector) in rows {
        write_u32(&mut out, *id)?;
        let meta_bytes = meta.clone().unwrap_or_default();
        write_block(&mut out, &meta_bytes)?;
        write_u32(&mut out, (vector.len() * 4) as u32)?;
        write_f32_slice(&mut out, vector)?;
    }
    Ok(out)
}

/// Decodes a data segment, returning every row with its byte range so
/// callers can build index-file entry pointers.
pub fn decode(bytes: &[u8]) -> Result<Vec<SegmentRow>, StoreError> {
    let mut r = bytes;
    let magic = read_u32(&mut r)?;
    check_magic(magic, MAGIC, "data segment")?;
    let version = read_u32(&mut r)?;
    check_version(version, VERSION, "data segment")?;

    let mut rows = Vec::new();
    while !r.is_empty() {
        let offset = (bytes.len() - r.len()) as u32;
        let id = read_u32(&mut r)?;
        let meta_bytes = read_block(&mut r)?;
        let vec_len = read_u32(&mut r)? as usize;
        let vector = read_f32_vec(&mut r, vec_len / 4)?;
        let length = (bytes.len() as u32 - r.len() as u32) - offset;
        let meta = if meta_bytes.is_empty() {
            None
        } else {
            Some(meta_bytes)
        };
        rows.push(SegmentRow {
            id,
            meta,
            vector,
            offset,
            length,
        });
    }
    Ok(rows)
}

/// Reads a single row at `offset..offset+length` without decoding the
/// whole segment, used by the indexing manager to materialize one entry at
/// a time during open.
pub fn decode_row_at(bytes: &[u8], offset: u32, length: u32) -> Result<SegmentRow, StoreError> {
    let slice = &bytes[offset as usize..(offset + length) as usize];
    let mut r = slice;
    let id = read_u32(&mut r)?;
    let meta_bytes = read_block(&mut r)?;
    let vec_len = read_u32(&mut r)? as usize;
    let vector = read_f32_vec(&mut r, vec_len / 4)?;
    let meta = if meta_bytes.is_empty() {
        None
    } else {
        Some(meta_bytes)
    };
    Ok(SegmentRow {
        id,
        meta,
        vector,
        offset,
        length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_rows() {
        let rows = vec![
            (1u32, Some(b"{}".to_vec()), vec![1.0f32, 2.0, 3.0]),
            (2u32, None, vec![4.0f32, 5.0, 6.0]),
        ];
        let bytes = encode(&rows).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].id, 1);
        assert_eq!(decoded[0].vector, vec![1.0, 2.0, 3.0]);
        assert_eq!(decoded[1].meta, None);
    }

    #[test]
    fn decode_row_at_matches_full_decode() {
        let rows = vec![
            (1u32, Some(b"a".to_vec()), vec![1.0f32, 2.0]),
            (2u32, Some(b"bb".to_vec()), vec![3.0f32, 4.0]),
        ];
        let bytes = encode(&rows).unwrap();
        let decoded = decode(&bytes).unwrap();
        for row in &decoded {
            let single = decode_row_at(&bytes, row.offset, row.length).unwrap();
            assert_eq!(single.id, row.id);
            assert_eq!(single.vector, row.vector);
        }
    }

    #[test]
    fn bad_magic_is_format_error() {
        let mut bytes = encode(&[(1, None, vec![1.0])]).unwrap();
        bytes[0] ^= 0xFF;
        assert!(decode(&bytes).is_err());
    }
}
