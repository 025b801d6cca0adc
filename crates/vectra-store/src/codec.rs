//! Little-endian binary codec primitives shared by every on-disk format:
//! data segments, the index file, the WAL, and the legacy snapshot.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::StoreError;

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_u8(v)
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_u32::<LittleEndian>(v)
}

pub fn write_f32<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_f32::<LittleEndian>(v)
}

/// Writes a `u32` length prefix followed by the bytes themselves.
pub fn write_block<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_u32(w, bytes.len() as u32)?;
    w.write_all(bytes)
}

/// Writes a dense `f32` slice with no length prefix (caller already knows
/// the count from `dim`/header fields).
pub fn write_f32_slice<W: Write>(w: &mut W, v: &[f32]) -> io::Result<()> {
    for x in v {
        write_f32(w, *x)?;
    }
    Ok(())
}

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    r.read_u8()
}

pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    r.read_u32::<LittleEndian>()
}

pub fn read_f32<R: Read>(r: &mut R) -> io::Result<f32> {
    r.read_f32::<LittleEndian>()
}

/// Reads a `u32` length prefix followed by that many bytes.
pub fn read_block<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_f32_vec<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<f32>> {
    let mut v = Vec::with_capacity(count);
    for _ in 0..count {
        v.push(read_f32(r)?);
    }
    Ok(v)
}

/// Asserts that a decoded 4-byte magic matches `expected`, returning a
/// [`StoreError::FormatError`] otherwise. `expected` and `found` are both
/// rendered as ASCII for diagnostics, falling back to a hex dump for
/// non-printable bytes.
pub fn check_magic(found: u32, expected: u32, what: &str) -> Result<(), StoreError> {
    if found != expected {
        return Err(StoreError::FormatError(format!(
            "{what}: bad magic 0x{found:08x}, expected 0x{expected:08x}"
        )));
    }
    Ok(())
}

pub fn check_version(found: u32, expected: u32, what: &str) -> Result<(), StoreError> {
    if found != expected {
        return Err(StoreError::FormatError(format!(
            "{what}: unsupported version {found}, expected {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn block_roundtrip() {
        let mut buf = Vec::new();
        write_block(&mut buf, b"hello").unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(read_block(&mut cur).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn f32_vec_roundtrip() {
        let mut buf = Vec::new();
        let data = vec![1.0f32, -2.5, 3.25];
        write_f32_slice(&mut buf, &data).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(read_f32_vec(&mut cur, 3).unwrap(), data);
    }

    #[test]
    fn magic_mismatch_errors() {
        assert!(check_magic(1, 2, "test").is_err());
        assert!(check_magic(2, 2, "test").is_ok());
    }
}
