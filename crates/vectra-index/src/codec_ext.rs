//! Small binary helpers for the HNSW/IVF serialization formats, which live
//! in this crate rather than `vectra-store` since they encode
//! strategy-internal state, not a wire format the store layer knows about.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

pub fn write_block(out: &mut Vec<u8>, bytes: &[u8]) {
    out.write_u32::<LittleEndian>(bytes.len() as u32)
        .expect("writing to a Vec never fails");
    out.extend_from_slice(bytes);
}

pub fn read_block(r: &mut &[u8]) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if r.len() < len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated block"));
    }
    let (block, rest) = r.split_at(len);
    *r = rest;
    Ok(block.to_vec())
}

pub fn write_u32_vec(out: &mut Vec<u8>, values: &[u32]) {
    for v in values {
        out.write_u32::<LittleEndian>(*v).expect("writing to a Vec never fails");
    }
}

pub fn read_u32_vec(r: &mut &[u8], count: usize) -> io::Result<Vec<u32>> {
    let mut v = Vec::with_capacity(count);
    for _ in 0..count {
        v.push(r.read_u32::<LittleEndian>()?);
    }
    Ok(v)
}
