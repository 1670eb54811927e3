//! Record codec: one `{key, value}` pair per allocator block.
//!
//! Layout (LE): [klen u32][key][vlen u32][value]
//!
//! Blocks are rounded up, so a payload may carry trailing slack after the
//! value; decode ignores it.

use byteorder::{ByteOrder, LittleEndian};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[inline]
pub fn encoded_len(key: &[u8], value: &[u8]) -> usize {
    4 + key.len() + 4 + value.len()
}

pub fn encode(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; encoded_len(key, value)];
    encode_into(&mut out, key, value);
    out
}

/// Both lengths fit the u32 prefixes.
#[inline]
pub fn fits(key_len: usize, value_len: usize) -> bool {
    u32::try_from(key_len).is_ok() && u32::try_from(value_len).is_ok()
}

/// Write into `dst` (must be at least `encoded_len` bytes; lengths must pass `fits`).
pub fn encode_into(dst: &mut [u8], key: &[u8], value: &[u8]) {
    debug_assert!(fits(key.len(), value.len()));
    let k = key.len();
    LittleEndian::write_u32(&mut dst[0..4], k as u32);
    dst[4..4 + k].copy_from_slice(key);
    LittleEndian::write_u32(&mut dst[4 + k..8 + k], value.len() as u32);
    dst[8 + k..8 + k + value.len()].copy_from_slice(value);
}

/// Borrowing decode. None if the lengths run past the buffer.
pub fn decode(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    if buf.len() < 4 {
        return None;
    }
    let klen = LittleEndian::read_u32(&buf[0..4]) as usize;
    let vpos = 4usize.checked_add(klen)?;
    if vpos + 4 > buf.len() {
        return None;
    }
    let vlen = LittleEndian::read_u32(&buf[vpos..vpos + 4]) as usize;
    let end = (vpos + 4).checked_add(vlen)?;
    if end > buf.len() {
        return None;
    }
    Some((&buf[4..vpos], &buf[vpos + 4..end]))
}

/// Only the key: the value length is not read. Used by probe loops.
pub fn decode_key(buf: &[u8]) -> Option<&[u8]> {
    if buf.len() < 4 {
        return None;
    }
    let klen = LittleEndian::read_u32(&buf[0..4]) as usize;
    let end = 4usize.checked_add(klen)?;
    if end > buf.len() {
        return None;
    }
    Some(&buf[4..end])
}

impl Record {
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        decode(buf).map(|(k, v)| Record {
            key: k.to_vec(),
            value: v.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&self.key, &self.value)
    }
}
