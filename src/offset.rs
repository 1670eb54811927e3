//! Segment-relative offsets.
//!
//! Every process maps the segment at its own base address, so nothing stored
//! inside the segment is a pointer. [`Offset`] is the persisted form; a local
//! pointer exists only transiently and only through a [`MapBase`].

use std::fmt;

/// Byte distance from the start of the segment. `0` is the null offset
/// (the program-break header lives there, so no payload can start at 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(u64);

impl Offset {
    pub const NULL: Offset = Offset(0);

    #[inline]
    pub const fn new(off: u64) -> Self {
        Self(off)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Directory slots store offsets as i64 (negative values are sentinels).
    #[inline]
    pub fn from_slot(raw: i64) -> Option<Self> {
        if raw > 0 {
            Some(Self(raw as u64))
        } else {
            None
        }
    }

    #[inline]
    pub fn to_slot(self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:#x}", self.0)
    }
}

/// Local base address of one mapping. Valid only inside the process (and the
/// lifetime of the mapping) that produced it.
#[derive(Debug, Clone, Copy)]
pub struct MapBase {
    base: *const u8,
    len: usize,
}

impl MapBase {
    pub(crate) fn new(base: *const u8, len: usize) -> Self {
        Self { base, len }
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.base
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Local address of `off`, or None if it falls outside the mapping.
    pub fn to_ptr(&self, off: Offset) -> Option<*const u8> {
        if off.as_usize() < self.len {
            // SAFETY: off < len, the result stays inside the mapping.
            Some(unsafe { self.base.add(off.as_usize()) })
        } else {
            None
        }
    }

    /// Inverse of [`to_ptr`](Self::to_ptr). Pointers outside the mapping give None.
    pub fn to_offset(&self, ptr: *const u8) -> Option<Offset> {
        let p = ptr as usize;
        let b = self.base as usize;
        if p >= b && p < b + self.len {
            Some(Offset::new((p - b) as u64))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_encoding_rejects_sentinels() {
        assert_eq!(Offset::from_slot(0), None);
        assert_eq!(Offset::from_slot(-1), None);
        assert_eq!(Offset::from_slot(48), Some(Offset::new(48)));
        assert_eq!(Offset::new(4096).to_slot(), 4096);
    }

    #[test]
    fn base_conversion_is_relative() {
        let buf = vec![0u8; 256];
        let a = MapBase::new(buf.as_ptr(), buf.len());
        let p = a.to_ptr(Offset::new(100)).expect("inside");
        assert_eq!(a.to_offset(p), Some(Offset::new(100)));
        assert!(a.to_ptr(Offset::new(256)).is_none());

        // другая "проекция" того же смещения даёт другой адрес, но то же смещение
        let other = vec![0u8; 256];
        let b = MapBase::new(other.as_ptr(), other.len());
        let q = b.to_ptr(Offset::new(100)).expect("inside");
        assert_ne!(p, q);
        assert_eq!(b.to_offset(q), Some(Offset::new(100)));
        assert!(b.to_offset(p).is_none());
    }
}
