//! Table operations.
//!
//! Probing: home slot `slot_index(key)`, then `next_slot` (linear, wraps).
//! - Empty ends a negative search.
//! - Tombstone is passed over; insert reuses the first one it saw only after
//!   the whole chain proved the key absent.
//! - Live slots are decoded and compared by full key.
//!
//! Every probe loop is bounded by table_size, so a directory full of
//! tombstones cannot spin forever.

use log::{debug, warn};
use serde::Serialize;

use crate::alloc::Allocator;
use crate::consts::{REHASH_GROWTH, REHASH_LOAD_FACTOR, REHASH_MIN_LOAD_FACTOR, SLOT_SIZE};
use crate::error::{Result, ShmError};
use crate::hash::{next_slot, slot_index};
use crate::metrics::record_rehash;
use crate::offset::Offset;
use crate::record::{self, Record};

use super::header::{hash_header_read, hash_header_write, read_slot, write_slot, HashHeader, Slot};
use super::SharedHash;

/// Directory health, as seen by one full scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableStats {
    pub table_size: u64,
    pub count: u64,
    pub live_slots: u64,
    pub tombstones: u64,
    pub load_factor: f64,
    /// Longest distance from home slot among live entries.
    pub max_probe: u64,
    pub record_bytes: u64,
}

/// Payload of a live record; a slot that points at anything else is heap damage.
fn live_payload(alloc: &Allocator, off: Offset) -> Result<&[u8]> {
    alloc.payload_nolock(off).map_err(|e| match e {
        ShmError::InvalidOffset(p) => ShmError::CorruptBlock { offset: p, size: 0 },
        other => other,
    })
}

fn key_at(alloc: &Allocator, off: Offset) -> Result<&[u8]> {
    let buf = live_payload(alloc, off)?;
    record::decode_key(buf).ok_or(ShmError::CorruptBlock {
        offset: off.get(),
        size: buf.len() as u64,
    })
}

fn decode_at(alloc: &Allocator, off: Offset) -> Result<(&[u8], &[u8])> {
    let buf = live_payload(alloc, off)?;
    record::decode(buf).ok_or(ShmError::CorruptBlock {
        offset: off.get(),
        size: buf.len() as u64,
    })
}

impl SharedHash {
    // -------- header helpers --------

    fn header(&self, alloc: &Allocator) -> Result<HashHeader> {
        hash_header_read(alloc.bytes(), self.hdr)
    }

    fn store_header(&self, alloc: &mut Allocator, h: &HashHeader) {
        hash_header_write(alloc.bytes_mut(), self.hdr, h);
    }

    // -------- lookups (shared lock) --------

    /// Slot index and decoded record of `key`, if present.
    pub fn find(&self, alloc: &Allocator, key: &[u8]) -> Result<Option<(usize, Record)>> {
        let _g = alloc.lock_shared()?;
        self.find_nolock(alloc, key)
    }

    /// Stored value or `default`.
    pub fn value(&self, alloc: &Allocator, key: &[u8], default: &[u8]) -> Result<Vec<u8>> {
        Ok(self
            .find(alloc, key)?
            .map(|(_, r)| r.value)
            .unwrap_or_else(|| default.to_vec()))
    }

    pub fn get(&self, alloc: &Allocator, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.find(alloc, key)?.map(|(_, r)| r.value))
    }

    pub fn contains(&self, alloc: &Allocator, key: &[u8]) -> Result<bool> {
        Ok(self.find(alloc, key)?.is_some())
    }

    pub fn count(&self, alloc: &Allocator) -> Result<usize> {
        let _g = alloc.lock_shared()?;
        Ok(self.header(alloc)?.count as usize)
    }

    pub fn table_size(&self, alloc: &Allocator) -> Result<usize> {
        let _g = alloc.lock_shared()?;
        Ok(self.header(alloc)?.table_size as usize)
    }

    /// count / table_size.
    pub fn load_factor(&self, alloc: &Allocator) -> Result<f64> {
        let _g = alloc.lock_shared()?;
        let h = self.header(alloc)?;
        Ok(load_factor(&h))
    }

    /// Snapshot of all live records, in directory order.
    pub fn entries(&self, alloc: &Allocator) -> Result<Vec<Record>> {
        let _g = alloc.lock_shared()?;
        let h = self.header(alloc)?;
        let mut out = Vec::with_capacity(h.count as usize);
        for i in 0..h.table_size as usize {
            if let Slot::Live(off) = read_slot(alloc.bytes(), h.dir, i) {
                let (k, v) = decode_at(alloc, off)?;
                out.push(Record {
                    key: k.to_vec(),
                    value: v.to_vec(),
                });
            }
        }
        Ok(out)
    }

    pub fn keys(&self, alloc: &Allocator) -> Result<Vec<Vec<u8>>> {
        Ok(self.entries(alloc)?.into_iter().map(|r| r.key).collect())
    }

    pub fn stats(&self, alloc: &Allocator) -> Result<TableStats> {
        let _g = alloc.lock_shared()?;
        let h = self.header(alloc)?;
        let ts = h.table_size as usize;
        let mut s = TableStats {
            table_size: h.table_size,
            count: h.count,
            load_factor: load_factor(&h),
            ..Default::default()
        };
        for i in 0..ts {
            match read_slot(alloc.bytes(), h.dir, i) {
                Slot::Empty => {}
                Slot::Tombstone => s.tombstones += 1,
                Slot::Live(off) => {
                    let (k, v) = decode_at(alloc, off)?;
                    let home = slot_index(k, ts);
                    let dist = if i >= home { i - home } else { ts - home + i };
                    s.live_slots += 1;
                    s.max_probe = s.max_probe.max(dist as u64);
                    s.record_bytes += record::encoded_len(k, v) as u64;
                }
            }
        }
        Ok(s)
    }

    // -------- mutations (exclusive lock) --------

    /// Insert or overwrite. Ok(false) for an empty key; allocation failure is
    /// an error and leaves the table exactly as it was.
    pub fn insert(&self, alloc: &mut Allocator, key: &[u8], value: &[u8]) -> Result<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        if !record::fits(key.len(), value.len()) {
            return Err(ShmError::RecordTooLarge {
                key: key.len(),
                value: value.len(),
            });
        }
        let _g = alloc.lock_exclusive()?;
        let h = self.insert_nolock(alloc, key, value)?;

        // запись уже на месте и посчитана: неудачный rehash её не отменяет,
        // таблица просто остаётся плотной
        if load_factor(&h) > REHASH_LOAD_FACTOR {
            if let Err(e) = self.rehash_nolock(alloc) {
                warn!("rehash skipped in '{}': {}", alloc.name(), e);
            }
        }
        Ok(true)
    }

    /// Remove `key` and return its value, or `default` if absent.
    pub fn take(&self, alloc: &mut Allocator, key: &[u8], default: &[u8]) -> Result<Vec<u8>> {
        let _g = alloc.lock_exclusive()?;
        Ok(self
            .take_nolock(alloc, key)?
            .unwrap_or_else(|| default.to_vec()))
    }

    /// Remove `key` and return its value, None if absent.
    pub fn take_entry(&self, alloc: &mut Allocator, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let _g = alloc.lock_exclusive()?;
        self.take_nolock(alloc, key)
    }

    /// Remove `key`; true if something was removed.
    pub fn remove(&self, alloc: &mut Allocator, key: &[u8]) -> Result<bool> {
        let _g = alloc.lock_exclusive()?;
        Ok(self.take_nolock(alloc, key)?.is_some())
    }

    /// Free every record and reset every slot to never-used.
    pub fn clear(&self, alloc: &mut Allocator) -> Result<()> {
        let _g = alloc.lock_exclusive()?;
        let mut h = self.header(alloc)?;
        let ts = h.table_size as usize;

        // сначала проверяем все записи: битая куча — отказ без единого изменения
        for i in 0..ts {
            if let Slot::Live(off) = read_slot(alloc.bytes(), h.dir, i) {
                live_payload(alloc, off)?;
            }
        }

        for i in 0..ts {
            if let Slot::Live(off) = read_slot(alloc.bytes(), h.dir, i) {
                if let Err(e) = alloc.free_nolock(off) {
                    // count должен совпадать с числом живых слотов
                    self.store_header(alloc, &h);
                    return Err(e);
                }
                h.count = h.count.saturating_sub(1);
            }
            write_slot(alloc.bytes_mut(), h.dir, i, Slot::Empty);
        }
        h.count = 0;
        self.store_header(alloc, &h);
        Ok(())
    }

    /// Grow the directory ×4 and redistribute. Ok(false) when the load is
    /// below the shrink floor and nothing was done.
    pub fn rehash(&self, alloc: &mut Allocator) -> Result<bool> {
        let _g = alloc.lock_exclusive()?;
        self.rehash_nolock(alloc)
    }

    // -------- internals (caller holds the lock) --------

    fn find_nolock(&self, alloc: &Allocator, key: &[u8]) -> Result<Option<(usize, Record)>> {
        if key.is_empty() {
            return Ok(None);
        }
        let h = self.header(alloc)?;
        let ts = h.table_size as usize;
        let mut idx = slot_index(key, ts);
        for _ in 0..ts {
            match read_slot(alloc.bytes(), h.dir, idx) {
                Slot::Empty => return Ok(None),
                Slot::Tombstone => {}
                Slot::Live(off) => {
                    let (k, v) = decode_at(alloc, off)?;
                    if k == key {
                        return Ok(Some((
                            idx,
                            Record {
                                key: k.to_vec(),
                                value: v.to_vec(),
                            },
                        )));
                    }
                }
            }
            idx = next_slot(idx, ts);
        }
        Ok(None)
    }

    /// Returns the header as stored after the insert.
    fn insert_nolock(&self, alloc: &mut Allocator, key: &[u8], value: &[u8]) -> Result<HashHeader> {
        let mut h = self.header(alloc)?;
        let ts = h.table_size as usize;

        // Ищем ключ по всей цепочке; запоминаем первый tombstone.
        let mut idx = slot_index(key, ts);
        let mut first_tomb: Option<usize> = None;
        let mut empty: Option<usize> = None;
        let mut existing: Option<(usize, Offset)> = None;
        for _ in 0..ts {
            match read_slot(alloc.bytes(), h.dir, idx) {
                Slot::Empty => {
                    empty = Some(idx);
                    break;
                }
                Slot::Tombstone => {
                    if first_tomb.is_none() {
                        first_tomb = Some(idx);
                    }
                }
                Slot::Live(off) => {
                    if key_at(alloc, off)? == key {
                        existing = Some((idx, off));
                        break;
                    }
                }
            }
            idx = next_slot(idx, ts);
        }

        let target = match existing {
            Some((i, _)) => i,
            None => first_tomb.or(empty).ok_or(ShmError::TableFull)?,
        };

        // Новая запись пишется до освобождения старой: при нехватке места
        // таблица не меняется.
        let len = record::encoded_len(key, value);
        let off = alloc.malloc_nolock(len)?;
        record::encode_into(alloc.payload_mut_nolock(off)?, key, value);
        write_slot(alloc.bytes_mut(), h.dir, target, Slot::Live(off));

        match existing {
            Some((_, old)) => {
                // слот уже указывает на новую запись; старый блок проверен при поиске
                if let Err(e) = alloc.free_nolock(old) {
                    warn!("overwrite in '{}' leaked old record: {}", alloc.name(), e);
                }
            }
            None => {
                h.count += 1;
                self.store_header(alloc, &h);
            }
        }
        Ok(h)
    }

    fn take_nolock(&self, alloc: &mut Allocator, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some((idx, rec)) = self.find_nolock(alloc, key)? else {
            return Ok(None);
        };
        let mut h = self.header(alloc)?;
        if let Slot::Live(off) = read_slot(alloc.bytes(), h.dir, idx) {
            alloc.free_nolock(off)?;
        }
        // именно tombstone, не Empty: цепочки через этот слот должны остаться целыми
        write_slot(alloc.bytes_mut(), h.dir, idx, Slot::Tombstone);
        h.count = h.count.saturating_sub(1);
        self.store_header(alloc, &h);
        Ok(Some(rec.value))
    }

    fn rehash_nolock(&self, alloc: &mut Allocator) -> Result<bool> {
        let mut h = self.header(alloc)?;
        if load_factor(&h) < REHASH_MIN_LOAD_FACTOR {
            return Ok(false);
        }
        let old_ts = h.table_size as usize;
        let new_ts = old_ts * REHASH_GROWTH;

        // домашние слоты считаем до выделения: битая запись — отказ, каталог не тронут
        let mut moves = Vec::with_capacity(h.count as usize);
        for i in 0..old_ts {
            if let Slot::Live(off) = read_slot(alloc.bytes(), h.dir, i) {
                moves.push((off, slot_index(key_at(alloc, off)?, new_ts)));
            }
        }

        let new_dir = alloc.calloc_nolock(new_ts, SLOT_SIZE)?;
        for (off, home) in moves {
            let mut idx = home;
            // новый каталог без tombstone'ов и больше старого: пустой слот найдётся
            while read_slot(alloc.bytes(), new_dir, idx) != Slot::Empty {
                idx = next_slot(idx, new_ts);
            }
            // запись не копируется — переезжает только смещение
            write_slot(alloc.bytes_mut(), new_dir, idx, Slot::Live(off));
        }

        let old_dir = h.dir;
        h.dir = new_dir;
        h.table_size = new_ts as u64;
        self.store_header(alloc, &h);
        if let Err(e) = alloc.free_nolock(old_dir) {
            warn!("rehash in '{}' leaked old directory: {}", alloc.name(), e);
        }

        record_rehash();
        debug!(
            "rehash in '{}': {} -> {} slots, {} entries",
            alloc.name(),
            old_ts,
            new_ts,
            h.count
        );
        Ok(true)
    }
}

#[inline]
fn load_factor(h: &HashHeader) -> f64 {
    h.count as f64 / h.table_size as f64
}
