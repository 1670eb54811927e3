//! Lightweight process-local metrics for QuiverShm.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - allocator (malloc/free/sbrk/reuse)
//! - shared table (rehash)
//! - segment lock contention
//!
//! Счётчики локальны для процесса: другие процессы на том же сегменте
//! ведут свои.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Allocator -----
static MALLOC_CALLS: AtomicU64 = AtomicU64::new(0);
static FREE_CALLS: AtomicU64 = AtomicU64::new(0);
static REUSE_HITS: AtomicU64 = AtomicU64::new(0);
static SBRK_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOC_FAILURES: AtomicU64 = AtomicU64::new(0);
static CORRUPT_BLOCKS: AtomicU64 = AtomicU64::new(0);

// ----- Table -----
static REHASHES: AtomicU64 = AtomicU64::new(0);

// ----- Lock -----
static LOCK_WAITS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub malloc_calls: u64,
    pub free_calls: u64,
    pub reuse_hits: u64,
    pub sbrk_bytes: u64,
    pub alloc_failures: u64,
    pub corrupt_blocks: u64,
    pub rehashes: u64,
    pub lock_waits: u64,
}

impl MetricsSnapshot {
    /// Share of mallocs served from freed blocks instead of moving the break.
    pub fn reuse_ratio(&self) -> f64 {
        if self.malloc_calls == 0 {
            0.0
        } else {
            self.reuse_hits as f64 / self.malloc_calls as f64
        }
    }
}

pub fn record_malloc(reused: bool) {
    MALLOC_CALLS.fetch_add(1, Ordering::Relaxed);
    if reused {
        REUSE_HITS.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_free() {
    FREE_CALLS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_sbrk(bytes: u64) {
    SBRK_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

pub fn record_alloc_failure() {
    ALLOC_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_corrupt_block() {
    CORRUPT_BLOCKS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_rehash() {
    REHASHES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_lock_wait() {
    LOCK_WAITS.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        malloc_calls: MALLOC_CALLS.load(Ordering::Relaxed),
        free_calls: FREE_CALLS.load(Ordering::Relaxed),
        reuse_hits: REUSE_HITS.load(Ordering::Relaxed),
        sbrk_bytes: SBRK_BYTES.load(Ordering::Relaxed),
        alloc_failures: ALLOC_FAILURES.load(Ordering::Relaxed),
        corrupt_blocks: CORRUPT_BLOCKS.load(Ordering::Relaxed),
        rehashes: REHASHES.load(Ordering::Relaxed),
        lock_waits: LOCK_WAITS.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    MALLOC_CALLS.store(0, Ordering::Relaxed);
    FREE_CALLS.store(0, Ordering::Relaxed);
    REUSE_HITS.store(0, Ordering::Relaxed);
    SBRK_BYTES.store(0, Ordering::Relaxed);
    ALLOC_FAILURES.store(0, Ordering::Relaxed);
    CORRUPT_BLOCKS.store(0, Ordering::Relaxed);
    REHASHES.store(0, Ordering::Relaxed);
    LOCK_WAITS.store(0, Ordering::Relaxed);
}
