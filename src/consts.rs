//! Общие константы формата сегмента (program break, блоки, хэш-таблица).
//!
//! Раскладка сегмента (LE):
//!   [brk header 32 B][block hdr 16 B][hash header 32 B]
//!   [block hdr][directory: table_size × i64]
//!   [block hdr][record] ... до текущего break
//!
//! Все ссылки внутри сегмента — смещения от начала сегмента, никогда не адреса.

// -------- Program break header --------
pub const BRK_MAGIC: &[u8; 8] = b"P1SHMBRK";
pub const BRK_VERSION: u32 = 1;
// [magic8][version u32][reserved u32][capacity u64][brk u64]
pub const BRK_HDR_SIZE: usize = 32;

pub const BRK_OFF_MAGIC: usize = 0;
pub const BRK_OFF_VERSION: usize = 8;
pub const BRK_OFF_CAPACITY: usize = 16;
pub const BRK_OFF_BREAK: usize = 24;

// -------- Block header --------
// [size u64][state u32][magic u32]; size — ёмкость payload (кратна BLOCK_ALIGN).
pub const BLOCK_HDR_SIZE: usize = 16;
pub const BLOCK_MAGIC: u32 = 0xB10C_5EA1;
pub const BLOCK_ALIGN: usize = 8;

pub const BLOCK_OFF_SIZE: usize = 0;
pub const BLOCK_OFF_STATE: usize = 8;
pub const BLOCK_OFF_MAGIC: usize = 12;

pub const BLOCK_STATE_USED: u32 = 1;
pub const BLOCK_STATE_FREE: u32 = 2;

/// A free block is split only if the remainder can hold a header plus this much payload.
pub const MIN_SPLIT_PAYLOAD: usize = 16;

// -------- Hash header --------
pub const HASH_MAGIC: &[u8; 8] = b"P1SHMHSH";
// [magic8][table_size u64][count u64][dir_off u64]
pub const HASH_HDR_SIZE: usize = 32;

pub const HASH_OFF_MAGIC: usize = 0;
pub const HASH_OFF_TABLE_SIZE: usize = 8;
pub const HASH_OFF_COUNT: usize = 16;
pub const HASH_OFF_DIR: usize = 24;

/// Payload offset of the hash header: first block carved from a fresh segment.
pub const HASH_HDR_OFF: u64 = (BRK_HDR_SIZE + BLOCK_HDR_SIZE) as u64;

// -------- Bucket directory --------
pub const SLOT_SIZE: usize = 8;
pub const SLOT_EMPTY: i64 = 0;
pub const SLOT_TOMBSTONE: i64 = -1;

// Порог роста и множитель
pub const REHASH_LOAD_FACTOR: f64 = 0.8;
pub const REHASH_MIN_LOAD_FACTOR: f64 = 0.2;
pub const REHASH_GROWTH: usize = 4;

// -------- Defaults --------
pub const DEFAULT_SEGMENT_NAME: &str = "quivershm";
pub const DEFAULT_SEGMENT_SIZE: usize = 16 * 1024 * 1024;
pub const DEFAULT_TABLE_SIZE: usize = 64;
pub const SHM_DIR: &str = "/dev/shm";
pub const LOCK_EXT: &str = "lock";
