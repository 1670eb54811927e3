#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod error;
pub mod metrics;
pub mod config;

// Разделяемый сегмент: имя -> файл в /dev/shm, mmap, flock
pub mod offset;
pub mod lock;
pub mod segment;

// sbrk-аллокатор поверх сегмента: src/alloc/{mod,header,blocks,ops,diag}.rs
pub mod alloc;

// Хеш-таблица и кодек записей
pub mod hash;
pub mod record;
pub mod table; // src/table/{mod,header,ops}.rs

// Фасад для потребителей (сессии, кеши)
pub mod store;

// Удобные реэкспорты
pub use alloc::{AllocSummary, Allocator};
pub use config::{ShmBuilder, ShmConfig};
pub use error::{Result, ShmError};
pub use offset::Offset;
pub use record::Record;
pub use store::ShmStore;
pub use table::{SharedHash, TableStats};
