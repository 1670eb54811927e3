//! Centralized configuration and builder for QuiverShm.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - ShmConfig::from_env() reads P1_SHM_* variables; builder overrides on top.
//!
//! Tunables:
//! - name               (ENV P1_SHM_NAME, default "quivershm")
//! - size               (ENV P1_SHM_SIZE, bytes or K/M/G suffix, default 16M)
//! - dir                (ENV P1_SHM_DIR, default /dev/shm or the temp dir)
//! - initial_table_size (ENV P1_SHM_TABLE_SIZE, default 64)
//!
//! The segment itself never grows: size is fixed at create time. Only the
//! table inside it grows (by rehash) within that space.

use std::fmt;
use std::path::PathBuf;

use crate::alloc::MIN_SEGMENT_SIZE;
use crate::consts::{
    BLOCK_HDR_SIZE, BRK_HDR_SIZE, DEFAULT_SEGMENT_NAME, DEFAULT_SEGMENT_SIZE, DEFAULT_TABLE_SIZE, HASH_HDR_SIZE,
    SLOT_SIZE,
};
use crate::error::{Result, ShmError};
use crate::segment::{default_dir, normalize_name};

#[derive(Clone, Debug)]
pub struct ShmConfig {
    /// Segment name shared by every process of the fleet.
    /// Env: P1_SHM_NAME
    pub name: String,

    /// Segment capacity in bytes.
    /// Env: P1_SHM_SIZE (e.g. "65536", "64K", "16M")
    pub size: usize,

    /// Directory of segment objects; None means the platform default.
    /// Env: P1_SHM_DIR
    pub dir: Option<PathBuf>,

    /// Directory slots of a freshly initialized table.
    /// Env: P1_SHM_TABLE_SIZE
    pub initial_table_size: usize,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SEGMENT_NAME.to_string(),
            size: DEFAULT_SEGMENT_SIZE,
            dir: None,
            initial_table_size: DEFAULT_TABLE_SIZE,
        }
    }
}

/// Parse "4096", "64K", "16M", "1G" (binary multiples, case-insensitive).
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (num, mul) = match s.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&s[..s.len() - 1], 1usize << 10),
        Some('M') => (&s[..s.len() - 1], 1usize << 20),
        Some('G') => (&s[..s.len() - 1], 1usize << 30),
        _ => (s, 1usize),
    };
    num.trim().parse::<usize>().ok()?.checked_mul(mul)
}

impl ShmConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("P1_SHM_NAME") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.name = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("P1_SHM_SIZE") {
            if let Some(n) = parse_size(&v) {
                cfg.size = n;
            }
        }

        if let Ok(v) = std::env::var("P1_SHM_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.dir = Some(PathBuf::from(s));
            }
        }

        if let Ok(v) = std::env::var("P1_SHM_TABLE_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.initial_table_size = n;
            }
        }

        cfg
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_dir<P: Into<PathBuf>>(mut self, dir: Option<P>) -> Self {
        self.dir = dir.map(Into::into);
        self
    }

    pub fn with_initial_table_size(mut self, slots: usize) -> Self {
        self.initial_table_size = slots;
        self
    }

    /// Directory actually used for the segment object.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_dir)
    }

    /// Bytes a fresh segment needs before the first record.
    pub fn min_size(&self) -> usize {
        MIN_SEGMENT_SIZE.max(
            BRK_HDR_SIZE
                + 2 * BLOCK_HDR_SIZE
                + HASH_HDR_SIZE
                + self.initial_table_size.max(1) * SLOT_SIZE,
        )
    }

    pub fn validate(&self) -> Result<()> {
        normalize_name(&self.name)?;
        if self.initial_table_size == 0 {
            return Err(ShmError::SegmentCreateFailed {
                name: self.name.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "initial_table_size must be > 0",
                ),
            });
        }
        if self.size < self.min_size() {
            return Err(ShmError::SegmentCreateFailed {
                name: self.name.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!(
                        "segment size {} too small for a {}-slot table (need >= {})",
                        self.size,
                        self.initial_table_size,
                        self.min_size()
                    ),
                ),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ShmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ShmConfig {{ name: {}, size: {}, dir: {}, initial_table_size: {} }}",
            self.name,
            self.size,
            self.dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("default({})", default_dir().display())),
            self.initial_table_size,
        )
    }
}

/// Lightweight builder that produces a ShmConfig.
#[derive(Clone, Debug)]
pub struct ShmBuilder {
    cfg: ShmConfig,
}

impl Default for ShmBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: ShmConfig::from_env(),
        }
    }
}

impl ShmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: ShmConfig::default(),
        }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.cfg.name = name.into();
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.cfg.size = size;
        self
    }

    pub fn dir<P: Into<PathBuf>>(mut self, dir: Option<P>) -> Self {
        self.cfg.dir = dir.map(Into::into);
        self
    }

    pub fn initial_table_size(mut self, slots: usize) -> Self {
        self.cfg.initial_table_size = slots;
        self
    }

    pub fn build(self) -> ShmConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_with_suffixes() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("64K"), Some(64 * 1024));
        assert_eq!(parse_size("16m"), Some(16 << 20));
        assert_eq!(parse_size(" 1G "), Some(1 << 30));
        assert_eq!(parse_size("K"), None);
        assert_eq!(parse_size("abc"), None);
    }

    #[test]
    fn validate_rejects_tiny_segments_and_bad_names() {
        let cfg = ShmBuilder::from_default().name("ok").size(64 * 1024).build();
        assert!(cfg.validate().is_ok());

        let tiny = cfg.clone().with_size(64);
        assert!(tiny.validate().is_err());

        let bad = cfg.clone().with_name("a/b");
        assert!(matches!(bad.validate(), Err(ShmError::InvalidName(_))));

        let no_slots = cfg.with_initial_table_size(0);
        assert!(no_slots.validate().is_err());
    }
}
