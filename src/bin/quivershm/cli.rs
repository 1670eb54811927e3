use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use QuiverShm::config::{parse_size, ShmConfig};

/// CLI для разделяемого KV-сегмента
#[derive(Parser, Debug)]
#[command(name = "quivershm", version, about = "QuiverShm shared-memory KV CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Segment selection shared by all commands. Unset flags fall back to P1_SHM_* env.
#[derive(Args, Debug, Clone)]
pub struct SegArgs {
    /// Segment name (P1_SHM_NAME)
    #[arg(long)]
    pub name: Option<String>,
    /// Segment size for init, e.g. 64K, 16M (P1_SHM_SIZE)
    #[arg(long, value_parser = parse_size_arg)]
    pub size: Option<usize>,
    /// Directory holding segment files (P1_SHM_DIR, default /dev/shm)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

impl SegArgs {
    pub fn config(&self, table_size: Option<usize>) -> ShmConfig {
        let mut cfg = ShmConfig::from_env();
        if let Some(n) = &self.name {
            cfg = cfg.with_name(n.clone());
        }
        if let Some(s) = self.size {
            cfg = cfg.with_size(s);
        }
        if let Some(d) = &self.dir {
            cfg = cfg.with_dir(Some(d.clone()));
        }
        if let Some(t) = table_size {
            cfg = cfg.with_initial_table_size(t);
        }
        cfg
    }
}

fn parse_size_arg(s: &str) -> Result<usize, String> {
    parse_size(s).ok_or_else(|| format!("invalid size '{}'", s))
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Create (reset) a segment with an empty table
    Init {
        #[command(flatten)]
        seg: SegArgs,
        /// Initial directory slots (P1_SHM_TABLE_SIZE)
        #[arg(long)]
        table_size: Option<usize>,
        /// Keep an existing valid segment instead of resetting it
        #[arg(long)]
        reuse: bool,
    },
    /// Put key/value. Value: literal, hex:..., @file or '-' for stdin
    Put {
        #[command(flatten)]
        seg: SegArgs,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
    /// Get key
    Get {
        #[command(flatten)]
        seg: SegArgs,
        #[arg(long)]
        key: String,
        /// Optional file to write raw value into
        #[arg(long)]
        out: Option<PathBuf>,
        /// Printed instead of NOT FOUND
        #[arg(long)]
        default: Option<String>,
    },
    /// Remove key and print its value
    Take {
        #[command(flatten)]
        seg: SegArgs,
        #[arg(long)]
        key: String,
    },
    /// Delete key
    Del {
        #[command(flatten)]
        seg: SegArgs,
        #[arg(long)]
        key: String,
    },
    /// Drop every entry (slots reset to never-used)
    Clear {
        #[command(flatten)]
        seg: SegArgs,
    },
    /// Apply a JSON array of {op:"put"|"del", key, value?}
    Batch {
        #[command(flatten)]
        seg: SegArgs,
        #[arg(long)]
        ops_file: Option<PathBuf>,
        #[arg(long)]
        ops_json: Option<String>,
    },
    /// Heap and table status
    Status {
        #[command(flatten)]
        seg: SegArgs,
        #[arg(long)]
        json: bool,
    },
    /// Walk the block chain (and optionally list entries)
    Dump {
        #[command(flatten)]
        seg: SegArgs,
        #[arg(long)]
        entries: bool,
    },
    /// Remove the segment from the OS namespace
    Unlink {
        #[command(flatten)]
        seg: SegArgs,
    },
}
