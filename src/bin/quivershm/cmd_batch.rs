use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use QuiverShm::{ShmConfig, ShmStore};

use super::util::decode_value_arg;

#[derive(Debug, Deserialize)]
struct RawOp {
    op: String,
    key: String,
    value: Option<String>,
}

/// Ops are applied in order, each under its own lock; the first failure stops the run.
pub fn exec(cfg: ShmConfig, ops_file: Option<PathBuf>, ops_json: Option<String>) -> Result<()> {
    let raw = if let Some(p) = ops_file {
        std::fs::read_to_string(&p).with_context(|| format!("read ops file {}", p.display()))?
    } else if let Some(s) = ops_json {
        s
    } else {
        return Err(anyhow!("provide --ops-file or --ops-json"));
    };

    let ops: Vec<RawOp> = serde_json::from_str(&raw).context("parse ops json (array of objects)")?;
    if ops.is_empty() {
        println!("No ops to execute.");
        return Ok(());
    }

    let mut store = ShmStore::attach(&cfg)?;
    let (mut puts, mut dels) = (0usize, 0usize);
    for (i, op) in ops.into_iter().enumerate() {
        match op.op.to_ascii_lowercase().as_str() {
            "put" => {
                let v = op
                    .value
                    .ok_or_else(|| anyhow!("put requires value for key '{}'", op.key))?;
                let (bytes, _src) = decode_value_arg(&v)?;
                store
                    .set(op.key.as_bytes(), &bytes)
                    .with_context(|| format!("op #{} put '{}'", i, op.key))?;
                puts += 1;
            }
            "del" => {
                if store.remove(op.key.as_bytes())? {
                    dels += 1;
                }
            }
            other => return Err(anyhow!("unknown op '{}'", other)),
        }
    }

    println!("Batch: OK (put={}, del={}, entries={})", puts, dels, store.len()?);
    Ok(())
}
