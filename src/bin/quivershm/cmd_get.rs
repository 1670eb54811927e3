use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use QuiverShm::{ShmConfig, ShmStore};

use super::util::print_value;

pub fn exec(cfg: ShmConfig, key: String, out: Option<PathBuf>, default: Option<String>) -> Result<()> {
    let store = ShmStore::attach(&cfg)?;
    match store.get(key.as_bytes())? {
        Some(v) => {
            if let Some(out_path) = out {
                if let Some(parent) = out_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let mut f = OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .open(&out_path)?;
                f.write_all(&v)?;
                println!("FOUND '{}': {} B -> wrote to {}", key, v.len(), out_path.display());
            } else {
                print_value(&key, &v);
            }
        }
        None => match default {
            Some(d) => println!("DEFAULT '{}': {}", key, d),
            None => println!("NOT FOUND '{}'", key),
        },
    }
    Ok(())
}
