use anyhow::Result;

use QuiverShm::{ShmConfig, ShmStore};

pub fn exec(cfg: ShmConfig) -> Result<()> {
    let mut store = ShmStore::attach(&cfg)?;
    let before = store.len()?;
    store.clear()?;
    println!("OK clear: dropped {} entries", before);
    Ok(())
}
