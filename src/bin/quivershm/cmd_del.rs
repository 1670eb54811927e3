use anyhow::Result;

use QuiverShm::{ShmConfig, ShmStore};

pub fn exec(cfg: ShmConfig, key: String) -> Result<()> {
    let mut store = ShmStore::attach(&cfg)?;
    let existed = store.remove(key.as_bytes())?;
    println!("OK del: key='{}' (existed={})", key, existed);
    Ok(())
}
