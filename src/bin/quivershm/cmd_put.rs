use anyhow::Result;

use QuiverShm::{ShmConfig, ShmStore};

use super::util::decode_value_arg;

pub fn exec(cfg: ShmConfig, key: String, value: String) -> Result<()> {
    let (val_bytes, src) = decode_value_arg(&value)?;

    let mut store = ShmStore::attach(&cfg)?;
    store.set(key.as_bytes(), &val_bytes)?;
    println!(
        "OK put: key='{}' ({} B), value={} B ({})",
        key,
        key.len(),
        val_bytes.len(),
        src
    );
    Ok(())
}
