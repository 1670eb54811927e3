use anyhow::Result;

use QuiverShm::{ShmConfig, ShmStore};

pub fn exec(cfg: ShmConfig, reuse: bool) -> Result<()> {
    let store = if reuse {
        ShmStore::open_or_create(&cfg)?
    } else {
        ShmStore::create(&cfg)?
    };
    let a = store.allocator();
    let state = if a.is_new() { "created" } else { "attached (kept)" };
    println!(
        "OK init: segment '{}' {} at {} (size={} B, slots={}, free={} B)",
        a.name(),
        state,
        a.path().display(),
        a.map_size(),
        store.table_stats()?.table_size,
        a.remaining()?
    );
    Ok(())
}
