use anyhow::Result;

use QuiverShm::{ShmConfig, ShmStore};

pub fn exec(cfg: ShmConfig) -> Result<()> {
    if ShmStore::unlink(&cfg)? {
        println!("OK unlink: '{}' removed", cfg.name);
    } else {
        println!("unlink: '{}' did not exist", cfg.name);
    }
    Ok(())
}
