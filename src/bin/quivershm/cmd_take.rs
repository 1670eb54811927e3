use anyhow::Result;

use QuiverShm::{ShmConfig, ShmStore};

use super::util::print_value;

pub fn exec(cfg: ShmConfig, key: String) -> Result<()> {
    let mut store = ShmStore::attach(&cfg)?;
    match store.take(key.as_bytes())? {
        Some(v) => {
            print_value(&key, &v);
            println!("removed; {} entries left", store.len()?);
        }
        None => println!("NOT FOUND '{}'", key),
    }
    Ok(())
}
