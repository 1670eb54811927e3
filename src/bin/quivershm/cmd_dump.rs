use anyhow::Result;

use QuiverShm::{ShmConfig, ShmStore};

use super::util::display_text;

pub fn exec(cfg: ShmConfig, entries: bool) -> Result<()> {
    let store = ShmStore::attach(&cfg)?;
    print!("{}", store.allocator().dump()?);

    if entries {
        let recs = store.entries()?;
        println!("-- {} entries --", recs.len());
        for r in recs {
            println!(
                "{} => {} ({} B)",
                display_text(&r.key),
                display_text(&r.value),
                r.value.len()
            );
        }
    }
    Ok(())
}
