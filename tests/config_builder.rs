use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use QuiverShm::config::{ShmBuilder, ShmConfig};
use QuiverShm::ShmStore;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qshm-builder-{prefix}-{pid}-{t}-{id}"))
}

#[test]
fn env_config_with_builder_overrides() -> Result<()> {
    let root = unique_root("env");
    fs::create_dir_all(&root)?;

    // единственный тест этого бинаря, трогающий env
    std::env::set_var("P1_SHM_NAME", "from-env");
    std::env::set_var("P1_SHM_SIZE", "96K");
    std::env::set_var("P1_SHM_DIR", &root);
    std::env::set_var("P1_SHM_TABLE_SIZE", "16");

    let cfg = ShmConfig::from_env();
    assert_eq!(cfg.name, "from-env");
    assert_eq!(cfg.size, 96 * 1024);
    assert_eq!(cfg.resolved_dir(), root);
    assert_eq!(cfg.initial_table_size, 16);

    // builder поверх env
    let cfg2 = ShmBuilder::new().name("override").initial_table_size(32).build();
    assert_eq!(cfg2.name, "override");
    assert_eq!(cfg2.size, 96 * 1024);
    assert_eq!(cfg2.initial_table_size, 32);

    {
        let s = ShmStore::create(&cfg2)?;
        assert_eq!(s.allocator().map_size(), 96 * 1024);
        assert_eq!(s.table_stats()?.table_size, 32);
        assert!(root.join("override").exists());
    }
    assert!(ShmStore::unlink(&cfg2)?);

    for k in ["P1_SHM_NAME", "P1_SHM_SIZE", "P1_SHM_DIR", "P1_SHM_TABLE_SIZE"] {
        std::env::remove_var(k);
    }

    // чистый default не читает env
    let d = ShmBuilder::from_default().build();
    assert_eq!(d.name, "quivershm");
    assert_eq!(d.initial_table_size, 64);
    println!("{}", d);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}
