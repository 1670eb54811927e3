use anyhow::Result;

use QuiverShm::{metrics, ShmConfig, ShmStore};

pub fn exec(cfg: ShmConfig, json: bool) -> Result<()> {
    let store = ShmStore::attach(&cfg)?;
    let heap = store.summary()?;
    // битая куча не должна прятать отчёт о куче — таблицу показываем как получится
    let table = store.table_stats();
    // метрики процесса: CLI видит только свои вызовы
    let ms = metrics::snapshot();

    if json {
        let table_json = match &table {
            Ok(t) => serde_json::to_value(t)?,
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        let obj = serde_json::json!({
            "segment": {
                "name": store.allocator().name(),
                "path": store.allocator().path().display().to_string(),
            },
            "heap": heap,
            "fragmentation": heap.fragmentation(),
            "table": table_json,
            "metrics": ms,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    println!("Segment '{}' at {}", store.allocator().name(), store.allocator().path().display());
    println!("{}", heap);
    match table {
        Ok(t) => println!(
            "table:      {} entries in {} slots (load {:.3}), tombstones={}, max_probe={}, record_bytes={}",
            t.count, t.table_size, t.load_factor, t.tombstones, t.max_probe, t.record_bytes
        ),
        Err(e) => println!("table:      unreadable: {}", e),
    }
    Ok(())
}
