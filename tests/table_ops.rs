use anyhow::{anyhow, Result};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use QuiverShm::hash::slot_index;
use QuiverShm::record;
use QuiverShm::{ShmConfig, ShmError, ShmStore};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qshm-{prefix}-{pid}-{t}-{id}"))
}

fn fresh(prefix: &str, size: usize, slots: usize) -> Result<(PathBuf, ShmConfig, ShmStore)> {
    let root = unique_root(prefix);
    fs::create_dir_all(&root)?;
    let cfg = ShmConfig::default()
        .with_name(prefix)
        .with_size(size)
        .with_dir(Some(root.clone()))
        .with_initial_table_size(slots);
    let s = ShmStore::create(&cfg)?;
    Ok((root, cfg, s))
}

fn teardown(root: PathBuf, cfg: &ShmConfig) {
    let _ = ShmStore::unlink(cfg);
    let _ = fs::remove_dir_all(root);
}

#[test]
fn round_trip_binary_keys_and_values() -> Result<()> {
    let (root, cfg, mut s) = fresh("roundtrip", 256 * 1024, 64)?;

    let pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"plain".to_vec(), b"value".to_vec()),
        (vec![0u8, 1, 2, 0], vec![0xff; 3]),
        (b"empty-value".to_vec(), Vec::new()),
        (b"big".to_vec(), vec![0xAB; 10_000]),
    ];
    for (k, v) in &pairs {
        s.set(k, v)?;
    }
    for (k, v) in &pairs {
        assert_eq!(s.get(k)?.as_ref(), Some(v), "key {:?}", k);
    }
    // пустое значение отличимо от отсутствия
    assert_eq!(s.get(b"empty-value")?, Some(Vec::new()));
    assert!(s.contains(b"empty-value")?);
    assert!(!s.contains(b"nope")?);

    teardown(root, &cfg);
    Ok(())
}

#[test]
fn overwrite_keeps_count_and_slot() -> Result<()> {
    let (root, cfg, mut s) = fresh("overwrite", 128 * 1024, 64)?;
    let t = *s.table();

    s.set(b"sid", b"v1")?;
    let (slot1, _) = t.find(s.allocator(), b"sid")?.expect("present");
    let blocks_before = s.allocator().nblocks()?;

    s.set(b"sid", b"v2-longer-value")?;
    assert_eq!(s.len()?, 1);
    assert_eq!(s.get(b"sid")?.as_deref(), Some(&b"v2-longer-value"[..]));
    let (slot2, rec) = t.find(s.allocator(), b"sid")?.expect("present");
    assert_eq!(slot1, slot2);
    assert_eq!(rec.key, b"sid");

    // старая запись освобождена и вернётся в оборот
    let sum = s.summary()?;
    assert!(sum.free_blocks >= 1);
    assert!(s.allocator().nblocks()? >= blocks_before);

    teardown(root, &cfg);
    Ok(())
}

#[test]
fn remove_present_and_absent() -> Result<()> {
    let (root, cfg, mut s) = fresh("remove", 128 * 1024, 64)?;
    let t = *s.table();

    s.set(b"x", b"1")?;
    s.set(b"y", b"2")?;
    assert!(s.remove(b"x")?);
    assert_eq!(s.len()?, 1);
    assert_eq!(s.get_or(b"x", b"dflt")?, b"dflt");

    assert!(!s.remove(b"x")?);
    assert!(!s.remove(b"never")?);
    assert_eq!(s.len()?, 1);

    // take возвращает значение, либо default
    assert_eq!(t.take(s.allocator_mut(), b"y", b"none")?, b"2");
    assert_eq!(t.take(s.allocator_mut(), b"y", b"none")?, b"none");
    assert_eq!(s.len()?, 0);
    assert!(s.take(b"y")?.is_none());

    let st = s.table_stats()?;
    assert_eq!(st.live_slots, 0);
    assert_eq!(st.tombstones, 2);

    teardown(root, &cfg);
    Ok(())
}

#[test]
fn clear_resets_slots_to_never_used() -> Result<()> {
    let (root, cfg, mut s) = fresh("clear", 256 * 1024, 64)?;

    for i in 0..30 {
        s.set(format!("k{}", i).as_bytes(), b"payload")?;
    }
    s.remove(b"k3")?;
    let used_before = s.summary()?.used_blocks;
    assert!(used_before > 2);

    s.clear()?;
    assert_eq!(s.len()?, 0);
    for i in 0..30 {
        assert!(s.get(format!("k{}", i).as_bytes())?.is_none());
    }
    let st = s.table_stats()?;
    assert_eq!(st.tombstones, 0);
    assert_eq!(st.live_slots, 0);
    // остаются только hash header и каталог
    assert_eq!(s.summary()?.used_blocks, 2);

    // таблица пригодна к повторному использованию
    s.set(b"after", b"clear")?;
    assert_eq!(s.len()?, 1);

    teardown(root, &cfg);
    Ok(())
}

#[test]
fn rehash_grows_four_times_past_load_threshold() -> Result<()> {
    let (root, cfg, mut s) = fresh("rehash", 1024 * 1024, 64)?;

    // 51/64 = 0.797 — ещё без rehash
    for i in 0..51 {
        s.set(format!("key-{:03}", i).as_bytes(), format!("val-{}", i).as_bytes())?;
    }
    assert_eq!(s.table_stats()?.table_size, 64);

    // 52/64 = 0.8125 > 0.8
    s.set(b"key-051", b"val-51")?;
    let st = s.table_stats()?;
    assert_eq!(st.table_size, 256);
    assert_eq!(st.count, 52);
    assert_eq!(st.live_slots, 52);
    assert_eq!(st.tombstones, 0);

    for i in 0..52 {
        let got = s.get(format!("key-{:03}", i).as_bytes())?;
        assert_eq!(got, Some(format!("val-{}", i).into_bytes()));
    }

    // ниже порога сжатия rehash ничего не делает
    s.clear()?;
    let t = *s.table();
    assert!(!t.rehash(s.allocator_mut())?);
    assert_eq!(s.table_stats()?.table_size, 256);

    teardown(root, &cfg);
    Ok(())
}

/// Keys that all start probing at the same slot of a `table_size` directory.
fn colliding_keys(n: usize, table_size: usize) -> Vec<Vec<u8>> {
    let home = slot_index(b"seed", table_size);
    (0..100_000u32)
        .map(|i| format!("c-{}", i).into_bytes())
        .filter(|k| slot_index(k, table_size) == home)
        .take(n)
        .collect()
}

#[test]
fn tombstones_keep_probe_chains_reachable() -> Result<()> {
    let (root, cfg, mut s) = fresh("tomb", 128 * 1024, 16)?;
    let keys = colliding_keys(4, 16);
    assert_eq!(keys.len(), 4);

    s.set(&keys[0], b"0")?;
    s.set(&keys[1], b"1")?;
    s.set(&keys[2], b"2")?;

    // дыра посреди цепочки
    assert!(s.remove(&keys[1])?);
    assert_eq!(s.get(&keys[2])?.as_deref(), Some(&b"2"[..]));

    // новый ключ той же цепочки занимает tombstone, хвост по-прежнему виден
    s.set(&keys[3], b"3")?;
    assert_eq!(s.table_stats()?.tombstones, 0);
    for (k, v) in [(&keys[0], b"0"), (&keys[2], b"2"), (&keys[3], b"3")] {
        assert_eq!(s.get(k)?.as_deref(), Some(&v[..]));
    }

    // перезапись ключа за tombstone'ом не плодит дубликатов
    assert!(s.remove(&keys[0])?);
    s.set(&keys[2], b"2b")?;
    assert_eq!(s.len()?, 2);
    assert!(s.remove(&keys[2])?);
    assert!(s.get(&keys[2])?.is_none());
    assert_eq!(s.get(&keys[3])?.as_deref(), Some(&b"3"[..]));
    assert_eq!(s.len()?, 1);

    teardown(root, &cfg);
    Ok(())
}

#[test]
fn capacity_exhaustion_leaves_table_untouched() -> Result<()> {
    let (root, cfg, mut s) = fresh("full", 4096, 64)?;

    s.set(b"keep", b"me")?;
    let before = s.len()?;

    match s.set(b"huge", &vec![7u8; 8000]) {
        Err(ShmError::CapacityExhausted { requested, available }) => {
            assert!(requested > available);
        }
        other => panic!("expected CapacityExhausted, got {:?}", other),
    }
    assert_eq!(s.len()?, before);
    assert!(s.get(b"huge")?.is_none());

    // заполняем до отказа: каждый отказ — ошибка ёмкости, счётчик точен
    let mut ok = 0usize;
    let err = loop {
        match s.set(format!("fill-{}", ok).as_bytes(), &[1u8; 100]) {
            Ok(()) => ok += 1,
            Err(e) => break e,
        }
    };
    assert!(err.is_capacity(), "got {:?}", err);
    assert!(ok > 0);
    assert_eq!(s.len()?, before + ok);
    assert_eq!(s.get(b"keep")?.as_deref(), Some(&b"me"[..]));

    // overwrite на полном сегменте: ошибка, старое значение на месте
    assert!(s.set(b"keep", &[9u8; 1000]).is_err());
    assert_eq!(s.get(b"keep")?.as_deref(), Some(&b"me"[..]));

    // освобождение возвращает место
    s.remove(b"fill-0")?;
    s.set(b"again", &[1u8; 100])?;

    teardown(root, &cfg);
    Ok(())
}

#[test]
fn entries_and_keys_list_live_records() -> Result<()> {
    let (root, cfg, mut s) = fresh("entries", 128 * 1024, 64)?;
    s.set(b"a", b"1")?;
    s.set(b"b", b"2")?;
    s.set(b"c", b"3")?;
    s.remove(b"b")?;

    let mut keys = s.table().keys(s.allocator())?;
    keys.sort();
    assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);

    let recs = s.entries()?;
    assert_eq!(recs.len(), 2);
    assert!(recs.iter().any(|r| r.key == b"c" && r.value == b"3"));

    let lf = s.table().load_factor(s.allocator())?;
    assert!((lf - 2.0 / 64.0).abs() < 1e-9);

    teardown(root, &cfg);
    Ok(())
}

// -------- damaged records --------

/// Payload offset of the record holding exactly `key`/`value` (found by scanning the segment file).
fn record_offset(path: &Path, key: &[u8], value: &[u8]) -> Result<u64> {
    let img = fs::read(path)?;
    let pat = record::encode(key, value);
    img.windows(pat.len())
        .position(|w| w == pat.as_slice())
        .map(|p| p as u64)
        .ok_or_else(|| anyhow!("record {:?} not found", String::from_utf8_lossy(key)))
}

fn poke(path: &Path, at: u64, bytes: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new().write(true).open(path)?;
    f.seek(SeekFrom::Start(at))?;
    f.write_all(bytes)?;
    f.flush()?;
    Ok(())
}

fn val(i: usize) -> Vec<u8> {
    format!("value-of-k{}", i).into_bytes()
}

#[test]
fn damaged_record_fails_lookups_without_mutation() -> Result<()> {
    let (root, cfg, mut s) = fresh("badfind", 128 * 1024, 64)?;
    s.set(b"victim", b"victim-value")?;
    s.set(b"other", b"other-value")?;

    let path = s.allocator().path().to_path_buf();
    let at = record_offset(&path, b"victim", b"victim-value")?;
    // klen = u32::MAX: ключ выходит за блок
    poke(&path, at, &u32::MAX.to_le_bytes())?;

    assert!(matches!(s.get(b"victim"), Err(ShmError::CorruptBlock { .. })));
    assert!(matches!(s.remove(b"victim"), Err(ShmError::CorruptBlock { .. })));
    assert!(matches!(s.take(b"victim"), Err(ShmError::CorruptBlock { .. })));
    assert!(s.entries().is_err());
    assert_eq!(s.len()?, 2);

    let sum = s.summary()?;
    assert!(sum.corrupt_at.is_none(), "block headers are intact");
    assert_eq!(sum.used_blocks, 4);

    teardown(root, &cfg);
    Ok(())
}

#[test]
fn damaged_record_blocks_rehash_without_leaking() -> Result<()> {
    let (root, cfg, mut s) = fresh("badrehash", 128 * 1024, 8)?;
    // 6/8 = 0.75 — ещё без rehash
    for i in 0..6 {
        s.set(format!("k{}", i).as_bytes(), &val(i))?;
    }
    assert_eq!(s.table_stats()?.table_size, 8);

    let path = s.allocator().path().to_path_buf();
    let at = record_offset(&path, b"k0", &val(0))?;
    poke(&path, at, &u32::MAX.to_le_bytes())?;

    let before = s.summary()?;

    // прямой rehash: отказ, каталог и куча не тронуты
    let t = *s.table();
    assert!(matches!(t.rehash(s.allocator_mut()), Err(ShmError::CorruptBlock { .. })));
    assert_eq!(t.table_size(s.allocator())?, 8);
    assert_eq!(s.len()?, 6);
    let after = s.summary()?;
    assert_eq!(after.used_blocks, before.used_blocks);
    assert_eq!(after.brk, before.brk);

    // 7/8 > 0.8: insert запускает rehash, который упирается в битую запись.
    // Либо вставка прошла (и посчитана), либо отказала до любых изменений.
    match s.set(b"k6", &val(6)) {
        Ok(()) => {
            assert_eq!(s.len()?, 7);
            assert_eq!(t.table_size(s.allocator())?, 8);
            assert_eq!(s.summary()?.used_blocks, before.used_blocks + 1);
            let (_, rec) = t.find(s.allocator(), b"k6")?.expect("k6 stored");
            assert_eq!(rec.value, val(6));
        }
        Err(e) => {
            assert!(matches!(e, ShmError::CorruptBlock { .. }), "got {:?}", e);
            assert_eq!(s.len()?, 6);
            assert_eq!(s.summary()?.used_blocks, before.used_blocks);
        }
    }

    teardown(root, &cfg);
    Ok(())
}

#[test]
fn damaged_block_header_makes_clear_fail_atomically() -> Result<()> {
    let (root, cfg, mut s) = fresh("badclear", 128 * 1024, 64)?;
    for i in 0..10 {
        s.set(format!("k{}", i).as_bytes(), &val(i))?;
    }

    let path = s.allocator().path().to_path_buf();
    let at = record_offset(&path, b"k9", &val(9))?;
    // size = 0 в заголовке блока записи
    poke(&path, at - 16, &0u64.to_le_bytes())?;

    let before = s.summary()?;
    assert_eq!(before.corrupt_at, Some(at - 16));

    assert!(matches!(s.clear(), Err(ShmError::CorruptBlock { .. })));
    assert_eq!(s.len()?, 10);

    let after = s.summary()?;
    assert_eq!(after.blocks, before.blocks);
    assert_eq!(after.used_blocks, before.used_blocks);
    assert_eq!(after.free_blocks, 0);

    teardown(root, &cfg);
    Ok(())
}

#[test]
fn oversized_lengths_are_refused_before_allocation() {
    assert!(record::fits(16, 1 << 20));
    #[cfg(target_pointer_width = "64")]
    assert!(!record::fits(1, u32::MAX as usize + 1));
}
