use anyhow::Result;

mod common;
use common::create_test_pool_dyn;

use oxbowdb::ExtendibleHashTable;

#[test]
fn test_insert_get_remove_roundtrip() -> Result<()> {
    let (pool, _disk, _dir) = create_test_pool_dyn(32);
    let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(pool)?;

    assert!(table.insert(1, 100)?);
    assert!(table.insert(2, 200)?);

    assert_eq!(table.get_value(&1)?, vec![100]);

    // Exact duplicates are rejected, distinct values under one key are not.
    assert!(!table.insert(1, 100)?);
    assert!(table.insert(1, 101)?);
    let mut values = table.get_value(&1)?;
    values.sort_unstable();
    assert_eq!(values, vec![100, 101]);

    assert!(table.remove(&1, &100)?);
    assert_eq!(table.get_value(&1)?, vec![101]);
    assert!(!table.remove(&1, &100)?);
    Ok(())
}

#[test]
fn test_directory_grows_and_stays_consistent() -> Result<()> {
    let (pool, _disk, _dir) = create_test_pool_dyn(128);
    let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(pool)?;
    assert_eq!(table.global_depth()?, 1);

    let n = 5000u64;
    for i in 0..n {
        assert!(table.insert(i, i * 7)?, "insert {i}");
    }

    // Bucket overflows must have split buckets and raised the global depth.
    assert!(table.global_depth()? >= 3);
    table.verify_integrity()?;

    for i in 0..n {
        assert_eq!(table.get_value(&i)?, vec![i * 7], "lookup {i}");
    }
    Ok(())
}

#[test]
fn test_merge_and_shrink_after_mass_removal() -> Result<()> {
    let (pool, _disk, _dir) = create_test_pool_dyn(128);
    let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(pool)?;

    let n = 3000u64;
    for i in 0..n {
        table.insert(i, i)?;
    }
    let peak = table.global_depth()?;
    assert!(peak >= 2);

    for i in 0..n {
        assert!(table.remove(&i, &i)?, "remove {i}");
        assert!(table.get_value(&i)?.is_empty());
    }

    table.verify_integrity()?;
    assert!(table.global_depth()? <= peak);

    // Still a working table afterwards.
    assert!(table.insert(9999, 1)?);
    assert_eq!(table.get_value(&9999)?, vec![1]);
    Ok(())
}

#[test]
fn test_interleaved_inserts_and_removes() -> Result<()> {
    let (pool, _disk, _dir) = create_test_pool_dyn(128);
    let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(pool)?;

    for i in 0..1000u64 {
        table.insert(i, i)?;
        if i % 3 == 0 {
            table.remove(&i, &i)?;
        }
    }

    table.verify_integrity()?;
    for i in 0..1000u64 {
        let expected: Vec<u64> = if i % 3 == 0 { vec![] } else { vec![i] };
        assert_eq!(table.get_value(&i)?, expected, "key {i}");
    }
    Ok(())
}

#[test]
fn test_random_workload_matches_model() -> Result<()> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::{HashMap, HashSet};

    let (pool, _disk, _dir) = create_test_pool_dyn(128);
    let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(pool)?;

    let mut rng = StdRng::seed_from_u64(7);
    let mut model: HashMap<u64, HashSet<u64>> = HashMap::new();

    for _ in 0..2000 {
        let key = rng.gen_range(0..500u64);
        let value = rng.gen_range(0..1000u64);
        let inserted = table.insert(key, value)?;
        // The table accepts exactly what a set-of-pairs model accepts.
        assert_eq!(inserted, model.entry(key).or_default().insert(value));
    }

    for (key, values) in &model {
        let mut got = table.get_value(key)?;
        got.sort_unstable();
        let mut want: Vec<u64> = values.iter().copied().collect();
        want.sort_unstable();
        assert_eq!(got, want, "key {key}");
    }
    table.verify_integrity()?;
    Ok(())
}

#[test]
fn test_concurrent_readers_and_writers() -> Result<()> {
    use std::sync::Arc;

    let (pool, _disk, _dir) = create_test_pool_dyn(256);
    let table: Arc<ExtendibleHashTable<u64, u64>> = Arc::new(ExtendibleHashTable::new(pool)?);

    let mut handles = Vec::new();
    for t in 0..4u64 {
        let table = Arc::clone(&table);
        handles.push(std::thread::spawn(move || {
            for i in 0..500u64 {
                let key = t * 1000 + i;
                table.insert(key, key).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    table.verify_integrity()?;
    for t in 0..4u64 {
        for i in 0..500u64 {
            let key = t * 1000 + i;
            assert_eq!(table.get_value(&key)?, vec![key]);
        }
    }
    Ok(())
}
