//! Name resolution and table decryption benchmarks
//!
//! Run with:
//! ```bash
//! cargo bench --bench lookup
//! ```

#![allow(clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use storm_archive::{HashEntry, HashTable, NameHash};
use storm_crypto::{HASH_TABLE_KEY, decrypt_bytes, encrypt_bytes};

/// Table of `size` slots filled to 75% with `file_N.dat` names
fn populated_table(size: usize) -> (HashTable, Vec<String>) {
    let mut entries = vec![HashEntry::EMPTY; size];
    let names: Vec<String> = (0..size * 3 / 4).map(|i| format!("data\\file_{i}.dat")).collect();

    for (index, name) in names.iter().enumerate() {
        let hash = NameHash::new(name);
        let mut slot = hash.table_offset as usize & (size - 1);
        while !entries[slot].is_never_used() {
            slot = (slot + 1) & (size - 1);
        }
        entries[slot] = HashEntry {
            name_hash_a: hash.name_a,
            name_hash_b: hash.name_b,
            locale: 0,
            platform: 0,
            block_index: index as u32,
        };
    }

    let table = HashTable::new(entries).expect("Table size is a power of two");
    (table, names)
}

fn bench_name_hash(c: &mut Criterion) {
    c.bench_function("name_hash", |b| {
        b.iter(|| NameHash::new(black_box("Units\\Human\\Footman\\Footman.mdx")));
    });
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    for size in [1024usize, 16384, 65536] {
        let (table, names) = populated_table(size);
        let hashes: Vec<NameHash> = names.iter().map(|n| NameHash::new(n)).collect();

        group.bench_with_input(BenchmarkId::new("hit", size), &hashes, |b, hashes| {
            let mut i = 0;
            b.iter(|| {
                let hash = &hashes[i % hashes.len()];
                i += 1;
                black_box(table.find(hash, 0, 0))
            });
        });

        let miss = NameHash::new("not\\in\\the\\table.txt");
        group.bench_with_input(BenchmarkId::new("miss", size), &miss, |b, miss| {
            b.iter(|| black_box(table.find(miss, 0, 0)));
        });
    }
    group.finish();
}

fn bench_decrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("decrypt_table");
    for slots in [1024usize, 65536] {
        let mut raw = vec![0xFFu8; slots * 16];
        encrypt_bytes(&mut raw, HASH_TABLE_KEY);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(slots), &raw, |b, raw| {
            b.iter(|| {
                let mut buffer = raw.clone();
                decrypt_bytes(&mut buffer, HASH_TABLE_KEY);
                black_box(buffer)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_name_hash, bench_lookup, bench_decrypt);
criterion_main!(benches);
