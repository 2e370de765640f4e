//! Writer/reader interleavings over one shared index.
//!
//! Every search acquires a read slot and must terminate with a valid
//! result; the graph must validate once the dust settles. These tests are
//! sized to finish quickly while still overlapping operations for real.

use quiver::{GraphError, HnswConfig, HnswIndex, Quantization};

const DIM: usize = 8;

fn vector(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..DIM)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (state >> 33) as f32 / (1u64 << 31) as f32 - 0.5
        })
        .collect()
}

#[test]
fn concurrent_writers_and_readers() {
    let index: HnswIndex<u64> =
        HnswIndex::new(HnswConfig::new(DIM as u32, Quantization::F32)).unwrap();
    let writers = 4u64;
    let per_writer = 100u64;

    std::thread::scope(|scope| {
        let index = &index;
        for w in 0..writers {
            scope.spawn(move || {
                for i in 0..per_writer {
                    let id = w * per_writer + i;
                    index.insert(id, &vector(id), None, id).unwrap();
                }
            });
        }
        for r in 0..4u64 {
            scope.spawn(move || {
                for i in 0..200u64 {
                    let slot = index.read_slot();
                    let hits = index
                        .search(&vector(r * 1000 + i), 5, &slot)
                        .expect("search never fails on valid input");
                    // Whatever is returned must be sorted and resolvable.
                    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
                    for hit in &hits {
                        assert!(index.get_vector(hit.id).is_some() || !index.contains(hit.id));
                    }
                }
            });
        }
    });

    assert_eq!(index.len(), (writers * per_writer) as usize);
    let report = index.validate();
    assert!(report.is_healthy(), "{report:?}");
}

#[test]
fn concurrent_deletes_and_readers() {
    let total = 400u64;
    let index: HnswIndex<u64> =
        HnswIndex::new(HnswConfig::new(DIM as u32, Quantization::F32)).unwrap();
    for id in 0..total {
        index.insert(id, &vector(id), None, id).unwrap();
    }

    std::thread::scope(|scope| {
        let index = &index;
        scope.spawn(move || {
            for id in 0..total {
                if id % 2 == 0 {
                    index.remove(id);
                }
            }
        });
        for r in 0..4u64 {
            scope.spawn(move || {
                for i in 0..150u64 {
                    let slot = index.read_slot();
                    let hits = index.search(&vector(r * 7919 + i), 10, &slot).unwrap();
                    assert!(hits.len() <= 10);
                }
            });
        }
    });

    assert_eq!(index.len(), (total / 2) as usize);
    let report = index.validate();
    assert!(report.is_healthy(), "{report:?}");

    // Deleted ids are gone, survivors answer.
    assert!(!index.contains(0));
    assert!(index.contains(1));
}

#[test]
fn optimistic_insert_storm_converges() {
    let index: HnswIndex<u64> =
        HnswIndex::new(HnswConfig::new(DIM as u32, Quantization::F32)).unwrap();
    let threads = 4u64;
    let per_thread = 75u64;

    std::thread::scope(|scope| {
        let index = &index;
        for t in 0..threads {
            scope.spawn(move || {
                for i in 0..per_thread {
                    let id = t * per_thread + i;
                    let v = vector(id);
                    let prep = index.prepare_insert(id, &v, None).unwrap();
                    match index.try_commit_insert(prep, id) {
                        Ok(_) => {}
                        Err(GraphError::Conflict) => {
                            // Contention path: retry under the write lock.
                            index.insert(id, &v, None, id).unwrap();
                        }
                        Err(e) => panic!("unexpected commit error: {e}"),
                    }
                }
            });
        }
    });

    assert_eq!(index.len(), (threads * per_thread) as usize);
    let report = index.validate();
    assert!(report.is_healthy(), "{report:?}");
    for id in 0..threads * per_thread {
        assert!(index.contains(id), "id {id} lost in the storm");
    }
}

#[test]
fn read_slots_block_reclamation_until_released() {
    let index: HnswIndex<u64> =
        HnswIndex::new(HnswConfig::new(DIM as u32, Quantization::F32)).unwrap();
    for id in 0..50 {
        index.insert(id, &vector(id), None, id).unwrap();
    }

    let slot = index.read_slot();
    for id in 0..25 {
        index.remove(id);
    }
    assert_eq!(index.stats().graveyard, 25, "graves held for the reader");

    drop(slot);
    // Any subsequent write triggers reclamation.
    index.insert(1000, &vector(1000), None, 1000).unwrap();
    assert_eq!(index.stats().graveyard, 0);
    assert!(index.validate().is_healthy());
}

#[test]
fn mass_deletion_stress_with_concurrent_searches() {
    let total = 500u64;
    let index: HnswIndex<u64> =
        HnswIndex::new(HnswConfig::new(DIM as u32, Quantization::F32)).unwrap();
    for id in 0..total {
        index.insert(id, &vector(id), None, id).unwrap();
    }

    std::thread::scope(|scope| {
        let index = &index;
        scope.spawn(move || {
            // 95% deletion, scattered.
            for id in 0..total {
                if id % 20 != 0 {
                    index.remove(id);
                }
            }
        });
        for r in 0..2u64 {
            scope.spawn(move || {
                for i in 0..100u64 {
                    let slot = index.read_slot();
                    let _ = index.search(&vector(r * 31 + i), 10, &slot).unwrap();
                }
            });
        }
    });

    assert_eq!(index.len(), (total / 20) as usize);
    let report = index.validate();
    assert!(report.is_healthy(), "{report:?}");

    // The survivors still form a searchable graph.
    let slot = index.read_slot();
    let hits = index.search_with_ef(&vector(77), 10, 100, &slot).unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.id % 20 == 0));

    let recall = index.recall_self_test(20, 5);
    assert!(recall > 0.5, "recall collapsed after mass deletion: {recall}");
}
