//! End-to-end index behavior: build, search, delete, quantization, recall.

use quiver::{filter, HnswConfig, HnswIndex, InsertOutcome, Quantization};

fn axis_index(quantization: Quantization) -> HnswIndex<&'static str> {
    let index = HnswIndex::new(HnswConfig::new(3, quantization)).unwrap();
    index.insert(1, &[1.0, 0.0, 0.0], None, "x").unwrap();
    index.insert(2, &[0.0, 1.0, 0.0], None, "y").unwrap();
    index.insert(3, &[0.0, 0.0, 1.0], None, "z").unwrap();
    index
}

/// Deterministic pseudo-random vector stream.
fn vectors(dim: usize, n: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut state = seed | 1;
    let mut next = move || {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (state >> 33) as f32 / (1u64 << 31) as f32 - 0.5
    };
    (0..n)
        .map(|_| (0..dim).map(|_| next()).collect())
        .collect()
}

fn filled(dim: usize, n: usize, quantization: Quantization) -> HnswIndex<usize> {
    let index = HnswIndex::new(HnswConfig::new(dim as u32, quantization)).unwrap();
    for (i, v) in vectors(dim, n, 0xBEEF).iter().enumerate() {
        index.insert(i as u64, v, None, i).unwrap();
    }
    index
}

#[test]
fn axis_vectors_fp32_exact_distances() {
    let index = axis_index(Quantization::F32);
    let slot = index.read_slot();
    let hits = index.search(&[1.0, 0.0, 0.0], 2, &slot).unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, 1);
    assert!(hits[0].distance.abs() < 1e-6);
    // The runner-up is either orthogonal axis, at squared distance 2.
    assert!(hits[1].id == 2 || hits[1].id == 3);
    assert!((hits[1].distance - 2.0).abs() < 1e-5);
}

#[test]
fn axis_vectors_binary_distances_are_quantized() {
    let index = axis_index(Quantization::Binary);
    let slot = index.read_slot();
    let hits = index.search(&[1.0, 0.0, 0.0], 3, &slot).unwrap();

    assert_eq!(hits.len(), 3);
    // With three sign bits, every pair differs in 0, 1, 2, or 3 bits:
    // distances land on the grid {0, 2/3, 4/3, 2}.
    for hit in &hits {
        let on_grid = [0.0, 2.0 / 3.0, 4.0 / 3.0, 2.0]
            .iter()
            .any(|g| (hit.distance - g).abs() < 1e-6);
        assert!(on_grid, "distance {} off the binary grid", hit.distance);
    }
    assert_eq!(hits[0].id, 1);
    assert!(hits[0].distance.abs() < 1e-6);
}

#[test]
fn results_are_sorted_unique_and_capped() {
    let index = filled(8, 200, Quantization::F32);
    let slot = index.read_slot();
    let query = vectors(8, 1, 0x1234).pop().unwrap();
    let hits = index.search_with_ef(&query, 10, 100, &slot).unwrap();

    assert!(hits.len() <= 10);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    let mut ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), hits.len());
}

#[test]
fn search_more_than_len_returns_everything() {
    let index = filled(4, 7, Quantization::F32);
    let slot = index.read_slot();
    let hits = index
        .search_with_ef(&[0.1, 0.2, 0.3, 0.4], 50, 100, &slot)
        .unwrap();
    assert_eq!(hits.len(), 7);
}

#[test]
fn fp32_roundtrip_is_bit_exact_for_unit_vectors() {
    let index: HnswIndex<()> =
        HnswIndex::new(HnswConfig::new(4, Quantization::F32)).unwrap();
    index.insert(1, &[0.0, 1.0, 0.0, 0.0], None, ()).unwrap();
    assert_eq!(index.get_vector(1).unwrap(), vec![0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn fp32_roundtrip_restores_magnitude() {
    let index: HnswIndex<()> =
        HnswIndex::new(HnswConfig::new(2, Quantization::F32)).unwrap();
    index.insert(1, &[3.0, 4.0], None, ()).unwrap();
    let v = index.get_vector(1).unwrap();
    assert!((v[0] - 3.0).abs() < 1e-5);
    assert!((v[1] - 4.0).abs() < 1e-5);
}

#[test]
fn q8_roundtrip_error_is_bounded_per_component() {
    let index: HnswIndex<()> =
        HnswIndex::new(HnswConfig::new(4, Quantization::Q8)).unwrap();
    let original = [1.0f32, -2.0, 0.5, 3.0];
    index.insert(1, &original, None, ()).unwrap();
    let restored = index.get_vector(1).unwrap();

    let norm = original.iter().map(|v| v * v).sum::<f32>().sqrt();
    // Post-normalization error per component is at most range/127 with
    // range <= 1; de-normalization scales it by the magnitude.
    let bound = norm / 127.0 + 1e-5;
    for (orig, rest) in original.iter().zip(&restored) {
        assert!(
            (orig - rest).abs() <= bound,
            "component error {} exceeds {bound}",
            (orig - rest).abs()
        );
    }
}

#[test]
fn duplicate_insert_is_idempotent() {
    let index = filled(4, 20, Quantization::F32);
    assert_eq!(
        index.insert(5, &[0.9, 0.1, 0.1, 0.1], None, 999).unwrap(),
        InsertOutcome::AlreadyExists
    );
    assert_eq!(index.len(), 20);
    assert_eq!(index.get_value(5), Some(5));
}

#[test]
fn attributes_roundtrip_and_update() {
    let index: HnswIndex<()> =
        HnswIndex::new(HnswConfig::new(2, Quantization::F32)).unwrap();
    index
        .insert(1, &[1.0, 0.0], Some(r#"{"genre":"jazz"}"#), ())
        .unwrap();

    assert_eq!(index.get_attributes(1).as_deref(), Some(r#"{"genre":"jazz"}"#));
    assert!(index.set_attributes(1, Some(r#"{"genre":"rock"}"#)));
    assert_eq!(index.get_attributes(1).as_deref(), Some(r#"{"genre":"rock"}"#));
    assert!(index.set_attributes(1, None));
    assert_eq!(index.get_attributes(1), None);
    assert!(!index.set_attributes(42, Some("{}")));
}

#[test]
fn filtered_search_respects_the_predicate() {
    let dim = 8;
    let index: HnswIndex<usize> =
        HnswIndex::new(HnswConfig::new(dim as u32, Quantization::F32)).unwrap();
    for (i, v) in vectors(dim, 100, 0xFACE).iter().enumerate() {
        let attrs = if i % 2 == 0 {
            format!(r#"{{"parity":"even","rank":{i}}}"#)
        } else {
            format!(r#"{{"parity":"odd","rank":{i}}}"#)
        };
        index.insert(i as u64, v, Some(&attrs), i).unwrap();
    }

    let program = filter::compile(".parity == 'even'").unwrap();
    let slot = index.read_slot();
    let query = vectors(dim, 1, 0xD00D).pop().unwrap();
    let hits = index
        .search_filtered(&query, 10, 50, &program, None, &slot)
        .unwrap();

    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.id % 2 == 0));

    let impossible = filter::compile(".rank > 100000").unwrap();
    let none = index
        .search_filtered(&query, 10, 50, &impossible, None, &slot)
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn filtered_search_skips_nodes_without_attributes() {
    let index: HnswIndex<()> =
        HnswIndex::new(HnswConfig::new(2, Quantization::F32)).unwrap();
    index.insert(1, &[1.0, 0.0], Some(r#"{"tag":"a"}"#), ()).unwrap();
    index.insert(2, &[0.9, 0.1], None, ()).unwrap();

    let program = filter::compile(".tag == 'a'").unwrap();
    let slot = index.read_slot();
    let hits = index
        .search_filtered(&[1.0, 0.0], 2, 50, &program, None, &slot)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 1);
}

#[test]
fn filtered_search_with_constant_program_matches_everything() {
    let index = filled(4, 30, Quantization::F32);
    let program = filter::compile("(5+2)*3").unwrap();
    let slot = index.read_slot();
    let hits = index
        .search_filtered(&[0.1, 0.2, 0.3, 0.4], 5, 50, &program, None, &slot)
        .unwrap();
    assert_eq!(hits.len(), 5);
}

#[test]
fn neighbors_exposes_reciprocal_adjacency() {
    let index = filled(4, 50, Quantization::F32);
    for id in 0..50u64 {
        let Some(levels) = index.neighbors(id) else {
            panic!("node {id} missing");
        };
        for (lc, level) in levels.iter().enumerate() {
            for &nb in level {
                let back = index.neighbors(nb).expect("neighbor resolvable");
                assert!(
                    back[lc].contains(&id),
                    "link {id}->{nb} at layer {lc} not reciprocated"
                );
            }
        }
    }
}

#[test]
fn mass_deletion_leaves_a_searchable_graph() {
    let dim = 8;
    let n = 600;
    let index = filled(dim, n, Quantization::F32);

    // Delete 95% in a scattered order.
    for id in 0..n as u64 {
        if id % 20 != 0 {
            index.remove(id).unwrap();
        }
    }
    assert_eq!(index.len(), n / 20);

    let report = index.validate();
    assert!(report.is_healthy(), "{report:?}");

    let slot = index.read_slot();
    let query = vectors(dim, 1, 0xABCD).pop().unwrap();
    let hits = index.search_with_ef(&query, 10, 100, &slot).unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.id % 20 == 0));
}

#[test]
fn recall_meets_floor_per_quantization() {
    let dim = 16;
    let n = 400;
    for (quantization, floor) in [
        (Quantization::F32, 0.85),
        (Quantization::Q8, 0.60),
        (Quantization::Binary, 0.15),
    ] {
        let index = filled(dim, n, quantization);
        let recall = index.recall_self_test(50, 10);
        assert!(
            recall >= floor,
            "recall {recall:.3} below floor {floor} for {quantization:?}"
        );
    }
}

#[test]
fn stats_reflect_the_population() {
    let index = filled(4, 25, Quantization::Q8);
    let stats = index.stats();
    assert_eq!(stats.nodes, 25);
    assert_eq!(stats.dimensions, 4);
    assert_eq!(stats.quantization, Quantization::Q8);
    assert!(stats.links > 0);
    assert!(stats.memory_bytes > 0);

    index.remove(0).unwrap();
    assert_eq!(index.stats().nodes, 24);
}
