//! Integration tests for `PointStore` driven through its public
//! `rcf_core::PointStoreContract` surface only (no access to private
//! fields), exercising randomized insert/release/compact sequences the way
//! `samplesummarytest.rs` in the teacher crate drives `summarize` under a
//! seeded RNG.

use num::abs;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use rcf_core::{PointStoreContract, RCFError};

parameterized_test::create! { random_insert_release_preserves_live_vectors, (seed, internal_shingling, internal_rotation, dimensions, shingle_size), {
    core(seed, internal_shingling, internal_rotation, dimensions, shingle_size);
}}

/// Insert and release handles under a seeded random schedule, checking
/// after every step that every still-live handle reports the exact vector
/// it was given and that `size()` matches the number of handles the test
/// itself believes are live.
fn core(
    seed: u64,
    internal_shingling: bool,
    internal_rotation: bool,
    dimensions: usize,
    shingle_size: usize,
) {
    let base = dimensions / shingle_size;
    let capacity = 64;
    let mut store =
        rcf_core::PointStore::new(dimensions, shingle_size, capacity, internal_shingling, internal_rotation, Some(4))
            .unwrap();

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    // handle -> the exact logical vector we expect get_numeric_vector to return
    let mut expected: std::collections::HashMap<usize, Vec<f32>> = std::collections::HashMap::new();
    let mut warm_up: Vec<f32> = Vec::new();

    for step in 0..2000u64 {
        let update: Vec<f32> = (0..base).map(|_| rng.gen_range(-10.0..10.0)).collect();
        let point_len = if internal_shingling { base } else { dimensions };
        let point: Vec<f32> = if internal_shingling {
            update.clone()
        } else {
            (0..point_len).map(|_| rng.gen_range(-10.0..10.0)).collect()
        };

        let handle = store.add(&point, step).unwrap();

        if internal_shingling {
            warm_up.extend_from_slice(&update);
            if warm_up.len() > dimensions {
                let drop = warm_up.len() - dimensions;
                warm_up.drain(0..drop);
            }
        }

        if handle != rcf_core::INFEASIBLE {
            let logical = if internal_shingling {
                warm_up.clone()
            } else {
                point.clone()
            };
            expected.insert(handle, logical);
        }

        // release handles back down toward half capacity so the store never
        // runs out of room purely from this test's own insertion pressure;
        // a real caller would size capacity to its working set, but this
        // loop still exercises plenty of interleaved release/compact/insert
        // activity along the way.
        while expected.len() > capacity / 2 || (!expected.is_empty() && rng.gen_bool(0.3)) {
            let keys: Vec<usize> = expected.keys().copied().collect();
            let victim = keys[rng.gen_range(0..keys.len())];
            if store.decrement_ref_count(victim).unwrap() == 0 {
                expected.remove(&victim);
            } else {
                break;
            }
        }

        if rng.gen_bool(0.05) {
            store.compact().unwrap();
        }

        for (&h, v) in expected.iter() {
            let got = store.get_numeric_vector(h).unwrap();
            let diff: f32 = got.iter().zip(v).map(|(a, b)| abs(a - b)).sum();
            assert!(diff < 1e-6, "handle {h} diverged at step {step}: {got:?} != {v:?}");
        }
        assert_eq!(store.size(), expected.len());
    }
}

random_insert_release_preserves_live_vectors! {
    plain_4_1: (1, false, false, 4, 1),
    plain_6_3: (2, false, false, 6, 3),
    shingled_no_rotation: (3, true, false, 6, 3),
    shingled_rotation: (4, true, true, 6, 3),
    shingled_rotation_wide: (5, true, true, 12, 4),
}

#[test]
fn capacity_exhaustion_is_reported_without_partial_mutation() {
    let mut store = rcf_core::PointStore::new(2, 1, 2, false, false, None).unwrap();
    store.add(&[1.0, 1.0], 0).unwrap();
    store.add(&[2.0, 2.0], 1).unwrap();

    let entries_before = store.entries_seen();
    let size_before = store.size();
    let err = store.add(&[3.0, 3.0], 2).unwrap_err();
    assert!(matches!(err, RCFError::Capacity { .. }));
    // a failed add must not have advanced any observable counter
    assert_eq!(store.entries_seen(), entries_before);
    assert_eq!(store.size(), size_before);
}

#[test]
fn out_of_range_handle_is_invalid_handle_not_invalid_argument() {
    let store = rcf_core::PointStore::new(2, 1, 4, false, false, None).unwrap();
    let err = store.get_numeric_vector(999).unwrap_err();
    assert!(matches!(err, RCFError::InvalidHandle { .. }));
}

#[test]
fn freed_handle_is_invalid_handle() {
    let mut store = rcf_core::PointStore::new(2, 1, 4, false, false, None).unwrap();
    let h = store.add(&[1.0, 2.0], 0).unwrap();
    assert_eq!(store.decrement_ref_count(h).unwrap(), 0);
    let err = store.get_numeric_vector(h).unwrap_err();
    assert!(matches!(err, RCFError::InvalidHandle { .. }));
}

/// Draws a value in `[lo, hi)` straight off `RngCore::next_u32`, the same
/// trait `samplesummarytest.rs` imports in the teacher crate, rather than
/// going through the higher-level `rand::Rng::gen_range` the rest of this
/// file uses — useful when a caller only has a `dyn RngCore` or wants to
/// avoid pulling in `rand::Rng`'s full distribution machinery.
fn next_f32_via_rng_core<R: rand_core::RngCore>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    let fraction = (rng.next_u32() as f64) / (u32::MAX as f64 + 1.0);
    lo + (hi - lo) * fraction as f32
}

#[test]
fn rng_core_driven_inserts_also_round_trip_exactly() {
    let mut store = rcf_core::PointStore::new(3, 1, 8, false, false, None).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let mut expected = Vec::new();

    for i in 0..6u64 {
        let point: Vec<f32> = (0..3).map(|_| next_f32_via_rng_core(&mut rng, -5.0, 5.0)).collect();
        let h = store.add(&point, i).unwrap();
        expected.push((h, point));
    }
    for (h, point) in &expected {
        assert_eq!(&store.get_numeric_vector(*h).unwrap(), point);
    }
}
