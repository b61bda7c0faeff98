//! Black-box scenario tests against the public crate API, exercising the
//! literal scenarios from spec.md §8 that cross several internal modules
//! (entity store, node map, subdivision policy, k-NN engine).

use lucien_core::{IndexConfig, LucienError, Octree};

fn octree() -> Octree<&'static str> {
    Octree::new(IndexConfig::default())
}

#[test]
fn scenario_a_three_entities_same_cell() {
    let index = octree();
    let e1 = index.insert([100.0, 100.0, 100.0], 10, "E1").unwrap();
    let e2 = index.insert([100.0, 100.0, 100.0], 10, "E2").unwrap();
    let e3 = index.insert([100.0, 100.0, 100.0], 10, "E3").unwrap();

    let found = index.lookup([100.0, 100.0, 100.0], 10).unwrap();
    assert_eq!(found.len(), 3);
    for id in [e1, e2, e3] {
        assert!(found.contains(&id));
    }
    let stats = index.stats();
    assert_eq!(stats.entity_count, 3);
    assert_eq!(stats.node_count, 1);
}

#[test]
fn scenario_b_remove_one_of_three() {
    let index = octree();
    let e1 = index.insert([100.0, 100.0, 100.0], 10, "E1").unwrap();
    let e2 = index.insert([100.0, 100.0, 100.0], 10, "E2").unwrap();
    let e3 = index.insert([100.0, 100.0, 100.0], 10, "E3").unwrap();

    assert!(index.remove(e2));
    let found = index.lookup([100.0, 100.0, 100.0], 10).unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.contains(&e1));
    assert!(found.contains(&e3));
    assert!(!index.remove(e2));
}

#[test]
fn scenario_c_update_across_cells() {
    let index = octree();
    let m = index.insert([300.0, 300.0, 300.0], 10, "M").unwrap();
    index.update(m, [3000.0, 3000.0, 3000.0], 10).unwrap();

    assert!(index.lookup([300.0, 300.0, 300.0], 10).unwrap().is_empty());
    assert_eq!(index.lookup([3000.0, 3000.0, 3000.0], 10).unwrap(), vec![m]);
}

#[test]
fn scenario_d_k_nearest_returns_two_closest_in_order() {
    let index = octree();
    let n1 = index.insert([100.0, 100.0, 100.0], 15, "N1").unwrap();
    let n2 = index.insert([110.0, 110.0, 110.0], 15, "N2").unwrap();
    index.insert([200.0, 200.0, 200.0], 15, "N3").unwrap();
    index.insert([500.0, 500.0, 500.0], 15, "N4").unwrap();

    let result = index.k_nearest([105.0, 105.0, 105.0], 2, f64::INFINITY).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result[0].0, n1);
    assert_eq!(result[1].0, n2);
    assert!(result[0].1 <= result[1].1);
}

#[test]
fn scenario_e_negative_coords_rejected_and_index_unchanged() {
    let index = octree();
    let before = index.stats();
    let result = index.insert([-10.0, 50.0, 50.0], 10, "x");
    assert!(matches!(result, Err(LucienError::NegativeCoord(_))));
    assert_eq!(index.stats(), before);
}

#[test]
fn knn_cache_hits_on_repeated_query_and_invalidates_on_mutation() {
    let index = octree();
    index.insert([10.0, 10.0, 10.0], 12, "a").unwrap();
    index.insert([20.0, 20.0, 20.0], 12, "b").unwrap();

    let _ = index.k_nearest([10.0, 10.0, 10.0], 1, f64::INFINITY).unwrap();
    let before = index.cache_stats();
    let _ = index.k_nearest([10.0, 10.0, 10.0], 1, f64::INFINITY).unwrap();
    let after_hit = index.cache_stats();
    assert_eq!(after_hit.hits, before.hits + 1);

    index.insert([15.0, 15.0, 15.0], 12, "c").unwrap();
    let _ = index.k_nearest([10.0, 10.0, 10.0], 1, f64::INFINITY).unwrap();
    let after_mutation = index.cache_stats();
    assert_eq!(after_mutation.misses, before.misses + 1, "version bump must force a recompute");
}
