//! Affinity scoring between callable units.
//!
//! Three signals, combined by configured weights and clamped to [0, 1]:
//! naming category (same category 1.0, one side uncategorized 0.5),
//! Jaccard similarity over the units' attribute footprints, and call
//! adjacency (direct edge 1.0, shared neighbor 0.5). Pairs are scored in
//! (lo, hi) source order with a fixed summation order, so identical
//! graphs produce bit-identical matrices.

pub mod categories;

pub use categories::{categorize, NamingCategory, NAMING_TAXONOMY};

use crate::config::AffinityWeights;
use crate::core::CallableUnit;
use crate::graph::DependencyGraph;
use std::collections::BTreeMap;

/// Symmetric pairwise affinity, keyed by ordered (lo, hi) unit indices.
#[derive(Debug, Clone, PartialEq)]
pub struct AffinityMatrix {
    scores: BTreeMap<(usize, usize), f64>,
}

impl AffinityMatrix {
    /// Affinity between two distinct units. Symmetric by construction.
    pub fn get(&self, a: usize, b: usize) -> f64 {
        debug_assert_ne!(a, b, "affinity is undefined for a unit with itself");
        let key = if a < b { (a, b) } else { (b, a) };
        self.scores.get(&key).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.scores.iter().map(|(&(a, b), &score)| (a, b, score))
    }
}

/// Score every unit pair from the dependency graph and unit data.
pub fn score(
    units: &[CallableUnit],
    graph: &DependencyGraph,
    weights: &AffinityWeights,
) -> AffinityMatrix {
    let mut scores = BTreeMap::new();
    for a in 0..units.len() {
        for b in (a + 1)..units.len() {
            let naming = naming_affinity(&units[a], &units[b]);
            let data = data_affinity(&units[a], &units[b]);
            let calls = call_affinity(graph, a, b);
            let combined =
                (weights.naming * naming + weights.data * data + weights.calls * calls)
                    .clamp(0.0, 1.0);
            scores.insert((a, b), combined);
        }
    }
    AffinityMatrix { scores }
}

/// 1.0 for the same keyword category, 0.5 when exactly one side is
/// uncategorized, 0.0 otherwise (including both uncategorized).
pub fn naming_affinity(a: &CallableUnit, b: &CallableUnit) -> f64 {
    match (categorize(&a.name), categorize(&b.name)) {
        (Some(cat_a), Some(cat_b)) if cat_a == cat_b => 1.0,
        (Some(_), None) | (None, Some(_)) => 0.5,
        _ => 0.0,
    }
}

/// Jaccard similarity over the units' attribute footprints; 0.0 when
/// either footprint is empty.
pub fn data_affinity(a: &CallableUnit, b: &CallableUnit) -> f64 {
    let footprint_a = a.data_footprint();
    let footprint_b = b.data_footprint();
    if footprint_a.is_empty() || footprint_b.is_empty() {
        return 0.0;
    }
    let shared = footprint_a.intersection(&footprint_b).count();
    let total = footprint_a.union(&footprint_b).count();
    shared as f64 / total as f64
}

/// 1.0 for a direct call edge in either direction, 0.5 for a shared
/// caller-or-callee neighbor, else 0.0.
pub fn call_affinity(graph: &DependencyGraph, a: usize, b: usize) -> f64 {
    if graph.has_edge(a, b) || graph.has_edge(b, a) {
        1.0
    } else if graph.shares_neighbor(a, b) {
        0.5
    } else {
        0.0
    }
}
