//! Property tests over synthetic unit sets: affinity symmetry and
//! clamping, scoring determinism, and strict partition coverage under
//! arbitrary size bounds.

use proptest::prelude::*;
use splitmap::{
    score, AffinityWeights, CallReceiver, CallableUnit, DecompositionConfig, DependencyGraph,
    HeuristicPartitioner, Partitioner, RawCall,
};
use std::collections::BTreeSet;

const BASE_NAMES: &[&str] = &[
    "validate_input",
    "process_batch",
    "fetch_rows",
    "save_state",
    "convert_units",
    "calculate_total",
    "init_pool",
    "helper_join",
    "frobnicate",
    "quux",
];

const ATTRIBUTES: &[&str] = &["schema", "cache", "state", "rows", "pool"];

/// (base name pick, attribute bitmask, optional call target) per unit.
fn raw_units() -> impl Strategy<Value = Vec<(usize, u8, Option<usize>)>> {
    prop::collection::vec(
        (0..BASE_NAMES.len(), 0..32u8, prop::option::of(0..64usize)),
        2..32,
    )
}

fn build_units(raw: &[(usize, u8, Option<usize>)]) -> Vec<CallableUnit> {
    let count = raw.len();
    raw.iter()
        .enumerate()
        .map(|(index, &(name_pick, attribute_mask, call_pick))| {
            let name = format!("{}_{}", BASE_NAMES[name_pick], index);
            let accessed: BTreeSet<String> = ATTRIBUTES
                .iter()
                .enumerate()
                .filter(|(bit, _)| attribute_mask & (1 << bit) != 0)
                .map(|(_, attr)| attr.to_string())
                .collect();
            let calls = call_pick
                .map(|target| {
                    let target = target % count;
                    vec![RawCall {
                        name: format!("{}_{}", BASE_NAMES[raw[target].0], target),
                        receiver: CallReceiver::Bare,
                    }]
                })
                .unwrap_or_default();
            CallableUnit {
                qualified_name: name.clone(),
                name,
                owning_type: None,
                parameters: vec![],
                return_annotation: None,
                accessed_attributes: accessed,
                modified_attributes: BTreeSet::new(),
                calls,
                complexity: 1,
                start_line: index * 3 + 1,
                end_line: index * 3 + 2,
                nested: false,
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn affinity_is_symmetric_and_clamped(raw in raw_units()) {
        let units = build_units(&raw);
        let graph = DependencyGraph::build(&units);
        let matrix = score(&units, &graph, &AffinityWeights::default());

        for a in 0..units.len() {
            for b in 0..units.len() {
                if a == b {
                    continue;
                }
                let forward = matrix.get(a, b);
                let backward = matrix.get(b, a);
                prop_assert_eq!(forward.to_bits(), backward.to_bits());
                prop_assert!((0.0..=1.0).contains(&forward));
            }
        }
    }

    #[test]
    fn scoring_identical_input_is_bit_identical(raw in raw_units()) {
        let units = build_units(&raw);
        let graph = DependencyGraph::build(&units);
        let weights = AffinityWeights::default();
        prop_assert_eq!(
            score(&units, &graph, &weights),
            score(&units, &graph, &weights)
        );
    }

    #[test]
    fn heuristic_partition_is_a_strict_cover(
        raw in raw_units(),
        min_size in 1usize..4,
        extra in 0usize..20,
    ) {
        let max_size = min_size + 1 + extra;
        let units = build_units(&raw);
        let graph = DependencyGraph::build(&units);
        let matrix = score(&units, &graph, &AffinityWeights::default());
        let config = DecompositionConfig {
            min_cluster_size: min_size,
            max_cluster_size: max_size,
            ..Default::default()
        };

        let clusters = HeuristicPartitioner
            .partition(&units, &graph, &matrix, &config)
            .unwrap();

        let mut seen: Vec<usize> = clusters.iter().flat_map(|c| c.members.clone()).collect();
        seen.sort_unstable();
        let expected: Vec<usize> = (0..units.len()).collect();
        prop_assert_eq!(seen, expected);
        prop_assert!(clusters.iter().all(|c| !c.members.is_empty()));
        prop_assert!(clusters.iter().all(|c| c.members.len() <= max_size));
    }
}
