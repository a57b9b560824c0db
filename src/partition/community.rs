//! Label-propagation partitioner over the affinity graph.
//!
//! The alternative to the greedy heuristic when affinity structure is
//! rich: units vote for their neighbors' labels, weighted by affinity,
//! until labels stabilize. Everything is fixed-order and tie-broken by
//! the smallest label, so the outcome is deterministic. Size bounds are
//! enforced by the shared split and merge steps afterwards.

use super::{finalize, merge_undersized, split_oversized, Partitioner, WorkingCluster};
use crate::affinity::{categorize, AffinityMatrix, NAMING_TAXONOMY};
use crate::config::DecompositionConfig;
use crate::core::{CallableUnit, ServiceCluster};
use crate::errors::DecomposeError;
use crate::graph::DependencyGraph;
use std::collections::BTreeMap;

pub struct GraphCommunityPartitioner {
    /// Minimum affinity for a pair to count as a propagation edge
    pub edge_threshold: f64,
    /// Sweep budget; propagation almost always stabilizes much earlier
    pub max_sweeps: usize,
}

impl Default for GraphCommunityPartitioner {
    fn default() -> Self {
        // 0.25 admits any single meaningful signal (a direct call edge
        // alone scores 0.3 under default weights) without admitting noise.
        Self {
            edge_threshold: 0.25,
            max_sweeps: 16,
        }
    }
}

impl Partitioner for GraphCommunityPartitioner {
    fn partition(
        &self,
        units: &[CallableUnit],
        graph: &DependencyGraph,
        affinity: &AffinityMatrix,
        config: &DecompositionConfig,
    ) -> Result<Vec<ServiceCluster>, DecomposeError> {
        let labels = self.propagate(units.len(), affinity);

        // Group by final label; clusters ordered by first member, members
        // already ascending because sweep order is ascending.
        let mut communities: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (unit, &label) in labels.iter().enumerate() {
            communities.entry(label).or_default().push(unit);
        }
        let mut grouped: Vec<Vec<usize>> = communities.into_values().collect();
        grouped.sort_by_key(|members| members[0]);

        let clusters = grouped
            .into_iter()
            .map(|members| WorkingCluster {
                name: dominant_category(&members, units).to_string(),
                members,
            })
            .collect();

        let mut clusters = split_oversized(clusters, config.max_cluster_size);
        merge_undersized(
            &mut clusters,
            units,
            config.min_cluster_size,
            config.max_cluster_size,
        );
        finalize(clusters, units, graph, affinity)
    }
}

impl GraphCommunityPartitioner {
    fn propagate(&self, unit_count: usize, affinity: &AffinityMatrix) -> Vec<usize> {
        let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); unit_count];
        for (a, b, score) in affinity.iter() {
            if score >= self.edge_threshold {
                adjacency[a].push((b, score));
                adjacency[b].push((a, score));
            }
        }

        let mut labels: Vec<usize> = (0..unit_count).collect();
        for _ in 0..self.max_sweeps {
            let mut changed = false;
            for unit in 0..unit_count {
                let Some(winner) = weighted_vote(&adjacency[unit], &labels) else {
                    continue;
                };
                if winner != labels[unit] {
                    labels[unit] = winner;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        labels
    }
}

/// Label with the highest affinity-weighted vote; smallest label wins
/// ties via ascending map iteration and strict comparison.
fn weighted_vote(neighbors: &[(usize, f64)], labels: &[usize]) -> Option<usize> {
    if neighbors.is_empty() {
        return None;
    }
    let mut votes: BTreeMap<usize, f64> = BTreeMap::new();
    for &(neighbor, weight) in neighbors {
        *votes.entry(labels[neighbor]).or_insert(0.0) += weight;
    }
    let mut winner = None;
    let mut best_weight = f64::NEG_INFINITY;
    for (&label, &weight) in &votes {
        if weight > best_weight {
            best_weight = weight;
            winner = Some(label);
        }
    }
    winner
}

/// Most common naming category among members; ties resolve in taxonomy
/// declaration order; communities without a categorized member are "core".
fn dominant_category(members: &[usize], units: &[CallableUnit]) -> &'static str {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for &member in members {
        if let Some(category) = categorize(&units[member].name) {
            *counts.entry(category).or_insert(0) += 1;
        }
    }
    let mut best = "core";
    let mut best_count = 0;
    for category in NAMING_TAXONOMY.iter() {
        if let Some(&count) = counts.get(category.name) {
            if count > best_count {
                best_count = count;
                best = category.name;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity;
    use crate::analyzers::parse_module;
    use crate::config::AffinityWeights;
    use std::path::Path;

    fn partition_source(code: &str, config: &DecompositionConfig) -> Vec<ServiceCluster> {
        let parsed = parse_module(code, Path::new("test.py")).unwrap();
        let graph = DependencyGraph::build(&parsed.units);
        let matrix = affinity::score(&parsed.units, &graph, &AffinityWeights::default());
        GraphCommunityPartitioner::default()
            .partition(&parsed.units, &graph, &matrix, config)
            .unwrap()
    }

    #[test]
    fn tightly_coupled_methods_form_one_community() {
        let clusters = partition_source(
            r#"
class Report:
    def load_rows(self):
        return self.rows

    def load_headers(self):
        return self.rows

    def render_summary(self):
        self.emit_cell()

    def emit_cell(self):
        self.emit_cell_raw()

    def emit_cell_raw(self):
        pass
"#,
            &DecompositionConfig {
                min_cluster_size: 1,
                ..Default::default()
            },
        );
        // load_rows/load_headers share data; the emit chain shares calls
        let loaders = clusters
            .iter()
            .find(|c| c.members.contains(&0))
            .expect("loader cluster");
        assert!(loaders.members.contains(&1));
        let emitters = clusters
            .iter()
            .find(|c| c.members.contains(&3))
            .expect("emitter cluster");
        assert!(emitters.members.contains(&4));
        assert!(!loaders.members.contains(&3));
    }

    #[test]
    fn propagation_is_deterministic() {
        let code = r#"
class Svc:
    def validate_a(self):
        return self.schema

    def validate_b(self):
        return self.schema

    def fetch_rows(self):
        return self.db

    def fetch_cols(self):
        return self.db
"#;
        let run = |_: ()| {
            partition_source(
                code,
                &DecompositionConfig {
                    min_cluster_size: 1,
                    ..Default::default()
                },
            )
        };
        assert_eq!(run(()), run(()));
    }

    #[test]
    fn isolated_units_keep_their_own_label_then_merge() {
        let clusters = partition_source(
            r#"
class Solo:
    def alpha(self):
        pass

    def beta(self):
        pass
"#,
            &DecompositionConfig::default(),
        );
        // no affinity edges at all: two singleton communities, both named
        // core, deduped and then merged by the min-size step
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1]);
    }

    #[test]
    fn community_partition_still_covers_all_units() {
        let mut code = String::from("class Wide:\n");
        for i in 1..=25 {
            code.push_str(&format!(
                "    def validate_{i}(self):\n        return self.schema\n\n"
            ));
        }
        let clusters = partition_source(&code, &DecompositionConfig::default());
        let mut seen: Vec<usize> = clusters.iter().flat_map(|c| c.members.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..25).collect::<Vec<_>>());
        assert!(clusters.iter().all(|c| c.members.len() <= 20));
    }
}
