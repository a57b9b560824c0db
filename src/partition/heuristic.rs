//! Greedy naming-category partitioner.
//!
//! Units are assigned in original source order: categorized units join or
//! open the cluster named for their category; uncategorized units join
//! the cluster of the already-assigned unit with the strongest data
//! affinity (at least 0.5), falling back to the shared "core" cluster.
//! Size bounds are then enforced by the shared split and merge steps.

use super::{finalize, merge_undersized, split_oversized, Partitioner, WorkingCluster};
use crate::affinity::{categorize, data_affinity, AffinityMatrix};
use crate::config::DecompositionConfig;
use crate::core::{CallableUnit, ServiceCluster};
use crate::errors::DecomposeError;
use crate::graph::DependencyGraph;

pub struct HeuristicPartitioner;

impl Partitioner for HeuristicPartitioner {
    fn partition(
        &self,
        units: &[CallableUnit],
        graph: &DependencyGraph,
        affinity: &AffinityMatrix,
        config: &DecompositionConfig,
    ) -> Result<Vec<ServiceCluster>, DecomposeError> {
        let mut clusters: Vec<WorkingCluster> = Vec::new();

        for (index, unit) in units.iter().enumerate() {
            if let Some(category) = categorize(&unit.name) {
                match clusters.iter_mut().find(|c| c.name == category) {
                    Some(cluster) => cluster.members.push(index),
                    None => clusters.push(WorkingCluster::seeded(category, index)),
                }
                continue;
            }

            match best_data_cluster(unit, units, &clusters) {
                Some(position) => clusters[position].members.push(index),
                None => match clusters.iter_mut().find(|c| c.name == "core") {
                    Some(core) => core.members.push(index),
                    None => clusters.push(WorkingCluster::seeded("core", index)),
                },
            }
        }

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

/// Cluster holding the assigned unit with the strongest data affinity to
/// `unit`, when that affinity reaches 0.5. Earlier clusters win ties
/// because only a strictly stronger score replaces the current best.
fn best_data_cluster(
    unit: &CallableUnit,
    units: &[CallableUnit],
    clusters: &[WorkingCluster],
) -> Option<usize> {
    let mut best: Option<(f64, usize)> = None;
    for (position, cluster) in clusters.iter().enumerate() {
        for &member in &cluster.members {
            let score = data_affinity(unit, &units[member]);
            if score < 0.5 {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_score, _)) => score > best_score,
            };
            if better {
                best = Some((score, position));
            }
        }
    }
    best.map(|(_, position)| position)
}
