//! Deterministic partitioning of callable units into service clusters.
//!
//! Two strategies behind one trait, selected at configuration time:
//! greedy naming-category assignment ([`HeuristicPartitioner`]) and label
//! propagation over the affinity graph ([`GraphCommunityPartitioner`]).
//! Both share the same size enforcement: oversized clusters split into
//! source-order chunks, undersized clusters merge into the largest
//! data-related cluster with room. Output is always a strict partition of
//! the unit set.

pub mod community;
pub mod heuristic;

pub use community::GraphCommunityPartitioner;
pub use heuristic::HeuristicPartitioner;

use crate::affinity::{data_affinity, AffinityMatrix};
use crate::config::{DecompositionConfig, PartitionStrategy};
use crate::core::{CallableUnit, ServiceCluster};
use crate::errors::DecomposeError;
use crate::graph::DependencyGraph;
use std::collections::{BTreeMap, BTreeSet};

pub trait Partitioner {
    fn partition(
        &self,
        units: &[CallableUnit],
        graph: &DependencyGraph,
        affinity: &AffinityMatrix,
        config: &DecompositionConfig,
    ) -> Result<Vec<ServiceCluster>, DecomposeError>;
}

/// Strategy selection happens here, not at scattered call sites.
pub fn partitioner_for(strategy: PartitionStrategy) -> Box<dyn Partitioner> {
    match strategy {
        PartitionStrategy::Heuristic => Box::new(HeuristicPartitioner),
        PartitionStrategy::GraphCommunity => Box::new(GraphCommunityPartitioner::default()),
    }
}

/// Cluster under construction; position in the vec is its creation index.
#[derive(Debug, Clone)]
pub(crate) struct WorkingCluster {
    pub name: String,
    pub members: Vec<usize>,
}

impl WorkingCluster {
    pub(crate) fn seeded(name: &str, member: usize) -> Self {
        Self {
            name: name.to_string(),
            members: vec![member],
        }
    }
}

/// Split clusters above `max_size` into source-order chunks of at most
/// `max_size` members; parts are renamed `<name>_1`, `<name>_2`, ...
pub(crate) fn split_oversized(
    clusters: Vec<WorkingCluster>,
    max_size: usize,
) -> Vec<WorkingCluster> {
    let mut split = Vec::new();
    for cluster in clusters {
        if cluster.members.len() <= max_size {
            split.push(cluster);
            continue;
        }
        for (part, chunk) in cluster.members.chunks(max_size).enumerate() {
            split.push(WorkingCluster {
                name: format!("{}_{}", cluster.name, part + 1),
                members: chunk.to_vec(),
            });
        }
    }
    split
}

/// Merge clusters below `min_size` into the largest cluster sharing any
/// nonzero data affinity that still fits under `max_size`; else into
/// "core" if it fits. A cluster with no admissible target is kept: the
/// size bound dominates the minimum, and merged clusters are never
/// re-split.
pub(crate) fn merge_undersized(
    clusters: &mut Vec<WorkingCluster>,
    units: &[CallableUnit],
    min_size: usize,
    max_size: usize,
) {
    let mut position = 0;
    while position < clusters.len() {
        if clusters[position].members.len() >= min_size {
            position += 1;
            continue;
        }
        match merge_target(clusters, units, position, max_size) {
            Some(target) => {
                let merged = clusters.remove(position);
                let target = if target > position { target - 1 } else { target };
                clusters[target].members.extend(merged.members);
                clusters[target].members.sort_unstable();
                position = 0;
            }
            None => position += 1,
        }
    }
}

fn merge_target(
    clusters: &[WorkingCluster],
    units: &[CallableUnit],
    undersized: usize,
    max_size: usize,
) -> Option<usize> {
    let small = &clusters[undersized];
    let mut best: Option<usize> = None;
    for (candidate, cluster) in clusters.iter().enumerate() {
        if candidate == undersized || cluster.members.len() + small.members.len() > max_size {
            continue;
        }
        if !shares_any_data(small, cluster, units) {
            continue;
        }
        // Largest wins; earlier creation index wins ties because only a
        // strictly larger candidate replaces the current best.
        let better = match best {
            None => true,
            Some(current) => cluster.members.len() > clusters[current].members.len(),
        };
        if better {
            best = Some(candidate);
        }
    }
    best.or_else(|| {
        clusters
            .iter()
            .enumerate()
            .find(|(candidate, cluster)| {
                *candidate != undersized
                    && cluster.name == "core"
                    && cluster.members.len() + small.members.len() <= max_size
            })
            .map(|(candidate, _)| candidate)
    })
}

fn shares_any_data(a: &WorkingCluster, b: &WorkingCluster, units: &[CallableUnit]) -> bool {
    a.members.iter().any(|&m| {
        b.members
            .iter()
            .any(|&n| data_affinity(&units[m], &units[n]) > 0.0)
    })
}

/// Turn working clusters into final clusters with derived metrics, and
/// verify the strict-partition invariant.
pub(crate) fn finalize(
    mut clusters: Vec<WorkingCluster>,
    units: &[CallableUnit],
    graph: &DependencyGraph,
    affinity: &AffinityMatrix,
) -> Result<Vec<ServiceCluster>, DecomposeError> {
    for cluster in &mut clusters {
        cluster.members.sort_unstable();
    }
    dedupe_names(&mut clusters);
    verify_partition(&clusters, units.len())?;

    let finalized = clusters
        .into_iter()
        .enumerate()
        .map(|(creation_index, cluster)| {
            let member_set: BTreeSet<usize> = cluster.members.iter().copied().collect();
            ServiceCluster {
                shared_data: shared_data(&cluster.members, units),
                external_calls: external_calls(&cluster.members, &member_set, units, graph),
                cohesion: cohesion(&cluster.members, affinity),
                coupling: coupling_ratio(&cluster.members, &member_set, units, graph),
                name: cluster.name,
                creation_index,
                members: cluster.members,
            }
        })
        .collect();
    Ok(finalized)
}

fn dedupe_names(clusters: &mut [WorkingCluster]) {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for cluster in clusters.iter_mut() {
        let count = seen.entry(cluster.name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            cluster.name = format!("{}_{}", cluster.name, count);
        }
    }
}

fn verify_partition(clusters: &[WorkingCluster], unit_count: usize) -> Result<(), DecomposeError> {
    let mut assigned = BTreeSet::new();
    for cluster in clusters {
        if cluster.members.is_empty() {
            return Err(DecomposeError::synthesis(format!(
                "cluster {} is empty",
                cluster.name
            )));
        }
        for &member in &cluster.members {
            if !assigned.insert(member) {
                return Err(DecomposeError::synthesis(format!(
                    "unit {} assigned to more than one cluster",
                    member
                )));
            }
        }
    }
    if assigned.len() != unit_count {
        return Err(DecomposeError::synthesis(format!(
            "{} of {} units left unassigned",
            unit_count - assigned.len(),
            unit_count
        )));
    }
    Ok(())
}

/// Attributes touched by at least two members.
fn shared_data(members: &[usize], units: &[CallableUnit]) -> BTreeSet<String> {
    let mut touch_counts: BTreeMap<String, usize> = BTreeMap::new();
    for &member in members {
        for attribute in units[member].data_footprint() {
            *touch_counts.entry(attribute).or_insert(0) += 1;
        }
    }
    touch_counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(attribute, _)| attribute)
        .collect()
}

fn external_calls(
    members: &[usize],
    member_set: &BTreeSet<usize>,
    units: &[CallableUnit],
    graph: &DependencyGraph,
) -> BTreeSet<String> {
    let mut externals = BTreeSet::new();
    for &member in members {
        for external in graph.external_calls_of(member) {
            externals.insert(external.name.clone());
        }
        for callee in graph.callees(member) {
            if !member_set.contains(&callee) {
                externals.insert(units[callee].qualified_name.clone());
            }
        }
    }
    externals
}

fn cohesion(members: &[usize], affinity: &AffinityMatrix) -> f64 {
    if members.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            total += affinity.get(a, b);
            pairs += 1;
        }
    }
    total / pairs as f64
}

fn coupling_ratio(
    members: &[usize],
    member_set: &BTreeSet<usize>,
    units: &[CallableUnit],
    graph: &DependencyGraph,
) -> f64 {
    external_calls(members, member_set, units, graph).len() as f64 / members.len() as f64
}
