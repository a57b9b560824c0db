// Export modules for library usage
pub mod affinity;
pub mod analyzers;
pub mod config;
pub mod core;
pub mod errors;
pub mod graph;
pub mod io;
pub mod partition;
pub mod pipeline;
pub mod report;
pub mod synthesis;

// Re-export commonly used types
pub use crate::core::{
    CallReceiver, CallableUnit, ClusterMetrics, DecompositionManifest, DecompositionStatus,
    GeneratedModule, RawCall, ServiceCluster, WrappedBlock,
};

pub use crate::config::{
    AffinityWeights, DecompositionConfig, GodObjectThresholds, PartitionStrategy,
};

pub use crate::errors::{DecomposeError, UnresolvedDependency};

pub use crate::analyzers::{parse_module, ImportStatement, ParsedModule};

pub use crate::affinity::{categorize, score, AffinityMatrix};

pub use crate::graph::{DependencyGraph, ExternalCall};

pub use crate::partition::{
    partitioner_for, GraphCommunityPartitioner, HeuristicPartitioner, Partitioner,
};

pub use crate::synthesis::synthesize;

pub use crate::pipeline::{decompose_file, decompose_source, RunContext};

pub use crate::report::{render_manifest, write_manifest};
