//! Core data types for god object decomposition.
//!
//! Everything here is pure data: callable units extracted from a parsed
//! file, service clusters produced by partitioning, generated modules
//! produced by synthesis, and the manifest that records a run. Collections
//! are `BTreeSet`/`BTreeMap` so iteration order is stable across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// How a call expression names its target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallReceiver {
    /// Bare name call: `helper()`
    Bare,
    /// Method call on `self`: `self.validate()`
    SelfMethod,
    /// Call through an explicit type or module name: `Config.load()`
    Named(String),
    /// Receiver is a computed expression; the target cannot be resolved statically
    Dynamic,
}

/// A call expression as seen at parse time, before graph resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RawCall {
    pub name: String,
    pub receiver: CallReceiver,
}

/// A function or method extracted from the analyzed file.
///
/// Created once per parse and immutable afterwards. Line ranges are
/// 1-based, inclusive, include decorators, and are authoritative for
/// source slicing during synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableUnit {
    /// Owning type and member joined with `.`, or the bare name
    pub qualified_name: String,
    /// Member name without the owning type
    pub name: String,
    /// Innermost enclosing class, if any
    pub owning_type: Option<String>,
    /// Parameter names in declaration order; varargs keep their `*`/`**` prefix
    pub parameters: Vec<String>,
    /// Verbatim return annotation text, if present
    pub return_annotation: Option<String>,
    /// Attributes of `self` read by the body
    pub accessed_attributes: BTreeSet<String>,
    /// Attributes of `self` written by the body
    pub modified_attributes: BTreeSet<String>,
    /// Call expressions in the body, receiver shape preserved
    pub calls: Vec<RawCall>,
    /// Cyclomatic complexity estimate, always >= 1
    pub complexity: u32,
    pub start_line: usize,
    pub end_line: usize,
    /// Defined inside another callable; analyzed like any unit but its
    /// source travels with the enclosing unit's slice during synthesis
    pub nested: bool,
}

impl CallableUnit {
    /// Public per Python naming conventions: dunders are public, a single
    /// leading underscore is private.
    pub fn is_public(&self) -> bool {
        !self.name.starts_with('_')
            || (self.name.starts_with("__") && self.name.ends_with("__") && self.name.len() > 4)
    }

    /// Union of accessed and modified attributes.
    pub fn data_footprint(&self) -> BTreeSet<String> {
        self.accessed_attributes
            .union(&self.modified_attributes)
            .cloned()
            .collect()
    }

    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// A named, non-empty subset of callable units with derived metrics.
///
/// Across all clusters for a file, membership is a strict partition of the
/// unit set. Members are stored as indices into the parsed unit list, in
/// source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCluster {
    pub name: String,
    /// Position in cluster creation order; used for deterministic tie-breaks
    pub creation_index: usize,
    pub members: Vec<usize>,
    /// Attributes touched by at least two members
    pub shared_data: BTreeSet<String>,
    /// Qualified names of intra-file units outside the cluster plus
    /// out-of-file symbols called by members
    pub external_calls: BTreeSet<String>,
    /// Mean pairwise affinity between members; 0.0 for singletons
    pub cohesion: f64,
    /// |external calls| / |members|
    pub coupling: f64,
}

impl ServiceCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, unit: usize) -> bool {
        self.members.contains(&unit)
    }
}

/// Methods of one original class regrouped under a wrapper type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedBlock {
    pub class_name: String,
    /// Verbatim member slices in source order
    pub slices: Vec<String>,
}

/// One output file: a cluster module or the facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedModule {
    /// Path relative to the output directory
    pub path: PathBuf,
    /// Ordered verbatim import statements
    pub imports: Vec<String>,
    /// Wrapped method blocks, one per owning type present in the cluster
    pub classes: Vec<WrappedBlock>,
    /// Module-scope callables: verbatim slices, or delegation defs in the facade
    pub functions: Vec<String>,
    pub is_facade: bool,
}

impl GeneratedModule {
    /// Render the module to emitted source text.
    pub fn render(&self, source_name: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Generated by splitmap from {}\n", source_name));
        if self.is_facade {
            out.push_str("# Compatibility facade: original public interface, delegating to extracted modules\n");
        }
        if !self.imports.is_empty() {
            out.push('\n');
            for import in &self.imports {
                out.push_str(import);
                out.push('\n');
            }
        }
        for class in &self.classes {
            out.push_str(&format!("\n\nclass {}:\n", class.class_name));
            for (i, slice) in class.slices.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                out.push_str(slice);
                out.push('\n');
            }
        }
        for function in &self.functions {
            out.push_str("\n\n");
            out.push_str(function);
            out.push('\n');
        }
        out
    }
}

/// Per-cluster entry in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub name: String,
    pub member_count: usize,
    /// Mean intra-cluster pairwise affinity, in [0, 1]
    pub cohesion: f64,
    /// External-call ratio, >= 0
    pub coupling: f64,
}

/// Outcome of one file's decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionStatus {
    Success,
    Failed,
    Skipped,
}

/// Record of one file's run, created once at run end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionManifest {
    pub source_file: PathBuf,
    pub original_loc: usize,
    /// Generated file paths in emission order: cluster modules, then facade
    pub generated_files: Vec<PathBuf>,
    pub clusters: Vec<ClusterMetrics>,
    pub status: DecompositionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unresolved-dependency warnings accumulated during analysis
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
