//! Configuration for the decomposition pipeline.
//!
//! Everything an orchestrator can tune lives here: cluster size bounds,
//! affinity weights, god-object thresholds, partition strategy, output
//! directory, and the per-file timeout. Configs deserialize from TOML so
//! embedding tools can ship a config file alongside their own.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Weights for the three affinity signals. Active weights must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffinityWeights {
    /// Weight for the naming-category signal (0.0-1.0)
    #[serde(default = "default_naming_weight")]
    pub naming: f64,

    /// Weight for the shared-data signal (0.0-1.0)
    #[serde(default = "default_data_weight")]
    pub data: f64,

    /// Weight for the call-adjacency signal (0.0-1.0)
    #[serde(default = "default_calls_weight")]
    pub calls: f64,
}

fn default_naming_weight() -> f64 {
    0.3
}

fn default_data_weight() -> f64 {
    0.4
}

fn default_calls_weight() -> f64 {
    0.3
}

impl Default for AffinityWeights {
    fn default() -> Self {
        Self {
            naming: default_naming_weight(),
            data: default_data_weight(),
            calls: default_calls_weight(),
        }
    }
}

impl AffinityWeights {
    fn is_valid_weight(weight: f64) -> bool {
        (0.0..=1.0).contains(&weight)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (weight, name) in [
            (self.naming, "naming"),
            (self.data, "data"),
            (self.calls, "calls"),
        ] {
            if !Self::is_valid_weight(weight) {
                return Err(format!("{} weight must be between 0.0 and 1.0", name));
            }
        }
        let sum = self.naming + self.data + self.calls;
        if (sum - 1.0).abs() > 0.001 {
            return Err(format!(
                "affinity weights must sum to 1.0, but sum to {:.3}",
                sum
            ));
        }
        Ok(())
    }
}

/// Thresholds above which a file is treated as a god object.
///
/// A file qualifies when its callable count or line count exceeds either
/// bound; files under both are skipped without output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GodObjectThresholds {
    #[serde(default = "default_max_methods")]
    pub max_methods: usize,

    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

fn default_max_methods() -> usize {
    20
}

fn default_max_lines() -> usize {
    500
}

impl Default for GodObjectThresholds {
    fn default() -> Self {
        Self {
            max_methods: default_max_methods(),
            max_lines: default_max_lines(),
        }
    }
}

impl GodObjectThresholds {
    /// True when the file is large enough to decompose.
    pub fn qualifies(&self, method_count: usize, line_count: usize) -> bool {
        method_count > self.max_methods || line_count > self.max_lines
    }
}

/// Partitioning strategy, selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Greedy naming-category assignment with data-affinity fallback
    #[default]
    Heuristic,
    /// Label propagation over the affinity graph
    GraphCommunity,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionConfig {
    #[serde(default = "default_max_cluster_size")]
    pub max_cluster_size: usize,

    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,

    /// Per-file analysis budget in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Write the manifest JSON next to the generated files
    #[serde(default = "default_emit_manifest")]
    pub emit_manifest: bool,

    #[serde(default)]
    pub strategy: PartitionStrategy,

    #[serde(default)]
    pub weights: AffinityWeights,

    #[serde(default)]
    pub thresholds: GodObjectThresholds,
}

fn default_max_cluster_size() -> usize {
    20
}

fn default_min_cluster_size() -> usize {
    2
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("decomposed")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_emit_manifest() -> bool {
    true
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            max_cluster_size: default_max_cluster_size(),
            min_cluster_size: default_min_cluster_size(),
            output_directory: default_output_directory(),
            timeout_secs: default_timeout_secs(),
            emit_manifest: default_emit_manifest(),
            strategy: PartitionStrategy::default(),
            weights: AffinityWeights::default(),
            thresholds: GodObjectThresholds::default(),
        }
    }
}

impl DecompositionConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: DecompositionConfig = toml::from_str(content)?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_cluster_size == 0 {
            return Err("max_cluster_size must be at least 1".to_string());
        }
        if self.min_cluster_size > self.max_cluster_size {
            return Err(format!(
                "min_cluster_size ({}) exceeds max_cluster_size ({})",
                self.min_cluster_size, self.max_cluster_size
            ));
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be nonzero".to_string());
        }
        self.weights.validate()
    }
}
