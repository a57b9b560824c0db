//! Per-file decomposition pipeline.
//!
//! PARSE -> BUILD -> SCORE -> PARTITION -> SYNTHESIZE, run synchronously
//! for one file. The analysis stages are CPU-bound and execute on a
//! worker thread bounded by the configured timeout; output writing is
//! staged and committed only after synthesis fully succeeded. Every
//! outcome, success or not, is returned as a manifest; errors never
//! escape a file's run. Cross-file orchestration belongs to the caller.

use crate::affinity;
use crate::analyzers::parse_module;
use crate::config::DecompositionConfig;
use crate::core::{
    ClusterMetrics, DecompositionManifest, DecompositionStatus, GeneratedModule, ServiceCluster,
};
use crate::errors::{DecomposeError, UnresolvedDependency};
use crate::graph::DependencyGraph;
use crate::io::{self, StagedWriter};
use crate::partition::partitioner_for;
use crate::report;
use crate::synthesis;
use crossbeam::channel;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Run-level state threaded through the pipeline and consumed into the
/// manifest. Replaces any notion of global statistics: everything a run
/// learns about a file lives here.
#[derive(Debug)]
pub struct RunContext {
    source_path: PathBuf,
    original_loc: usize,
    warnings: Vec<UnresolvedDependency>,
}

impl RunContext {
    pub fn new(source_path: PathBuf, original_loc: usize) -> Self {
        Self {
            source_path,
            original_loc,
            warnings: Vec::new(),
        }
    }

    pub fn record_warning(&mut self, warning: UnresolvedDependency) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[UnresolvedDependency] {
        &self.warnings
    }

    fn into_manifest(
        self,
        status: DecompositionStatus,
        generated_files: Vec<PathBuf>,
        clusters: Vec<ClusterMetrics>,
        error: Option<String>,
    ) -> DecompositionManifest {
        DecompositionManifest {
            source_file: self.source_path,
            original_loc: self.original_loc,
            generated_files,
            clusters,
            status,
            error,
            warnings: self.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}

/// What the analysis stages hand back to the driver.
struct AnalysisOutcome {
    modules: Vec<GeneratedModule>,
    clusters: Vec<ClusterMetrics>,
    warnings: Vec<UnresolvedDependency>,
    /// Below the god-object thresholds; nothing to do
    below_thresholds: bool,
}

/// Decompose a file on disk. Never returns an error: every outcome is a
/// manifest, and non-success leaves the input untouched with no output.
pub fn decompose_file(path: &Path, config: &DecompositionConfig) -> DecompositionManifest {
    match io::read_file(path) {
        Ok(content) => decompose_source(&content, path, config),
        Err(err) => {
            warn!("{}: unreadable: {}", path.display(), err);
            let context = RunContext::new(path.to_path_buf(), 0);
            finish(
                context,
                config,
                DecompositionStatus::Failed,
                Vec::new(),
                Vec::new(),
                Some(err.to_string()),
            )
        }
    }
}

/// Decompose in-memory source under a logical path.
pub fn decompose_source(
    content: &str,
    logical_path: &Path,
    config: &DecompositionConfig,
) -> DecompositionManifest {
    let mut context = RunContext::new(logical_path.to_path_buf(), content.lines().count());

    if let Err(reason) = config.validate() {
        let error = DecomposeError::Config(reason);
        return finish(
            context,
            config,
            DecompositionStatus::Failed,
            Vec::new(),
            Vec::new(),
            Some(error.to_string()),
        );
    }

    let analysis = {
        let content = content.to_string();
        let logical_path = logical_path.to_path_buf();
        let config = config.clone();
        run_with_timeout(config.timeout_secs, move || {
            analyze(&content, &logical_path, &config)
        })
        .and_then(|outcome| outcome)
    };

    match analysis {
        Ok(outcome) if outcome.below_thresholds => {
            info!(
                "{}: below god-object thresholds, skipped",
                logical_path.display()
            );
            finish(
                context,
                config,
                DecompositionStatus::Skipped,
                Vec::new(),
                Vec::new(),
                None,
            )
        }
        Ok(outcome) => {
            for warning in &outcome.warnings {
                debug!("{}: {}", logical_path.display(), warning);
                context.record_warning(warning.clone());
            }
            match write_outputs(&outcome.modules, logical_path, config) {
                Ok(generated_files) => {
                    info!(
                        "{}: decomposed into {} modules",
                        logical_path.display(),
                        outcome.clusters.len()
                    );
                    finish(
                        context,
                        config,
                        DecompositionStatus::Success,
                        generated_files,
                        outcome.clusters,
                        None,
                    )
                }
                Err(err) => {
                    warn!("{}: output write failed: {}", logical_path.display(), err);
                    finish(
                        context,
                        config,
                        DecompositionStatus::Failed,
                        Vec::new(),
                        Vec::new(),
                        Some(err.to_string()),
                    )
                }
            }
        }
        Err(err @ DecomposeError::Timeout { .. }) => {
            warn!("{}: {}", logical_path.display(), err);
            finish(
                context,
                config,
                DecompositionStatus::Skipped,
                Vec::new(),
                Vec::new(),
                Some(err.to_string()),
            )
        }
        Err(err) => {
            warn!("{}: {}", logical_path.display(), err);
            finish(
                context,
                config,
                DecompositionStatus::Failed,
                Vec::new(),
                Vec::new(),
                Some(err.to_string()),
            )
        }
    }
}

/// The pure, CPU-bound part of the pipeline; runs on the worker thread.
fn analyze(
    content: &str,
    logical_path: &Path,
    config: &DecompositionConfig,
) -> Result<AnalysisOutcome, DecomposeError> {
    let parsed = parse_module(content, logical_path)?;
    debug!(
        "{}: parsed {} units, {} imports",
        logical_path.display(),
        parsed.units.len(),
        parsed.imports.len()
    );

    if !config
        .thresholds
        .qualifies(parsed.units.len(), parsed.line_count())
    {
        return Ok(AnalysisOutcome {
            modules: Vec::new(),
            clusters: Vec::new(),
            warnings: Vec::new(),
            below_thresholds: true,
        });
    }

    let graph = DependencyGraph::build(&parsed.units);
    let warnings = unresolved_warnings(&parsed.units, &graph);

    let matrix = affinity::score(&parsed.units, &graph, &config.weights);
    debug!(
        "{}: scored {} unit pairs",
        logical_path.display(),
        matrix.len()
    );

    let clusters = partitioner_for(config.strategy).partition(&parsed.units, &graph, &matrix, config)?;
    let modules = synthesis::synthesize(&parsed, &clusters)?;

    Ok(AnalysisOutcome {
        clusters: cluster_metrics(&clusters),
        modules,
        warnings,
        below_thresholds: false,
    })
}

fn unresolved_warnings(
    units: &[crate::core::CallableUnit],
    graph: &DependencyGraph,
) -> Vec<UnresolvedDependency> {
    let mut warnings = Vec::new();
    for (index, unit) in units.iter().enumerate() {
        for external in graph.external_calls_of(index) {
            if external.unknown_dependency {
                warnings.push(UnresolvedDependency {
                    unit: unit.qualified_name.clone(),
                    target: external.name.clone(),
                });
            }
        }
    }
    warnings
}

fn cluster_metrics(clusters: &[ServiceCluster]) -> Vec<ClusterMetrics> {
    clusters
        .iter()
        .map(|cluster| ClusterMetrics {
            name: cluster.name.clone(),
            member_count: cluster.members.len(),
            cohesion: cluster.cohesion,
            coupling: cluster.coupling,
        })
        .collect()
}

/// Stage every generated module, then commit; on any failure the staged
/// temporaries are removed and nothing reaches the output directory.
fn write_outputs(
    modules: &[GeneratedModule],
    logical_path: &Path,
    config: &DecompositionConfig,
) -> Result<Vec<PathBuf>, DecomposeError> {
    io::ensure_dir(&config.output_directory)
        .map_err(|err| DecomposeError::synthesis(err.to_string()))?;

    let source_name = logical_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("module");

    let mut writer = StagedWriter::new();
    for module in modules {
        let target = config.output_directory.join(&module.path);
        if let Err(err) = writer.stage(target, &module.render(source_name)) {
            writer.discard();
            return Err(DecomposeError::Io(err));
        }
    }
    Ok(writer.commit()?)
}

fn finish(
    context: RunContext,
    config: &DecompositionConfig,
    status: DecompositionStatus,
    generated_files: Vec<PathBuf>,
    clusters: Vec<ClusterMetrics>,
    error: Option<String>,
) -> DecompositionManifest {
    let manifest = context.into_manifest(status, generated_files, clusters, error);
    if config.emit_manifest {
        if let Err(err) = io::ensure_dir(&config.output_directory)
            .and_then(|_| report::write_manifest(&config.output_directory, &manifest).map(|_| ()))
        {
            warn!(
                "{}: manifest write failed: {}",
                manifest.source_file.display(),
                err
            );
        }
    }
    manifest
}

/// Run a task on a detached worker thread, waiting at most `secs`. On
/// timeout the worker keeps running to completion but its result is
/// discarded; the file is never retried within the run.
fn run_with_timeout<T: Send + 'static>(
    secs: u64,
    task: impl FnOnce() -> T + Send + 'static,
) -> Result<T, DecomposeError> {
    let (sender, receiver) = channel::bounded(1);
    thread::spawn(move || {
        let _ = sender.send(task());
    });
    receiver
        .recv_timeout(Duration::from_secs(secs))
        .map_err(|_| DecomposeError::Timeout { secs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_wrapper_returns_result_in_time() {
        let result = run_with_timeout(5, || 41 + 1).unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn timeout_wrapper_abandons_slow_tasks() {
        let err = run_with_timeout(1, || {
            thread::sleep(Duration::from_secs(3));
            0
        })
        .unwrap_err();
        assert!(matches!(err, DecomposeError::Timeout { secs: 1 }));
    }

    #[test]
    fn invalid_config_fails_the_file() {
        let config = DecompositionConfig {
            min_cluster_size: 99,
            emit_manifest: false,
            ..Default::default()
        };
        let manifest = decompose_source("def f():\n    pass\n", Path::new("m.py"), &config);
        assert_eq!(manifest.status, DecompositionStatus::Failed);
        assert!(manifest.error.unwrap().contains("invalid configuration"));
    }

    #[test]
    fn small_files_are_skipped_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = DecompositionConfig {
            output_directory: dir.path().join("out"),
            emit_manifest: false,
            ..Default::default()
        };
        let manifest = decompose_source("def f():\n    pass\n", Path::new("m.py"), &config);
        assert_eq!(manifest.status, DecompositionStatus::Skipped);
        assert!(manifest.error.is_none());
        assert!(manifest.generated_files.is_empty());
        assert!(!dir.path().join("out").join("m.py").exists());
    }

    #[test]
    fn unreadable_file_fails_with_manifest() {
        let config = DecompositionConfig {
            emit_manifest: false,
            ..Default::default()
        };
        let manifest = decompose_file(Path::new("/nonexistent/ghost.py"), &config);
        assert_eq!(manifest.status, DecompositionStatus::Failed);
        assert!(manifest.error.is_some());
    }
}
