//! Manifest emission for the orchestration layer.
//!
//! One JSON manifest per decomposed file, written next to the generated
//! modules. Serialization is field-ordered and timestamp-free, so two
//! identical runs produce byte-identical manifests.

use crate::core::DecompositionManifest;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// `<stem>_decomposition.json`
pub fn manifest_file_name(stem: &str) -> String {
    format!("{}_decomposition.json", stem)
}

pub fn render_manifest(manifest: &DecompositionManifest) -> Result<String> {
    Ok(serde_json::to_string_pretty(manifest)?)
}

/// Write the manifest into `directory` and return its path.
pub fn write_manifest(directory: &Path, manifest: &DecompositionManifest) -> Result<PathBuf> {
    let stem = manifest
        .source_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module");
    let path = directory.join(manifest_file_name(stem));
    fs::write(&path, render_manifest(manifest)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClusterMetrics, DecompositionStatus};

    fn sample() -> DecompositionManifest {
        DecompositionManifest {
            source_file: PathBuf::from("src/worker.py"),
            original_loc: 640,
            generated_files: vec![
                PathBuf::from("out/worker_validation.py"),
                PathBuf::from("out/worker.py"),
            ],
            clusters: vec![ClusterMetrics {
                name: "validation".to_string(),
                member_count: 12,
                cohesion: 0.64,
                coupling: 0.25,
            }],
            status: DecompositionStatus::Success,
            error: None,
            warnings: vec![],
        }
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let manifest = sample();
        let json = render_manifest(&manifest).unwrap();
        let back: DecompositionManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = render_manifest(&sample()).unwrap();
        assert!(json.contains("\"status\": \"success\""));
    }

    #[test]
    fn rendering_is_deterministic() {
        let manifest = sample();
        assert_eq!(
            render_manifest(&manifest).unwrap(),
            render_manifest(&manifest).unwrap()
        );
    }

    #[test]
    fn absent_error_is_omitted() {
        let json = render_manifest(&sample()).unwrap();
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn write_manifest_names_file_after_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path(), &sample()).unwrap();
        assert!(path.ends_with("worker_decomposition.json"));
        assert!(path.exists());
    }
}
