//! Source parsing: one file's text in, callable units out.
//!
//! The parser is a pure function over the file content. It produces the
//! ordered unit list, the line-indexed source used for verbatim slicing,
//! and the top-level import statements with the names they bind.

pub mod python;

use crate::core::CallableUnit;
use crate::errors::DecomposeError;
use std::path::{Path, PathBuf};

/// A top-level import statement, kept as opaque text plus the names it
/// binds so synthesis can filter per-module imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    /// Verbatim statement text
    pub text: String,
    /// Names the statement introduces into module scope
    pub bound_names: Vec<String>,
    /// `from m import *`; always carried into generated modules
    pub is_star: bool,
}

/// Result of parsing one file.
#[derive(Debug, Clone)]
pub struct ParsedModule {
    /// Logical path of the source; drives output naming
    pub path: PathBuf,
    /// Callable units in source order
    pub units: Vec<CallableUnit>,
    /// Top-level imports in source order
    pub imports: Vec<ImportStatement>,
    lines: Vec<String>,
}

impl ParsedModule {
    pub(crate) fn new(
        path: PathBuf,
        units: Vec<CallableUnit>,
        imports: Vec<ImportStatement>,
        content: &str,
    ) -> Self {
        Self {
            path,
            units,
            imports,
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Verbatim source slice for a 1-based inclusive line range.
    ///
    /// Ranges come from unit extraction and are authoritative; synthesis
    /// never re-derives them from generated text.
    pub fn slice(&self, start_line: usize, end_line: usize) -> String {
        let start = start_line.saturating_sub(1).min(self.lines.len());
        let end = end_line.min(self.lines.len());
        self.lines[start..end].join("\n")
    }
}

/// Maps byte offsets to 1-based line numbers.
#[derive(Debug)]
pub(crate) struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(content: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in content.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        Self { line_starts }
    }

    pub(crate) fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }
}

/// Parse one file's content into callable units and imports.
///
/// `logical_path` names the file in diagnostics and output naming; the
/// content does not have to exist on disk. Fails with
/// [`DecomposeError::Parse`] on malformed input.
pub fn parse_module(content: &str, logical_path: &Path) -> Result<ParsedModule, DecomposeError> {
    python::parse(content, logical_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_maps_offsets_to_lines() {
        let index = LineIndex::new("ab\ncd\nef");
        assert_eq!(index.line_of(0), 1);
        assert_eq!(index.line_of(2), 1);
        assert_eq!(index.line_of(3), 2);
        assert_eq!(index.line_of(6), 3);
    }

    #[test]
    fn slice_is_inclusive_and_one_based() {
        let parsed = ParsedModule::new(
            PathBuf::from("m.py"),
            vec![],
            vec![],
            "first\nsecond\nthird\n",
        );
        assert_eq!(parsed.slice(2, 3), "second\nthird");
        assert_eq!(parsed.slice(1, 1), "first");
    }

    #[test]
    fn slice_clamps_out_of_range_lines() {
        let parsed = ParsedModule::new(PathBuf::from("m.py"), vec![], vec![], "only\n");
        assert_eq!(parsed.slice(1, 99), "only");
    }
}
