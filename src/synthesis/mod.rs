//! Code synthesis: cluster modules plus the compatibility facade.
//!
//! Each cluster becomes one module carrying the subset of original
//! imports its members reference (conservative superset) and the members'
//! verbatim source slices, wrapped in `<Cluster><OriginalType>` classes
//! where the members had an owning type. The facade adopts the original
//! file name, imports every cluster module, and re-declares every
//! original public callable with the same parameter list, delegating to
//! the relocated implementation. Nothing is emitted unless every unit is
//! attributable to exactly one module; nested defs travel inside their
//! enclosing unit's slice and are never emitted twice.

use crate::analyzers::{ImportStatement, ParsedModule};
use crate::core::{CallableUnit, GeneratedModule, ServiceCluster, WrappedBlock};
use crate::errors::DecomposeError;
use std::path::PathBuf;

/// Emit one module per cluster plus the facade, in manifest order.
pub fn synthesize(
    parsed: &ParsedModule,
    clusters: &[ServiceCluster],
) -> Result<Vec<GeneratedModule>, DecomposeError> {
    let stem = file_stem(parsed);
    let extension = parsed
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("py")
        .to_string();

    let owner_of = cluster_ownership(parsed, clusters)?;

    let mut modules = Vec::new();
    for cluster in clusters {
        modules.push(cluster_module(parsed, cluster, &stem, &extension));
    }
    modules.push(facade_module(
        parsed, clusters, &owner_of, &stem, &extension,
    ));
    Ok(modules)
}

/// Map each unit to its owning cluster, failing when the strict-partition
/// invariant is broken. Partitioners uphold it; synthesis refuses to emit
/// anything if it does not hold.
fn cluster_ownership(
    parsed: &ParsedModule,
    clusters: &[ServiceCluster],
) -> Result<Vec<usize>, DecomposeError> {
    let mut owner_of: Vec<Option<usize>> = vec![None; parsed.units.len()];
    for (cluster_index, cluster) in clusters.iter().enumerate() {
        for &member in &cluster.members {
            let slot = owner_of.get_mut(member).ok_or_else(|| {
                DecomposeError::synthesis(format!(
                    "cluster {} references unit {} outside the parsed set",
                    cluster.name, member
                ))
            })?;
            if slot.replace(cluster_index).is_some() {
                return Err(DecomposeError::synthesis(format!(
                    "unit {} claimed by more than one cluster",
                    parsed.units[member].qualified_name
                )));
            }
        }
    }
    owner_of
        .into_iter()
        .enumerate()
        .map(|(unit, owner)| {
            owner.ok_or_else(|| {
                DecomposeError::synthesis(format!(
                    "unit {} not claimed by any cluster",
                    parsed.units[unit].qualified_name
                ))
            })
        })
        .collect()
}

fn cluster_module(
    parsed: &ParsedModule,
    cluster: &ServiceCluster,
    stem: &str,
    extension: &str,
) -> GeneratedModule {
    // Nested members ride along inside their enclosing slice.
    let emitted: Vec<usize> = cluster
        .members
        .iter()
        .copied()
        .filter(|&m| !parsed.units[m].nested)
        .collect();

    let slices: Vec<(usize, String)> = emitted
        .iter()
        .map(|&m| {
            let unit = &parsed.units[m];
            (m, parsed.slice(unit.start_line, unit.end_line))
        })
        .collect();

    let imports = filtered_imports(&parsed.imports, &slices);

    let mut classes: Vec<WrappedBlock> = Vec::new();
    let mut functions = Vec::new();
    for (member, slice) in slices {
        match &parsed.units[member].owning_type {
            Some(owner) => {
                let wrapper = format!("{}{}", pascal_case(&cluster.name), owner);
                match classes.iter_mut().find(|c| c.class_name == wrapper) {
                    Some(block) => block.slices.push(slice),
                    None => classes.push(WrappedBlock {
                        class_name: wrapper,
                        slices: vec![slice],
                    }),
                }
            }
            None => functions.push(slice),
        }
    }

    GeneratedModule {
        path: PathBuf::from(format!("{}_{}.{}", stem, cluster.name, extension)),
        imports,
        classes,
        functions,
        is_facade: false,
    }
}

fn facade_module(
    parsed: &ParsedModule,
    clusters: &[ServiceCluster],
    owner_of: &[usize],
    stem: &str,
    extension: &str,
) -> GeneratedModule {
    let imports = clusters
        .iter()
        .map(|cluster| format!("import {}_{}", stem, cluster.name))
        .collect();

    let mut classes: Vec<WrappedBlock> = Vec::new();
    let mut functions = Vec::new();

    for (index, unit) in parsed.units.iter().enumerate() {
        if unit.nested || !unit.is_public() {
            continue;
        }
        let cluster = &clusters[owner_of[index]];
        let module_name = format!("{}_{}", stem, cluster.name);
        match &unit.owning_type {
            Some(owner) => {
                let target = format!(
                    "{}.{}{}.{}",
                    module_name,
                    pascal_case(&cluster.name),
                    owner,
                    unit.name
                );
                let body = delegation_def(unit, &target, 1);
                match classes.iter_mut().find(|c| c.class_name == *owner) {
                    Some(block) => block.slices.push(body),
                    None => classes.push(WrappedBlock {
                        class_name: owner.clone(),
                        slices: vec![body],
                    }),
                }
            }
            None => {
                let target = format!("{}.{}", module_name, unit.name);
                functions.push(delegation_def(unit, &target, 0));
            }
        }
    }

    GeneratedModule {
        path: PathBuf::from(format!("{}.{}", stem, extension)),
        imports,
        classes,
        functions,
        is_facade: true,
    }
}

/// One delegating def with the original parameter list, indented for
/// module scope (depth 0) or class body (depth 1).
fn delegation_def(unit: &CallableUnit, target: &str, depth: usize) -> String {
    let indent = "    ".repeat(depth);
    let params = unit.parameters.join(", ");
    format!(
        "{indent}def {name}({params}):\n{indent}    return {target}({params})",
        indent = indent,
        name = unit.name,
        params = params,
        target = target,
    )
}

/// Imports referenced by any member slice; star imports and imports with
/// no recoverable bound names are always kept.
fn filtered_imports(
    imports: &[ImportStatement],
    slices: &[(usize, String)],
) -> Vec<String> {
    imports
        .iter()
        .filter(|import| {
            import.is_star
                || import.bound_names.is_empty()
                || import.bound_names.iter().any(|name| {
                    slices
                        .iter()
                        .any(|(_, slice)| contains_identifier(slice, name))
                })
        })
        .map(|import| import.text.clone())
        .collect()
}

/// Whole-identifier occurrence check, so importing `os` is not kept
/// alive by a member mentioning `cost`.
fn contains_identifier(haystack: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(at) = haystack[from..].find(name) {
        let start = from + at;
        let end = start + name.len();
        let boundary_before = start == 0 || !is_identifier_byte(bytes[start - 1]);
        let boundary_after = end == bytes.len() || !is_identifier_byte(bytes[end]);
        if boundary_before && boundary_after {
            return true;
        }
        from = start + 1;
    }
    false
}

fn is_identifier_byte(byte: u8) -> bool {
    byte == b'_' || byte.is_ascii_alphanumeric()
}

fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn file_stem(parsed: &ParsedModule) -> String {
    parsed
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string()
}
