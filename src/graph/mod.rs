//! Intra-file dependency graph construction.
//!
//! Resolves each unit's raw calls against the parsed unit set: `self.m`
//! and `Type.m` resolve within the named owning type, bare names against
//! module scope, and everything else is recorded as an external call.
//! Dynamic receivers keep an `unknown_dependency` flag instead of a
//! guessed edge. Direct recursion is recorded as a flag on the unit, not
//! a self-loop, so it cannot skew clustering.

use crate::core::{CallReceiver, CallableUnit};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet};

/// A call that leaves the file (or cannot be resolved inside it).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExternalCall {
    /// Callee name as written at the call site
    pub name: String,
    /// True when the receiver was dynamic and the target is a guess-free unknown
    pub unknown_dependency: bool,
}

/// Directed CALLS graph over callable units, with the attribute index
/// used lazily by the affinity scorer.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<usize, ()>,
    nodes: Vec<NodeIndex>,
    attribute_index: BTreeMap<String, BTreeSet<usize>>,
    external_calls: Vec<BTreeSet<ExternalCall>>,
    recursive: BTreeSet<usize>,
}

impl DependencyGraph {
    pub fn build(units: &[CallableUnit]) -> DependencyGraph {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..units.len()).map(|i| graph.add_node(i)).collect();

        let mut index_of: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, unit) in units.iter().enumerate() {
            index_of.insert(unit.qualified_name.as_str(), i);
        }

        let mut attribute_index: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        for (i, unit) in units.iter().enumerate() {
            for attribute in unit.data_footprint() {
                attribute_index.entry(attribute).or_default().insert(i);
            }
        }

        let mut external_calls: Vec<BTreeSet<ExternalCall>> = vec![BTreeSet::new(); units.len()];
        let mut recursive = BTreeSet::new();

        for (caller, unit) in units.iter().enumerate() {
            for call in &unit.calls {
                match resolve(call_target(unit, call).as_deref(), &index_of) {
                    Some(callee) if callee == caller => {
                        recursive.insert(caller);
                    }
                    Some(callee) => {
                        graph.update_edge(nodes[caller], nodes[callee], ());
                    }
                    None => {
                        // An unresolved `self.x()` is a callable attribute or
                        // reflective access; both degrade to unknown.
                        external_calls[caller].insert(ExternalCall {
                            name: call.name.clone(),
                            unknown_dependency: matches!(
                                call.receiver,
                                CallReceiver::Dynamic | CallReceiver::SelfMethod
                            ),
                        });
                    }
                }
            }
        }

        DependencyGraph {
            graph,
            nodes,
            attribute_index,
            external_calls,
            recursive,
        }
    }

    pub fn unit_count(&self) -> usize {
        self.nodes.len()
    }

    /// Direct call edge from `a` to `b`.
    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.graph.contains_edge(self.nodes[a], self.nodes[b])
    }

    /// Units called by `unit` within the file.
    pub fn callees(&self, unit: usize) -> BTreeSet<usize> {
        self.graph
            .neighbors_directed(self.nodes[unit], Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect()
    }

    /// Units calling `unit` within the file.
    pub fn callers(&self, unit: usize) -> BTreeSet<usize> {
        self.graph
            .neighbors_directed(self.nodes[unit], Direction::Incoming)
            .map(|n| self.graph[n])
            .collect()
    }

    /// True when `a` and `b` share a caller-or-callee neighbor.
    pub fn shares_neighbor(&self, a: usize, b: usize) -> bool {
        let neighbors_a = self.undirected_neighbors(a);
        if neighbors_a.is_empty() {
            return false;
        }
        self.undirected_neighbors(b)
            .intersection(&neighbors_a)
            .next()
            .is_some()
    }

    fn undirected_neighbors(&self, unit: usize) -> BTreeSet<usize> {
        let mut neighbors = self.callees(unit);
        neighbors.extend(self.callers(unit));
        neighbors
    }

    pub fn is_recursive(&self, unit: usize) -> bool {
        self.recursive.contains(&unit)
    }

    pub fn external_calls_of(&self, unit: usize) -> &BTreeSet<ExternalCall> {
        &self.external_calls[unit]
    }

    /// Units touching the given attribute.
    pub fn units_sharing_attribute(&self, attribute: &str) -> Option<&BTreeSet<usize>> {
        self.attribute_index.get(attribute)
    }

    pub fn attribute_index(&self) -> &BTreeMap<String, BTreeSet<usize>> {
        &self.attribute_index
    }
}

/// Qualified name a call would have if it resolves inside the file.
fn call_target(caller: &CallableUnit, call: &crate::core::RawCall) -> Option<String> {
    match &call.receiver {
        CallReceiver::Bare => Some(call.name.clone()),
        CallReceiver::SelfMethod => caller
            .owning_type
            .as_ref()
            .map(|class_name| format!("{}.{}", class_name, call.name)),
        CallReceiver::Named(receiver) => Some(format!("{}.{}", receiver, call.name)),
        CallReceiver::Dynamic => None,
    }
}

fn resolve(target: Option<&str>, index_of: &BTreeMap<&str, usize>) -> Option<usize> {
    index_of.get(target?).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::parse_module;
    use std::path::Path;

    fn graph_for(code: &str) -> (Vec<CallableUnit>, DependencyGraph) {
        let parsed = parse_module(code, Path::new("test.py")).unwrap();
        let graph = DependencyGraph::build(&parsed.units);
        (parsed.units, graph)
    }

    fn index_of(units: &[CallableUnit], qualified: &str) -> usize {
        units
            .iter()
            .position(|u| u.qualified_name == qualified)
            .unwrap()
    }

    #[test]
    fn resolves_self_method_calls_to_edges() {
        let (units, graph) = graph_for(
            r#"
class Pipeline:
    def run(self):
        self.validate()

    def validate(self):
        pass
"#,
        );
        let run = index_of(&units, "Pipeline.run");
        let validate = index_of(&units, "Pipeline.validate");
        assert!(graph.has_edge(run, validate));
        assert!(!graph.has_edge(validate, run));
    }

    #[test]
    fn resolves_bare_calls_to_module_scope() {
        let (units, graph) = graph_for(
            r#"
def helper():
    pass

def entry():
    helper()
"#,
        );
        let entry = index_of(&units, "entry");
        let helper = index_of(&units, "helper");
        assert!(graph.has_edge(entry, helper));
    }

    #[test]
    fn out_of_file_calls_are_external_not_edges() {
        let (units, graph) = graph_for(
            r#"
def entry():
    missing_helper()
"#,
        );
        let entry = index_of(&units, "entry");
        assert!(graph.callees(entry).is_empty());
        let externals = graph.external_calls_of(entry);
        assert_eq!(externals.len(), 1);
        let external = externals.iter().next().unwrap();
        assert_eq!(external.name, "missing_helper");
        assert!(!external.unknown_dependency);
    }

    #[test]
    fn dynamic_receivers_are_flagged_unknown() {
        let (units, graph) = graph_for(
            r#"
class Dispatcher:
    def fire(self):
        self.handlers[0].invoke()
"#,
        );
        let fire = index_of(&units, "Dispatcher.fire");
        let externals = graph.external_calls_of(fire);
        assert!(externals.iter().any(|e| e.name == "invoke" && e.unknown_dependency));
    }

    #[test]
    fn unknown_self_attribute_call_is_flagged() {
        let (units, graph) = graph_for(
            r#"
class Dispatcher:
    def fire(self):
        self.callback()
"#,
        );
        let fire = index_of(&units, "Dispatcher.fire");
        let externals = graph.external_calls_of(fire);
        assert!(externals.iter().any(|e| e.name == "callback" && e.unknown_dependency));
    }

    #[test]
    fn direct_recursion_is_a_flag_not_a_self_loop() {
        let (units, graph) = graph_for(
            r#"
def walk(node):
    walk(node)
"#,
        );
        let walk = index_of(&units, "walk");
        assert!(graph.is_recursive(walk));
        assert!(!graph.has_edge(walk, walk));
    }

    #[test]
    fn attribute_index_groups_units_by_field() {
        let (units, graph) = graph_for(
            r#"
class Store:
    def read_entry(self, key):
        return self.entries[key]

    def write_entry(self, key, value):
        self.entries[key] = value
"#,
        );
        let read = index_of(&units, "Store.read_entry");
        let write = index_of(&units, "Store.write_entry");
        let sharing = graph.units_sharing_attribute("entries").unwrap();
        assert!(sharing.contains(&read) && sharing.contains(&write));
    }

    #[test]
    fn common_callee_counts_as_shared_neighbor() {
        let (units, graph) = graph_for(
            r#"
class Svc:
    def a(self):
        self.shared()

    def b(self):
        self.shared()

    def shared(self):
        pass

    def lonely(self):
        pass
"#,
        );
        let a = index_of(&units, "Svc.a");
        let b = index_of(&units, "Svc.b");
        let lonely = index_of(&units, "Svc.lonely");
        assert!(graph.shares_neighbor(a, b));
        assert!(!graph.shares_neighbor(a, lonely));
    }
}
