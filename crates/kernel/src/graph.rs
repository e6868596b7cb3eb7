//! In-memory graph of services and their declared dependencies.
//!
//! Hard edges must stay acyclic at all times; a mutation that would break
//! that invariant is rejected before anything is written, so the graph is
//! never observed mid-mutation. Topological ordering is a depth-first sort
//! with color marking, deterministic across calls because ties are broken by
//! registration order.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::state::ServiceState;

/// A declared dependency from one service onto another.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DependencyEdge {
    /// Name of the service depended on.
    pub target: String,
    /// State the target must reach before the source may start.
    pub required_state: ServiceState,
    /// Hard edges gate startup and participate in cycle detection; soft
    /// edges only influence ordering.
    pub hard: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Node {
    edges: Vec<DependencyEdge>,
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// The service dependency graph.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DependencyGraph {
    nodes: HashMap<String, Node>,
    registration_order: Vec<String>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the node if absent; idempotent.
    pub fn upsert_node(&mut self, name: &str) {
        if !self.nodes.contains_key(name) {
            self.nodes
                .insert(name.to_string(), Node { edges: Vec::new() });
            self.registration_order.push(name.to_string());
        }
    }

    /// Whether a node with the given name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names in registration order.
    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        self.registration_order.clone()
    }

    /// Adds (or updates in place) the dependency edge `from -> to`.
    ///
    /// Fails with [`Error::UnknownNode`] if either endpoint is absent and
    /// with [`Error::Cycle`] if a hard edge would close a hard-edge cycle.
    /// A failed call leaves the edge set untouched.
    pub fn add_dependency(
        &mut self,
        from: &str,
        to: &str,
        required_state: ServiceState,
        hard: bool,
    ) -> Result<()> {
        if !self.nodes.contains_key(from) {
            return Err(Error::UnknownNode(from.to_string()));
        }
        if !self.nodes.contains_key(to) {
            return Err(Error::UnknownNode(to.to_string()));
        }
        if hard && (from == to || self.hard_path_exists(to, from)) {
            return Err(Error::Cycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let edges = &mut self
            .nodes
            .get_mut(from)
            .ok_or_else(|| Error::UnknownNode(from.to_string()))?
            .edges;
        if let Some(edge) = edges.iter_mut().find(|edge| edge.target == to) {
            edge.required_state = required_state;
            edge.hard = hard;
        } else {
            edges.push(DependencyEdge {
                target: to.to_string(),
                required_state,
                hard,
            });
        }
        Ok(())
    }

    /// Same as [`Self::add_dependency`] but upserts missing endpoints instead
    /// of rejecting them.
    pub fn add_dependency_auto(
        &mut self,
        from: &str,
        to: &str,
        required_state: ServiceState,
        hard: bool,
    ) -> Result<()> {
        self.upsert_node(from);
        self.upsert_node(to);
        self.add_dependency(from, to, required_state, hard)
    }

    /// Removes a node. Fails with [`Error::NodeInUse`] while other nodes
    /// still hold edges onto it; callers must detach dependents first.
    pub fn remove_node(&mut self, name: &str) -> Result<()> {
        if !self.nodes.contains_key(name) {
            return Err(Error::UnknownNode(name.to_string()));
        }
        let dependents = self.dependents_of(name);
        if !dependents.is_empty() {
            return Err(Error::NodeInUse {
                name: name.to_string(),
                dependents,
            });
        }
        self.nodes.remove(name);
        self.registration_order.retain(|entry| entry != name);
        Ok(())
    }

    /// The declared dependency edges of a node.
    pub fn dependencies_of(&self, name: &str) -> Result<&[DependencyEdge]> {
        self.nodes
            .get(name)
            .map(|node| node.edges.as_slice())
            .ok_or_else(|| Error::UnknownNode(name.to_string()))
    }

    /// Names of nodes holding an edge onto `name`, in registration order.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.registration_order
            .iter()
            .filter(|other| {
                *other != name
                    && self
                        .nodes
                        .get(*other)
                        .is_some_and(|node| node.edges.iter().any(|edge| edge.target == name))
            })
            .cloned()
            .collect()
    }

    /// Deterministic total order consistent with all hard edges:
    /// dependencies strictly before dependents, ties broken by registration
    /// order. Fails with [`Error::Cycle`] if a hard cycle is present.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), Mark::Unvisited))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        for name in &self.registration_order {
            if marks[name.as_str()] == Mark::Unvisited {
                self.visit(name, &mut marks, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        marks.insert(name, Mark::InProgress);
        for edge in &self.nodes[name].edges {
            match marks.get(edge.target.as_str()) {
                Some(Mark::Unvisited) => self.visit(edge.target.as_str(), marks, order)?,
                Some(Mark::InProgress) => {
                    // Soft edges are excluded from cycle detection; a soft
                    // back edge simply contributes no ordering constraint.
                    if edge.hard {
                        return Err(Error::Cycle {
                            from: name.to_string(),
                            to: edge.target.clone(),
                        });
                    }
                }
                Some(Mark::Done) => {}
                None => return Err(Error::UnknownNode(edge.target.clone())),
            }
        }
        marks.insert(name, Mark::Done);
        order.push(name.to_string());
        Ok(())
    }

    fn hard_path_exists(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![from.to_string()];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if let Some(node) = self.nodes.get(current) {
                for edge in node.edges.iter().filter(|edge| edge.hard) {
                    if !seen.contains(&edge.target) {
                        seen.push(edge.target.clone());
                        stack.push(edge.target.as_str());
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(names: &[&str]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for name in names {
            graph.upsert_node(name);
        }
        graph
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut graph = graph(&["a"]);
        graph.upsert_node("a");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node_names(), vec!["a"]);
    }

    #[test]
    fn order_places_dependencies_first() {
        let mut graph = graph(&["x", "y", "z"]);
        graph
            .add_dependency("x", "y", ServiceState::Running, true)
            .unwrap();
        graph
            .add_dependency("y", "z", ServiceState::Running, true)
            .unwrap();

        assert_eq!(graph.topological_order().unwrap(), vec!["z", "y", "x"]);
    }

    #[test]
    fn independent_nodes_keep_registration_order() {
        let graph = graph(&["s1", "s2", "s3", "s4"]);
        assert_eq!(
            graph.topological_order().unwrap(),
            vec!["s1", "s2", "s3", "s4"]
        );
    }

    #[test]
    fn order_is_stable_across_calls() {
        let mut graph = graph(&["a", "b", "c", "d"]);
        graph
            .add_dependency("a", "c", ServiceState::Running, true)
            .unwrap();
        graph
            .add_dependency("b", "c", ServiceState::Running, true)
            .unwrap();

        let first = graph.topological_order().unwrap();
        let second = graph.topological_order().unwrap();
        assert_eq!(first, second);
        let pos = |name: &str| first.iter().position(|entry| entry == name).unwrap();
        assert!(pos("c") < pos("a"));
        assert!(pos("c") < pos("b"));
    }

    #[test]
    fn hard_cycle_is_rejected_and_graph_unchanged() {
        let mut graph = graph(&["a", "b", "c"]);
        graph
            .add_dependency("a", "b", ServiceState::Running, true)
            .unwrap();
        graph
            .add_dependency("b", "c", ServiceState::Running, true)
            .unwrap();

        let snapshot = graph.clone();
        let err = graph
            .add_dependency("c", "a", ServiceState::Running, true)
            .unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
        assert_eq!(graph, snapshot);
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let mut graph = graph(&["a"]);
        let err = graph
            .add_dependency("a", "a", ServiceState::Running, true)
            .unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
    }

    #[test]
    fn soft_back_edge_is_allowed() {
        let mut graph = graph(&["a", "b"]);
        graph
            .add_dependency("a", "b", ServiceState::Running, true)
            .unwrap();
        graph
            .add_dependency("b", "a", ServiceState::Running, false)
            .unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn unknown_endpoint_is_rejected_unless_auto() {
        let mut graph = graph(&["a"]);
        let err = graph
            .add_dependency("a", "missing", ServiceState::Running, true)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownNode(name) if name == "missing"));

        graph
            .add_dependency_auto("a", "missing", ServiceState::Running, true)
            .unwrap();
        assert!(graph.contains("missing"));
    }

    #[test]
    fn existing_edge_is_updated_in_place() {
        let mut graph = graph(&["a", "b"]);
        graph
            .add_dependency("a", "b", ServiceState::Running, true)
            .unwrap();
        graph
            .add_dependency("a", "b", ServiceState::Installed, false)
            .unwrap();

        let edges = graph.dependencies_of("a").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].required_state, ServiceState::Installed);
        assert!(!edges[0].hard);
    }

    #[test]
    fn remove_node_in_use_fails() {
        let mut graph = graph(&["a", "b"]);
        graph
            .add_dependency("a", "b", ServiceState::Running, true)
            .unwrap();

        let err = graph.remove_node("b").unwrap_err();
        assert!(matches!(err, Error::NodeInUse { dependents, .. } if dependents == vec!["a"]));

        graph.remove_node("a").unwrap();
        graph.remove_node("b").unwrap();
        assert!(graph.is_empty());
    }
}
