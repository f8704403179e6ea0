//! Arena-backed dependency graph built from loaded [`super::ServiceDecl`]s.
use std::collections::BTreeMap;

use crate::error::DependError;

use super::loader::ServiceDecl;

/// One graph node: a service and its resolved relations.
///
/// `need`/`use`/`after`/`before`/`want` are stored as resolved node indices
/// rather than raw names once the graph finishes loading, so later traversal
/// never needs to consult the name table again.
#[derive(Debug, Clone, Default)]
pub struct ServiceNode {
    /// Service name.
    pub name: String,
    /// Hard dependency node indices.
    pub need: Vec<usize>,
    /// Soft dependency node indices.
    pub use_: Vec<usize>,
    /// Ordering-only predecessor node indices.
    pub after: Vec<usize>,
    /// Ordering-only successor node indices.
    pub before: Vec<usize>,
    /// Provider aliases this node satisfies.
    pub provide: Vec<String>,
    /// Weak-pull node indices.
    pub want: Vec<usize>,
    /// Free-form keywords.
    pub keywords: Vec<String>,
}

/// The full service dependency graph, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct ServiceGraph {
    nodes: Vec<ServiceNode>,
    index: BTreeMap<String, usize>,
}

impl ServiceGraph {
    /// Builds a graph from declarations, resolving provider aliases and
    /// `before` back-edges (a `before B` on A becomes an `after A` edge
    /// recorded on B) along the way.
    pub fn build(decls: Vec<ServiceDecl>) -> Result<Self, DependError> {
        let mut index = BTreeMap::new();
        for (i, decl) in decls.iter().enumerate() {
            index.insert(decl.name.clone(), i);
        }

        let mut providers: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, decl) in decls.iter().enumerate() {
            for alias in &decl.provide {
                providers.entry(alias.clone()).or_default().push(i);
            }
        }

        let resolve_name = |name: &str, providers: &BTreeMap<String, Vec<usize>>| -> Option<usize> {
            if let Some(&idx) = index.get(name) {
                return Some(idx);
            }
            providers.get(name).and_then(|candidates| candidates.first().copied())
        };

        let mut nodes: Vec<ServiceNode> = decls
            .iter()
            .map(|decl| ServiceNode {
                name: decl.name.clone(),
                provide: decl.provide.clone(),
                keywords: decl.keywords.clone(),
                ..Default::default()
            })
            .collect();

        let mut before_edges: Vec<(usize, usize)> = Vec::new();

        for (i, decl) in decls.iter().enumerate() {
            for name in &decl.need {
                match resolve_name(name, &providers) {
                    Some(idx) => nodes[i].need.push(idx),
                    None => {
                        return Err(DependError::MissingDependency {
                            service: decl.name.clone(),
                            dependency: name.clone(),
                        });
                    }
                }
            }

            for name in &decl.use_ {
                if let Some(idx) = resolve_name(name, &providers) {
                    nodes[i].use_.push(idx);
                }
            }

            for name in &decl.after {
                if let Some(idx) = resolve_name(name, &providers) {
                    nodes[i].after.push(idx);
                }
            }

            for name in &decl.want {
                if let Some(idx) = resolve_name(name, &providers) {
                    nodes[i].want.push(idx);
                }
            }

            for name in &decl.before {
                if let Some(idx) = resolve_name(name, &providers) {
                    before_edges.push((i, idx));
                }
            }
        }

        for (from, to) in before_edges {
            // `from` must run before `to`, i.e. `to` runs after `from`.
            nodes[to].after.push(from);
        }

        Ok(Self { nodes, index })
    }

    /// Looks up a node index by service name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the node at `idx`.
    pub fn node(&self, idx: usize) -> &ServiceNode {
        &self.nodes[idx]
    }

    /// Iterates all nodes in name order.
    pub fn nodes(&self) -> &[ServiceNode] {
        &self.nodes
    }

    /// Number of services in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no services.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
