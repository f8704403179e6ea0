//! Produces a deterministic start/stop order from a [`ServiceGraph`].
//! Ordering is a depth-first traversal keyed on a caller-chosen set of
//! relation types, with a `BTreeSet` ready-queue for tie-breaking, so two
//! runs over the same graph always produce the same order.
use std::collections::BTreeSet;

use super::graph::{ServiceGraph, ServiceNode};

/// A forward relation type that participates in traversal. `provide` is
/// resolved to concrete node indices by [`super::graph::ServiceGraph::build`]
/// and isn't itself a traversable edge kind, so it has no entry here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelType {
    /// Hard dependency.
    Need,
    /// Soft dependency.
    Use,
    /// Ordering-only predecessor.
    After,
    /// Weak pull.
    Want,
}

/// The option flags that shape traversal, mirroring the runtime flags a
/// caller passes alongside a relation-type set and a runlevel context.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependOptions {
    /// Follow relations transitively. Without this, only direct targets of
    /// the input services are included.
    pub trace: bool,
    /// Filter the result down to services accepted by the `in_runlevel`
    /// predicate passed to [`depends`]/[`order`].
    pub strict: bool,
    /// This call is resolving a start order. Traversal itself is identical
    /// either way; kept so callers can record intent without a third
    /// parameter.
    pub start: bool,
    /// This call is resolving a stop order. Reversing the emitted order is
    /// the caller's responsibility.
    pub stop: bool,
}

fn relation_targets(node: &ServiceNode, ty: RelType) -> &[usize] {
    match ty {
        RelType::Need => &node.need,
        RelType::Use => &node.use_,
        RelType::After => &node.after,
        RelType::Want => &node.want,
    }
}

/// Computes the set of node indices reachable from `services` by following
/// `types` edges: direct targets only, unless `options.trace` is set, in
/// which case the walk continues transitively. `services` themselves are
/// always included. When `options.strict`, the result is filtered down to
/// whatever `in_runlevel` accepts.
pub fn depends(
    graph: &ServiceGraph,
    types: &[RelType],
    services: &[usize],
    in_runlevel: Option<&dyn Fn(usize) -> bool>,
    options: DependOptions,
) -> BTreeSet<usize> {
    let mut visited: BTreeSet<usize> = BTreeSet::new();
    let mut reachable: BTreeSet<usize> = BTreeSet::new();

    for &svc in services {
        reachable.insert(svc);
        walk(graph, types, svc, options.trace, &mut visited, &mut reachable);
    }

    if options.strict {
        if let Some(pred) = in_runlevel {
            reachable.retain(|&idx| pred(idx));
        }
    }

    reachable
}

/// Re-entering a node already on the current walk's visited set is a no-op:
/// it neither recurses nor errors, so a dependency cycle simply stops
/// expanding at the back-edge instead of aborting the whole traversal.
fn walk(
    graph: &ServiceGraph,
    types: &[RelType],
    idx: usize,
    trace: bool,
    visited: &mut BTreeSet<usize>,
    reachable: &mut BTreeSet<usize>,
) {
    if !visited.insert(idx) {
        return;
    }

    for &ty in types {
        for &target in relation_targets(graph.node(idx), ty) {
            reachable.insert(target);
            if trace {
                walk(graph, types, target, trace, visited, reachable);
            }
        }
    }
}

/// Orders `services` (plus everything [`depends`] pulls into the working
/// set for the given `types`/`options`) so that every followed target
/// appears before the node that follows it. Duplicates are suppressed on
/// emission; the first emission wins. A dependency cycle does not error:
/// the back-edge is a no-op and the node it points to is simply emitted at
/// its first-reached position.
pub fn order(
    graph: &ServiceGraph,
    types: &[RelType],
    services: &[usize],
    in_runlevel: Option<&dyn Fn(usize) -> bool>,
    options: DependOptions,
) -> Vec<usize> {
    let working_set = depends(graph, types, services, in_runlevel, options);
    let mut visiting: BTreeSet<usize> = BTreeSet::new();
    let mut done: BTreeSet<usize> = BTreeSet::new();
    let mut emitted = Vec::with_capacity(working_set.len());

    for &idx in &working_set {
        visit(graph, types, idx, &working_set, &mut visiting, &mut done, &mut emitted);
    }

    emitted
}

fn visit(
    graph: &ServiceGraph,
    types: &[RelType],
    idx: usize,
    working_set: &BTreeSet<usize>,
    visiting: &mut BTreeSet<usize>,
    done: &mut BTreeSet<usize>,
    emitted: &mut Vec<usize>,
) {
    if done.contains(&idx) {
        return;
    }
    if !visiting.insert(idx) {
        return;
    }

    for &ty in types {
        for &target in relation_targets(graph.node(idx), ty) {
            if working_set.contains(&target) {
                visit(graph, types, target, working_set, visiting, done, emitted);
            }
        }
    }

    visiting.remove(&idx);
    if done.insert(idx) {
        emitted.push(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depend::loader::ServiceDecl;

    const START_TYPES: &[RelType] = &[RelType::Need, RelType::Use, RelType::After];

    fn build(decls: Vec<(&str, &[&str])>) -> ServiceGraph {
        let decls = decls
            .into_iter()
            .map(|(name, need)| ServiceDecl {
                name: name.to_string(),
                need: need.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            })
            .collect();
        ServiceGraph::build(decls).unwrap()
    }

    fn trace_options() -> DependOptions {
        DependOptions {
            trace: true,
            start: true,
            ..Default::default()
        }
    }

    #[test]
    fn dependencies_precede_dependents() {
        let graph = build(vec![("net.eth0", &[]), ("sshd", &["net.eth0"])]);
        let sshd = graph.index_of("sshd").unwrap();
        let ordered = order(&graph, START_TYPES, &[sshd], None, trace_options());
        let names: Vec<&str> = ordered.iter().map(|&i| graph.node(i).name.as_str()).collect();
        assert_eq!(names, vec!["net.eth0", "sshd"]);
    }

    #[test]
    fn empty_target_list_is_a_no_op() {
        let graph = build(vec![("net.eth0", &[])]);
        let ordered = order(&graph, START_TYPES, &[], None, trace_options());
        assert!(ordered.is_empty());
    }

    #[test]
    fn diamond_dependency_visited_once() {
        let graph = build(vec![
            ("local", &[]),
            ("a", &["local"]),
            ("b", &["local"]),
            ("c", &["a", "b"]),
        ]);
        let c = graph.index_of("c").unwrap();
        let ordered = order(&graph, START_TYPES, &[c], None, trace_options());
        assert_eq!(ordered.len(), 4);
        let local_pos = ordered.iter().position(|&i| graph.node(i).name == "local").unwrap();
        let c_pos = ordered.iter().position(|&i| i == c).unwrap();
        assert!(local_pos < c_pos);
    }

    #[test]
    fn a_cycle_does_not_error_and_still_terminates() {
        let a = ServiceDecl {
            name: "a".to_string(),
            need: vec!["b".to_string()],
            ..Default::default()
        };
        let b = ServiceDecl {
            name: "b".to_string(),
            need: vec!["a".to_string()],
            ..Default::default()
        };
        let graph = ServiceGraph::build(vec![a, b]).unwrap();
        let a_idx = graph.index_of("a").unwrap();
        let ordered = order(&graph, START_TYPES, &[a_idx], None, trace_options());
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn without_trace_only_direct_targets_are_pulled_in() {
        let graph = build(vec![("local", &[]), ("a", &["local"]), ("b", &["a"])]);
        let b = graph.index_of("b").unwrap();
        let options = DependOptions { trace: false, start: true, ..Default::default() };
        let working_set = depends(&graph, START_TYPES, &[b], None, options);
        let local = graph.index_of("local").unwrap();
        let a = graph.index_of("a").unwrap();
        assert!(working_set.contains(&a));
        assert!(!working_set.contains(&local));
    }

    #[test]
    fn strict_filters_out_services_not_in_runlevel() {
        let graph = build(vec![("net.eth0", &[]), ("sshd", &["net.eth0"])]);
        let sshd = graph.index_of("sshd").unwrap();
        let eth0 = graph.index_of("net.eth0").unwrap();
        let options = DependOptions { trace: true, strict: true, start: true, ..Default::default() };
        let in_runlevel = |idx: usize| idx == sshd;
        let working_set = depends(&graph, START_TYPES, &[sshd], Some(&in_runlevel), options);
        assert!(working_set.contains(&sshd));
        assert!(!working_set.contains(&eth0));
    }
}
