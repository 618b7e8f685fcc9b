//! DAG validation, wave computation, and dependent closure.
//!
//! Uses `petgraph` to model task dependencies as a directed graph. Topological
//! sort detects cycles iteratively (no recursion depth limit on large
//! workflows), and depth-based grouping produces the waves a fully parallel
//! run would execute.

use std::collections::{BTreeSet, HashMap, HashSet};

use conductor_types::execution::TaskRun;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::error::WorkflowError;
use super::manifest::TaskManifest;
use super::task::TaskDefinition;

/// Anything with an id and a list of dependency ids.
pub trait DagNode {
    fn node_id(&self) -> &str;
    fn dependency_ids(&self) -> &[String];
}

impl DagNode for TaskDefinition {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn dependency_ids(&self) -> &[String] {
        &self.dependencies
    }
}

impl DagNode for TaskManifest {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn dependency_ids(&self) -> &[String] {
        &self.depends_on
    }
}

impl DagNode for TaskRun {
    fn node_id(&self) -> &str {
        &self.task_id
    }

    fn dependency_ids(&self) -> &[String] {
        &self.dependencies
    }
}

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

/// Build the dependency graph (edge from dependency -> dependent).
///
/// Rejects duplicate ids and dangling dependencies.
fn build_graph<N: DagNode>(nodes: &[N]) -> Result<DiGraph<&str, ()>, WorkflowError> {
    let mut graph = DiGraph::<&str, ()>::with_capacity(nodes.len(), nodes.len());
    let mut id_to_idx: HashMap<&str, NodeIndex> = HashMap::with_capacity(nodes.len());

    for node in nodes {
        let idx = graph.add_node(node.node_id());
        if id_to_idx.insert(node.node_id(), idx).is_some() {
            return Err(WorkflowError::DuplicateTaskId(node.node_id().to_string()));
        }
    }

    for node in nodes {
        let to_idx = id_to_idx[node.node_id()];
        for dep in node.dependency_ids() {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                WorkflowError::UnknownDependency {
                    task: node.node_id().to_string(),
                    dependency: dep.clone(),
                }
            })?;
            graph.add_edge(*from_idx, to_idx, ());
        }
    }

    Ok(graph)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that `nodes` form a DAG: unique ids, no dangling dependencies,
/// no cycles (self-dependencies included).
pub fn validate_dag<N: DagNode>(nodes: &[N]) -> Result<(), WorkflowError> {
    let graph = build_graph(nodes)?;

    toposort(&graph, None).map_err(|cycle| {
        WorkflowError::CycleDetected(graph[cycle.node_id()].to_string())
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Topological order
// ---------------------------------------------------------------------------

/// Deterministic topological order: Kahn's algorithm that always releases
/// the earliest-declared ready node first.
///
/// For an already-sorted declaration this is the declaration order itself.
pub fn topological_order<N: DagNode>(nodes: &[N]) -> Result<Vec<&str>, WorkflowError> {
    validate_dag(nodes)?;

    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.node_id(), i))
        .collect();
    let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.dependency_ids().len()).collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for dep in node.dependency_ids() {
            children[position[dep.as_str()]].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = ready.pop_first() {
        order.push(nodes[i].node_id());
        for &child in &children[i] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    Ok(order)
}

// ---------------------------------------------------------------------------
// Execution waves
// ---------------------------------------------------------------------------

/// Group node ids into waves where every node's dependencies live in earlier
/// waves. Index 0 holds the roots. Ids keep declaration order within a wave.
pub fn execution_waves<N: DagNode>(nodes: &[N]) -> Result<Vec<Vec<&str>>, WorkflowError> {
    if nodes.is_empty() {
        return Ok(vec![]);
    }

    let graph = build_graph(nodes)?;
    let sorted = toposort(&graph, None).map_err(|cycle| {
        WorkflowError::CycleDetected(graph[cycle.node_id()].to_string())
    })?;

    let by_id: HashMap<&str, &N> = nodes.iter().map(|n| (n.node_id(), n)).collect();

    // Depth = longest path from a root
    let mut depths: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for idx in sorted {
        let id = graph[idx];
        let depth = by_id[id]
            .dependency_ids()
            .iter()
            .map(|dep| depths.get(dep.as_str()).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depths.insert(id, depth);
    }

    let max_depth = depths.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&str>> = vec![vec![]; max_depth + 1];
    for node in nodes {
        waves[depths[node.node_id()]].push(node.node_id());
    }

    Ok(waves)
}

// ---------------------------------------------------------------------------
// Dependent closure
// ---------------------------------------------------------------------------

/// Every node that transitively depends on `id`, excluding `id` itself.
///
/// Unknown ids yield an empty set.
pub fn transitive_dependents<'a, N: DagNode>(id: &str, nodes: &'a [N]) -> HashSet<&'a str> {
    let mut dependents: HashMap<&str, Vec<&'a str>> = HashMap::new();
    for node in nodes {
        for dep in node.dependency_ids() {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(node.node_id());
        }
    }

    let mut visited = HashSet::new();
    let mut stack: Vec<&str> = vec![id];
    while let Some(current) = stack.pop() {
        if let Some(children) = dependents.get(current) {
            for &child in children {
                if visited.insert(child) {
                    stack.push(child);
                }
            }
        }
    }

    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::task::action_fn;
    use serde_json::Value;

    fn task(id: &str, deps: &[&str]) -> TaskDefinition {
        TaskDefinition::new(id, action_fn(|_| async { Ok(Value::Null) }))
            .depends_on(deps.iter().copied())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_validate_dag_valid() {
        let tasks = vec![task("a", &[]), task("b", &["a"])];
        assert!(validate_dag(&tasks).is_ok());
    }

    #[test]
    fn test_validate_dag_empty_is_valid() {
        let tasks: Vec<TaskDefinition> = vec![];
        assert!(validate_dag(&tasks).is_ok());
    }

    #[test]
    fn test_validate_dag_cycle() {
        let tasks = vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])];
        let err = validate_dag(&tasks).unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(_)), "got: {err}");
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn test_validate_dag_self_dependency_is_cycle() {
        let tasks = vec![task("a", &["a"])];
        assert!(matches!(
            validate_dag(&tasks).unwrap_err(),
            WorkflowError::CycleDetected(id) if id == "a"
        ));
    }

    #[test]
    fn test_validate_dag_unknown_dep() {
        let tasks = vec![task("a", &[]), task("b", &["missing"])];
        match validate_dag(&tasks).unwrap_err() {
            WorkflowError::UnknownDependency { task, dependency } => {
                assert_eq!(task, "b");
                assert_eq!(dependency, "missing");
            }
            other => panic!("expected UnknownDependency, got {other}"),
        }
    }

    #[test]
    fn test_validate_dag_duplicate_id() {
        let tasks = vec![task("a", &[]), task("a", &[])];
        assert!(matches!(
            validate_dag(&tasks).unwrap_err(),
            WorkflowError::DuplicateTaskId(id) if id == "a"
        ));
    }

    // -----------------------------------------------------------------------
    // Topological order
    // -----------------------------------------------------------------------

    #[test]
    fn test_topological_order_sorts_out_of_order_declarations() {
        let tasks = vec![task("c", &["b"]), task("b", &["a"]), task("a", &[])];
        assert_eq!(topological_order(&tasks).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_topological_order_keeps_declaration_order_for_peers() {
        let tasks = vec![
            task("root", &[]),
            task("z", &["root"]),
            task("m", &["root"]),
            task("a", &["root"]),
        ];
        assert_eq!(
            topological_order(&tasks).unwrap(),
            vec!["root", "z", "m", "a"]
        );
    }

    #[test]
    fn test_topological_order_rejects_cycles() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"])];
        assert!(topological_order(&tasks).is_err());
    }

    // -----------------------------------------------------------------------
    // Waves
    // -----------------------------------------------------------------------

    #[test]
    fn test_linear_chain_n_waves() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])];
        let waves = execution_waves(&tasks).unwrap();
        assert_eq!(waves, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn test_diamond_three_waves() {
        let tasks = vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ];
        let waves = execution_waves(&tasks).unwrap();
        assert_eq!(waves, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn test_uneven_branches_use_longest_path() {
        // a -> b -> c -> e, a -> d -> e
        let tasks = vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("d", &["a"]),
            task("e", &["c", "d"]),
        ];
        let waves = execution_waves(&tasks).unwrap();
        assert_eq!(waves.len(), 4);
        assert_eq!(waves[1], vec!["b", "d"]);
        assert_eq!(waves[3], vec!["e"]);
    }

    #[test]
    fn test_empty_waves() {
        let tasks: Vec<TaskDefinition> = vec![];
        assert!(execution_waves(&tasks).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Dependents
    // -----------------------------------------------------------------------

    #[test]
    fn test_transitive_dependents_of_diamond_branch() {
        let tasks = vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
            task("e", &["d"]),
        ];
        let mut deps: Vec<_> = transitive_dependents("b", &tasks).into_iter().collect();
        deps.sort();
        assert_eq!(deps, vec!["d", "e"]);

        assert_eq!(transitive_dependents("a", &tasks).len(), 4);
        assert!(transitive_dependents("e", &tasks).is_empty());
        assert!(transitive_dependents("nope", &tasks).is_empty());
    }

    #[test]
    fn test_task_runs_are_dag_nodes() {
        let runs = vec![
            TaskRun::new("a", vec![]),
            TaskRun::new("b", vec!["a".into()]),
        ];
        assert!(validate_dag(&runs).is_ok());
        assert!(transitive_dependents("a", &runs).contains("b"));
    }
}
