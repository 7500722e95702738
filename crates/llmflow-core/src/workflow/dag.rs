//! DAG builder and deterministic execution ordering.
//!
//! Uses `petgraph` to model step dependencies as a directed graph (edge from
//! dependency to dependent) and orders it with Kahn's algorithm. Node indices
//! follow declaration order, and the FIFO queue is always fed in that order,
//! so the resulting order depends only on the step list itself.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use llmflow_types::workflow::StepDefinition;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors in the shape of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A `depends_on` entry names a step that is not in the list.
    #[error("unknown dependency '{dependency}' in step '{step_id}'")]
    UnknownDependency { step_id: String, dependency: String },

    /// Two steps share an ID.
    #[error("duplicate step id '{0}'")]
    DuplicateStep(String),

    /// Every step that could not be ordered, in declaration order.
    #[error("cycle detected among steps: {}", .step_ids.join(", "))]
    Cycle { step_ids: Vec<String> },
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// Execution order plus adjacency of a step list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowGraph {
    /// Every step ID, each after all of its dependencies.
    pub order: Vec<String>,
    /// Dependency ID -> dependents, both in declaration order. Every step has an entry.
    pub edges: IndexMap<String, Vec<String>>,
}

/// Build the dependency graph and execution order for `steps`.
pub fn build_graph(steps: &[StepDefinition]) -> Result<WorkflowGraph, GraphError> {
    let graph = dependency_graph(steps)?;

    let edges = graph
        .node_indices()
        .map(|idx| {
            let dependents = dependents_in_order(&graph, idx)
                .into_iter()
                .map(|d| graph[d].to_string())
                .collect();
            (graph[idx].to_string(), dependents)
        })
        .collect();

    let order = kahn_order(&graph)?;
    Ok(WorkflowGraph { order, edges })
}

/// Topologically order `steps` with Kahn's algorithm.
///
/// 1. Reject unknown dependencies before any ordering is attempted.
/// 2. Seed a FIFO queue with zero in-degree steps in declaration order.
/// 3. Dequeue, emit, and decrement each dependent's in-degree, enqueueing
///    dependents (in declaration order) as they reach zero.
/// 4. If anything is left unordered, report all of it as a cycle.
pub fn topo_sort(steps: &[StepDefinition]) -> Result<Vec<String>, GraphError> {
    let graph = dependency_graph(steps)?;
    kahn_order(&graph)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn dependency_graph(steps: &[StepDefinition]) -> Result<DiGraph<&str, ()>, GraphError> {
    let mut graph = DiGraph::<&str, ()>::with_capacity(steps.len(), 0);
    let mut id_to_idx: HashMap<&str, NodeIndex> = HashMap::with_capacity(steps.len());

    for step in steps {
        let idx = graph.add_node(step.id.as_str());
        if id_to_idx.insert(step.id.as_str(), idx).is_some() {
            return Err(GraphError::DuplicateStep(step.id.clone()));
        }
    }

    // Edge from dependency -> dependent; repeated entries become parallel edges.
    for step in steps {
        let to_idx = id_to_idx[step.id.as_str()];
        for dep in &step.depends_on {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                GraphError::UnknownDependency {
                    step_id: step.id.clone(),
                    dependency: dep.clone(),
                }
            })?;
            graph.add_edge(*from_idx, to_idx, ());
        }
    }

    Ok(graph)
}

/// Outgoing neighbours sorted back into declaration order.
///
/// petgraph walks edges newest-first; node indices are declaration indices
/// and the sort is stable, so parallel edges stay adjacent.
fn dependents_in_order(graph: &DiGraph<&str, ()>, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut dependents: Vec<NodeIndex> = graph
        .neighbors_directed(idx, Direction::Outgoing)
        .collect();
    dependents.sort_by_key(|n| n.index());
    dependents
}

fn kahn_order(graph: &DiGraph<&str, ()>) -> Result<Vec<String>, GraphError> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();

    let mut queue: VecDeque<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    let mut placed = vec![false; graph.node_count()];

    while let Some(node) = queue.pop_front() {
        order.push(graph[node].to_string());
        placed[node.index()] = true;
        for dependent in dependents_in_order(graph, node) {
            in_degree[dependent.index()] -= 1;
            if in_degree[dependent.index()] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != graph.node_count() {
        let step_ids = graph
            .node_indices()
            .filter(|idx| !placed[idx.index()])
            .map(|idx| graph[idx].to_string())
            .collect();
        return Err(GraphError::Cycle { step_ids });
    }

    tracing::debug!(steps = order.len(), "execution order resolved");
    Ok(order)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
