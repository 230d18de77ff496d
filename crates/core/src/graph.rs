//! Static view of the task graph
//!
//! The processor detects cycles dynamically, only along paths it actually
//! walks. This module looks at the whole declared graph up front so the CLI
//! can warn about cycles and show what a build would do before running it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::kosaraju_scc;
use petgraph::prelude::*;

use crate::model::dependencies::Dependencies;
use crate::model::task::Task;
use crate::results::DependencyGraphResult;
use crate::types::{DovetailError, DovetailResult};

/// Build the dependency graph; edges point from a task to its dependency
pub fn build_dependency_graph(dependencies: &Dependencies) -> DependencyGraphResult {
    let mut graph = DiGraph::<String, ()>::new();
    let mut node_indices = HashMap::new();

    for task in dependencies.tasks() {
        let node_index = graph.add_node(task.name().to_string());
        node_indices.insert(task.name().to_string(), node_index);
    }

    for task in dependencies.tasks() {
        let from_node = node_indices[task.name()];
        for dependency in dependencies.get(task) {
            // Dependencies only holds registered tasks
            if let Some(&to_node) = node_indices.get(dependency.name()) {
                graph.add_edge(from_node, to_node, ());
            }
        }
    }

    let mut cycles: Vec<Vec<String>> = kosaraju_scc(&graph)
        .into_iter()
        .filter_map(|component| {
            if component.len() > 1 {
                let mut cycle = component
                    .iter()
                    .map(|node| graph[*node].clone())
                    .collect::<Vec<_>>();
                cycle.sort();
                Some(cycle)
            } else {
                let node = component[0];
                if graph.contains_edge(node, node) {
                    Some(vec![graph[node].clone()])
                } else {
                    None
                }
            }
        })
        .collect();

    cycles.sort();

    DependencyGraphResult { graph, cycles }
}

/// Format cycles as `a -> b -> a; c -> c`
pub fn describe_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            let mut path = cycle.clone();
            if let Some(first) = path.first().cloned() {
                path.push(first);
            }
            path.join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// The order in which task bodies would run for `roots` if nothing fails or
/// is skipped: depth first, siblings in declared order, each task once.
pub fn plan_execution(
    dependencies: &Dependencies,
    roots: &[Arc<Task>],
) -> DovetailResult<Vec<String>> {
    let mut order = Vec::new();
    let mut done = HashSet::new();
    let mut stack = Vec::new();

    for root in roots {
        visit(dependencies, root, &mut stack, &mut done, &mut order)?;
    }

    Ok(order)
}

fn visit(
    dependencies: &Dependencies,
    task: &Arc<Task>,
    stack: &mut Vec<String>,
    done: &mut HashSet<String>,
    order: &mut Vec<String>,
) -> DovetailResult<()> {
    if done.contains(task.name()) {
        return Ok(());
    }
    if stack.iter().any(|name| name == task.name()) {
        let mut cycle = stack.clone();
        cycle.push(task.name().to_string());
        return Err(DovetailError::CircularDependency {
            task: task.name().to_string(),
            stack: cycle,
        });
    }

    stack.push(task.name().to_string());
    for dependency in dependencies.get(task) {
        visit(dependencies, dependency, stack, done, order)?;
    }
    stack.pop();

    done.insert(task.name().to_string());
    order.push(task.name().to_string());
    Ok(())
}
