use anyhow::Result;
use colored::*;
use dovetail_core::build_manager::BuildManager;
use dovetail_core::graph::describe_cycles;

pub fn execute(manager: &BuildManager) -> Result<()> {
    println!("{}", "Task Dependency Graph:".bold().underline());

    let result = manager
        .get_dependency_graph()
        .map_err(|e| anyhow::anyhow!("Failed to get dependency graph: {}", e))?;

    if !result.cycles.is_empty() {
        println!(
            "{} {}",
            "Warning:".yellow().bold(),
            format!(
                "Circular dependencies detected: {}",
                describe_cycles(&result.cycles)
            )
            .yellow()
        );
    }

    let graph = &result.graph;
    for node_index in graph.node_indices() {
        println!("{}", graph[node_index].blue().bold());

        // petgraph yields neighbors newest edge first
        let mut deps: Vec<&str> = graph
            .neighbors(node_index)
            .map(|neighbor| graph[neighbor].as_str())
            .collect();
        deps.reverse();

        if !deps.is_empty() {
            println!("  {} {}", "depends on:".dimmed(), deps.join(", "));
        } else {
            println!("  {}", "no dependencies".dimmed());
        }
        println!();
    }

    Ok(())
}
