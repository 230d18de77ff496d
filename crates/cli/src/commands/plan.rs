use anyhow::Result;
use colored::*;
use dovetail_core::build_manager::BuildManager;

pub fn execute(manager: &BuildManager, tasks: &[String]) -> Result<()> {
    println!("{} {}", "Execution plan for".bold(), tasks.join(", ").cyan());

    let execution_plan = manager
        .get_execution_plan(tasks)
        .map_err(|e| anyhow::anyhow!("Failed to get execution plan: {}", e))?;

    println!("\n{}:", "Execution order".bold());
    for (i, task) in execution_plan.order.iter().enumerate() {
        let color = execution_plan
            .task_colors
            .get(task)
            .copied()
            .unwrap_or(Color::Cyan);
        println!("  {}. {}", i + 1, task.color(color));
    }

    Ok(())
}
