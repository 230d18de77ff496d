use anyhow::Result;
use colored::*;
use dovetail_core::build_manager::BuildManager;

pub fn execute(manager: &BuildManager) -> Result<()> {
    let result = manager.list_tasks()?;

    let heading = match &manager.config_name {
        Some(name) => format!("Tasks in {}", name),
        None => "Tasks".to_string(),
    };
    println!("{}", heading.bold().underline());
    if let Some(description) = &manager.config_description {
        println!("{}", description.dimmed());
    }

    if result.tasks.is_empty() {
        println!("  {}", "No tasks found".dimmed());
        return Ok(());
    }

    for task in &result.tasks {
        let color = result
            .task_colors
            .get(&task.name)
            .copied()
            .unwrap_or(Color::Blue);
        match &task.description {
            Some(description) => println!("{}  {}", task.name.color(color).bold(), description),
            None => println!("{}", task.name.color(color).bold()),
        }

        if !task.dependencies.is_empty() {
            println!("  {} {}", "depends on:".dimmed(), task.dependencies.join(", "));
        }
        if !task.directives.is_empty() {
            println!("  {} {}", "directives:".dimmed(), task.directives.join(", "));
        }
        if let Some(dir) = &task.working_directory {
            println!("  {} {}", "directory:".dimmed(), dir.display());
        }
    }

    Ok(())
}
