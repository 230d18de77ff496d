use anyhow::Result;
use colored::*;
use dovetail_core::build_manager::BuildManager;
use dovetail_core::results::{BuildResult, TaskReport};
use dovetail_core::tasks::get_task_color;
use dovetail_core::TaskState;

/// Share of the build time the "slowest tasks" section accounts for
const SLOWEST_FRACTION: f64 = 0.8;
const SLOWEST_MIN_SECS: f64 = 0.001;

pub fn execute(manager: &BuildManager, tasks: &[String], json: bool) -> Result<()> {
    if !json {
        println!("{} {}", "Running".bold(), tasks.join(", ").cyan());
        println!();
    }

    let result = manager.run(tasks).map_err(|e| {
        if e.is_framework_failure() {
            anyhow::anyhow!("Build aborted: {}", e)
        } else {
            anyhow::anyhow!("Failed to start build: {}", e)
        }
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_report(&result);
    }

    if !result.success {
        anyhow::bail!("Build failed: {}", result.failed.join(", "));
    }
    Ok(())
}

fn print_report(result: &BuildResult) {
    for report in &result.reports {
        println!("{}", report_line(report));
    }

    let slowest = result.slowest(SLOWEST_FRACTION, SLOWEST_MIN_SECS);
    if !slowest.is_empty() {
        println!();
        println!("{}", "Slowest tasks:".bold());
        for report in slowest {
            println!("  {:>8.3}s  {}", report.internal_secs, report.name);
        }
    }

    println!();
    if result.success {
        println!(
            "{} {}",
            "✓".green().bold(),
            format!(
                "{} tasks completed in {:.3}s",
                result.count(),
                result.total_elapsed().as_secs_f64()
            )
            .green()
            .bold()
        );
        return;
    }

    if let Some(cause) = result.root_cause() {
        let error = cause
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        println!(
            "{} {} {}",
            "✗".red().bold(),
            format!("{} failed:", cause.name).red().bold(),
            error
        );
    } else {
        println!("{} {}", "✗".red().bold(), "Build failed".red().bold());
    }
}

fn report_line(report: &TaskReport) -> String {
    let indent = "  ".repeat(report.depth);
    let name = report.name.color(get_task_color(&report.name)).bold();
    let state = match report.state {
        TaskState::Succeeded => report.state.as_str().green(),
        TaskState::Repeated => report.state.as_str().dimmed(),
        TaskState::Skipped => report.state.as_str().yellow(),
        TaskState::Failed | TaskState::Aborted => report.state.as_str().red(),
        TaskState::Running => report.state.as_str().normal(),
    };

    let mut line = format!("{}{} {}", indent, state, name);
    match report.state {
        TaskState::Succeeded | TaskState::Failed => {
            line.push_str(&format!(" ({:.3}s)", report.elapsed_secs).dimmed().to_string());
        }
        TaskState::Skipped if !report.skip_reasons.is_empty() => {
            line.push_str(&format!(" because {}", report.skip_reasons.join(" and ")));
        }
        _ => {}
    }
    if report.state == TaskState::Failed {
        if let Some(error) = &report.error {
            line.push_str(&format!(": {}", error));
        }
    }
    line
}
