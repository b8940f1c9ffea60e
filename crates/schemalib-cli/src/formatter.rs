use std::process::ExitCode;

use schemalib::{Finding, ItemSummary};
use serde_json::json;

use crate::commands::CommandResult;
use crate::error::CliError;

pub enum OutputFormat {
    Text,
    Json,
}

/// Renders a `CommandResult` as human-readable text or one JSON line and converts it
/// into an exit code.
pub fn emit_result(result: CommandResult, format: OutputFormat) -> Result<ExitCode, CliError> {
    match format {
        OutputFormat::Text => print_text(&result),
        OutputFormat::Json => print_json(&result),
    };
    Ok(ExitCode::from(result.exit_status().code()))
}

fn print_text(result: &CommandResult) {
    match result {
        CommandResult::WorkspaceInitialized {
            root,
            dot_dir,
            created,
            dry_run,
        } => {
            if *dry_run {
                if *created {
                    println!("Dry run: would initialize workspace at {root} (.schemalib at {dot_dir})");
                } else {
                    println!("Dry run: workspace already initialized at {root} (.schemalib at {dot_dir})");
                }
            } else if *created {
                println!("Initialized workspace at {root} (.schemalib: {dot_dir})");
            } else {
                println!("Workspace already initialized at {root} (.schemalib: {dot_dir})");
            }
        }
        CommandResult::ProjectCreated {
            project_id,
            name,
            path,
        } => {
            println!("Created project {project_id} ({name}) at {path}");
        }
        CommandResult::ProjectShown {
            project_id,
            name,
            path,
            items,
            findings,
        } => {
            println!("Project {project_id} ({name}) at {path}");
            if items.is_empty() {
                println!("  (no items)");
            }
            for item in items {
                print_item(item);
            }
            print_findings(findings);
        }
        CommandResult::ItemsAdded {
            project,
            items,
            findings,
        } => {
            println!("Project {project} now has {} item(s):", items.len());
            for item in items {
                print_item(item);
            }
            print_findings(findings);
        }
        CommandResult::ItemsRemoved { project, removed } => {
            println!("Removed {} item(s) from {project}:", removed.len());
            for item in removed {
                println!("  - {}", item.identity);
            }
        }
        CommandResult::Published { repository, items } => {
            println!("Published {} item(s) to {repository}:", items.len());
            for item in items {
                println!("  - {} [{}]", item.identity, item.status);
            }
        }
        CommandResult::ItemTransitioned { action, item } => {
            println!("{action}: {} is now {} [{}]", item.identity, item.state, item.status);
            if let Some(owner) = &item.locked_by {
                println!("  locked by {owner}");
            }
        }
    }
}

fn print_item(item: &ItemSummary) {
    let lock = item
        .locked_by
        .as_deref()
        .map(|owner| format!(" locked by {owner}"))
        .unwrap_or_default();
    println!(
        "  {} {} [{}]{lock}\n      {}",
        item.state, item.identity, item.status, item.location
    );
}

fn print_findings(findings: &[Finding]) {
    for finding in findings {
        println!("  ! {}: {}", finding.subject, finding.message);
    }
}

fn print_json(result: &CommandResult) {
    println!("{}", json!(result));
}
