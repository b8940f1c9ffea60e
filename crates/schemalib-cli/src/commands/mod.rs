use schemalib::{Finding, FindingSeverity, ItemSummary, RepositoryItem};
use serde::Serialize;

use crate::error::ExitStatus;

pub mod init;
pub mod items;
pub mod lifecycle;
pub mod project;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult {
    WorkspaceInitialized {
        root: String,
        dot_dir: String,
        created: bool,
        dry_run: bool,
    },
    ProjectCreated {
        project_id: String,
        name: String,
        path: String,
    },
    ProjectShown {
        project_id: String,
        name: String,
        path: String,
        items: Vec<ItemSummary>,
        findings: Vec<Finding>,
    },
    ItemsAdded {
        project: String,
        items: Vec<ItemSummary>,
        findings: Vec<Finding>,
    },
    ItemsRemoved {
        project: String,
        removed: Vec<ItemSummary>,
    },
    Published {
        repository: String,
        items: Vec<RepositoryItem>,
    },
    ItemTransitioned {
        action: String,
        item: ItemSummary,
    },
}

impl CommandResult {
    pub fn exit_status(&self) -> ExitStatus {
        let findings = match self {
            CommandResult::ProjectShown { findings, .. }
            | CommandResult::ItemsAdded { findings, .. } => findings.as_slice(),
            _ => &[],
        };
        if findings
            .iter()
            .any(|finding| finding.severity == FindingSeverity::Error)
        {
            ExitStatus::Data
        } else {
            ExitStatus::Ok
        }
    }
}
