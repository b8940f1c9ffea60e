use std::env;
use std::path::{Path, PathBuf};

use schemalib::workspace::{FilesystemWorkspaceLocator, WorkspaceLocator, WorkspacePaths};
use schemalib::{Finding, ManagerSettings, ProjectHandle, ProjectManager, WorkspaceConfig};

use crate::error::{CliError, ExitStatus};
use crate::util::Verbosity;

pub struct CliSession {
    pub workspace_paths: WorkspacePaths,
    pub config: WorkspaceConfig,
    pub settings: ManagerSettings,
    pub user: String,
    pub verbosity: Verbosity,
}

/// A project loaded into a fresh manager for the duration of one command.
pub struct OpenProject {
    pub manager: ProjectManager,
    pub handle: ProjectHandle,
    pub path: PathBuf,
    pub findings: Vec<Finding>,
}

impl CliSession {
    pub fn bootstrap(
        workspace_override: Option<String>,
        verbosity: Verbosity,
    ) -> Result<Self, CliError> {
        let locator = match workspace_override {
            Some(path) => {
                let locator = FilesystemWorkspaceLocator::new(PathBuf::from(path));
                locator.workspace()?;
                locator
            }
            None => FilesystemWorkspaceLocator::from_current_dir()?,
        };

        let workspace_paths = locator.workspace()?;
        let config = WorkspaceConfig::load(&workspace_paths)
            .map_err(|err| CliError::new(err.to_string(), ExitStatus::Config))?;
        let user = config
            .resolved_user()
            .map_err(|err| CliError::new(err.to_string(), ExitStatus::Config))?;
        let settings = config.settings(&workspace_paths);

        Ok(Self {
            workspace_paths,
            config,
            settings,
            user,
            verbosity,
        })
    }

    /// Builds a manager with every configured repository registered.
    pub fn manager(&self) -> Result<ProjectManager, CliError> {
        let repositories = self
            .config
            .repositories(&self.workspace_paths)
            .map_err(|err| CliError::new(err.to_string(), ExitStatus::Config))?;
        Ok(ProjectManager::new(self.settings.clone(), repositories))
    }

    pub fn open_project(&self, raw: &str) -> Result<OpenProject, CliError> {
        let path = resolve_path(raw)?;
        let mut manager = self.manager()?;
        let load = manager.load_project(&path)?;
        for finding in &load.findings {
            tracing::warn!(subject = %finding.subject, "{}", finding.message);
        }
        Ok(OpenProject {
            manager,
            handle: load.project,
            path,
            findings: load.findings,
        })
    }

    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(self.workspace_paths.root())
            .map(|relative| relative.display().to_string())
            .unwrap_or_else(|_| path.display().to_string())
    }
}

/// Resolves a user-supplied path against the current directory.
pub fn resolve_path(raw: &str) -> Result<PathBuf, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::new("path must not be empty", ExitStatus::Usage));
    }
    let candidate = PathBuf::from(trimmed);
    if candidate.is_absolute() {
        Ok(candidate)
    } else {
        Ok(env::current_dir()?.join(candidate))
    }
}
