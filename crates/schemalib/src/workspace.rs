use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::SchemalibError;
use crate::manager::ManagerSettings;
use crate::repository::RepositoryRegistry;

pub const DOT_DIR: &str = ".schemalib";
pub const CONFIG_FILE: &str = "config.yaml";
pub const USER_ENV: &str = "SCHEMALIB_USER";

/// Canonical paths for a schemalib workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspacePaths {
    root: PathBuf,
    dot_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: PathBuf, dot_dir: PathBuf) -> Self {
        Self { root, dot_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the `.schemalib` folder for this workspace.
    pub fn dot_dir(&self) -> &Path {
        &self.dot_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.dot_dir.join(CONFIG_FILE)
    }

    /// Default WIP folder (`{root}/.schemalib/wip`).
    pub fn default_wip_dir(&self) -> PathBuf {
        self.dot_dir.join("wip")
    }
}

/// Contents of `.schemalib/config.yaml`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub user: Option<String>,
    /// Relative paths resolve against the workspace root.
    #[serde(default)]
    pub wip_folder: Option<PathBuf>,
    #[serde(default = "default_auto_save")]
    pub auto_save: bool,
    /// Repository id to filesystem path or URL.
    #[serde(default)]
    pub repositories: BTreeMap<String, String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            user: None,
            wip_folder: None,
            auto_save: default_auto_save(),
            repositories: BTreeMap::new(),
        }
    }
}

fn default_auto_save() -> bool {
    true
}

impl WorkspaceConfig {
    /// Reads the config file, falling back to defaults when it does not exist.
    pub fn load(paths: &WorkspacePaths) -> Result<Self, SchemalibError> {
        let path = paths.config_file();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)?;
        serde_yaml::from_str(&text).map_err(|err| {
            SchemalibError::Workspace(format!("invalid config {}: {err}", path.display()))
        })
    }

    pub fn save(&self, paths: &WorkspacePaths) -> Result<(), SchemalibError> {
        fs::create_dir_all(paths.dot_dir())?;
        fs::write(paths.config_file(), serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// `SCHEMALIB_USER` wins over the configured user.
    pub fn resolved_user(&self) -> Result<String, SchemalibError> {
        if let Ok(user) = env::var(USER_ENV) {
            if !user.trim().is_empty() {
                return Ok(user);
            }
        }
        self.user.clone().ok_or_else(|| {
            SchemalibError::Workspace(format!(
                "no user configured; set `user` in {CONFIG_FILE} or {USER_ENV}"
            ))
        })
    }

    pub fn settings(&self, paths: &WorkspacePaths) -> ManagerSettings {
        let wip_folder = match &self.wip_folder {
            Some(folder) if folder.is_relative() => paths.root().join(folder),
            Some(folder) => folder.clone(),
            None => paths.default_wip_dir(),
        };
        ManagerSettings {
            wip_folder,
            auto_save: self.auto_save,
        }
    }

    /// Registers every configured repository. Relative paths resolve against the root.
    pub fn repositories(&self, paths: &WorkspacePaths) -> Result<RepositoryRegistry, SchemalibError> {
        let mut registry = RepositoryRegistry::new(self.resolved_user()?);
        for (id, location) in &self.repositories {
            registry
                .register_location(id, location, Some(paths.root()))
                .map_err(|err| err.context(format!("repository {id}")))?;
        }
        Ok(registry)
    }
}

/// Trait describing a reusable workspace locator.
pub trait WorkspaceLocator: Send + Sync {
    fn workspace(&self) -> Result<WorkspacePaths, SchemalibError>;
}

/// Filesystem-backed workspace locator with lightweight caching.
pub struct FilesystemWorkspaceLocator {
    start: PathBuf,
    cache: Mutex<Option<WorkspacePaths>>,
}

impl FilesystemWorkspaceLocator {
    pub fn new(start: impl Into<PathBuf>) -> Self {
        Self {
            start: start.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn from_current_dir() -> Result<Self, SchemalibError> {
        Ok(Self::new(env::current_dir()?))
    }
}

impl WorkspaceLocator for FilesystemWorkspaceLocator {
    fn workspace(&self) -> Result<WorkspacePaths, SchemalibError> {
        if let Some(paths) = self.cache.lock().clone() {
            if paths.root().is_dir() && paths.dot_dir().is_dir() {
                return Ok(paths);
            }
        }

        let discovered = discover(&self.start)?;
        *self.cache.lock() = Some(discovered.clone());
        Ok(discovered)
    }
}

/// Performs one-off workspace discovery from an arbitrary starting path.
pub fn discover(start: impl AsRef<Path>) -> Result<WorkspacePaths, SchemalibError> {
    let canonical_start = normalize_start(start.as_ref())?;

    for ancestor in canonical_start.ancestors() {
        let candidate = ancestor.join(DOT_DIR);
        if candidate.is_dir() {
            return Ok(WorkspacePaths::new(ancestor.to_path_buf(), candidate));
        }
    }

    Err(SchemalibError::Workspace(format!(
        "no {DOT_DIR} directory found from {}",
        canonical_start.display()
    )))
}

fn normalize_start(start: &Path) -> Result<PathBuf, SchemalibError> {
    let mut cursor = start.to_path_buf();

    // Walk up until a real path exists to avoid failures for not-yet-created files.
    while !cursor.exists() {
        if !cursor.pop() {
            return Err(SchemalibError::Workspace(format!(
                "unable to find existing ancestor for {}",
                start.display()
            )));
        }
    }

    if cursor.is_file() {
        cursor = cursor.parent().map(Path::to_path_buf).ok_or_else(|| {
            SchemalibError::Workspace(format!(
                "file path {} has no parent directory",
                start.display()
            ))
        })?;
    }

    Ok(fs::canonicalize(cursor)?)
}
