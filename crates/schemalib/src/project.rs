use std::fmt;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::LibraryKey;

/// Identifies one project manager instance; handles from another manager are rejected.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct ManagerId(pub(crate) u64);

/// Manager-local project slot.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct ProjectId(pub(crate) u64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project#{}", self.0)
    }
}

/// Caller-held reference to an open project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectHandle {
    pub(crate) manager: ManagerId,
    pub(crate) project: ProjectId,
}

impl ProjectHandle {
    pub fn project_id(&self) -> ProjectId {
        self.project
    }
}

/// A named, file-backed working set of libraries.
#[derive(Clone, Debug)]
pub struct Project {
    id: ProjectId,
    project_id: Option<String>,
    file: Option<PathBuf>,
    name: String,
    description: String,
    default_item: Option<LibraryKey>,
    members: Vec<LibraryKey>,
}

impl Project {
    pub(crate) fn new(
        id: ProjectId,
        project_id: impl Into<String>,
        file: PathBuf,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            project_id: Some(project_id.into()),
            file: Some(file),
            name: name.into(),
            description: description.into(),
            default_item: None,
            members: Vec::new(),
        }
    }

    /// The project holding built-in libraries. It has neither identifier nor file.
    pub(crate) fn builtin(id: ProjectId) -> Self {
        Self {
            id,
            project_id: None,
            file: None,
            name: "Built-In Libraries".into(),
            description: String::new(),
            default_item: None,
            members: Vec::new(),
        }
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_item(&self) -> Option<LibraryKey> {
        self.default_item
    }

    /// Members in insertion order.
    pub fn members(&self) -> &[LibraryKey] {
        &self.members
    }

    pub fn contains(&self, key: LibraryKey) -> bool {
        self.members.contains(&key)
    }

    pub fn is_builtin(&self) -> bool {
        self.project_id.is_none()
    }

    pub(crate) fn add_member(&mut self, key: LibraryKey) -> bool {
        if self.contains(key) {
            return false;
        }
        self.members.push(key);
        true
    }

    pub(crate) fn remove_member(&mut self, key: LibraryKey) -> bool {
        let before = self.members.len();
        self.members.retain(|member| *member != key);
        if self.default_item == Some(key) {
            self.default_item = None;
        }
        before != self.members.len()
    }

    pub(crate) fn set_default_item(&mut self, key: Option<LibraryKey>) {
        self.default_item = key;
    }
}
