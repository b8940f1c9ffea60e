use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SchemalibError;
use crate::library::LibraryIdentity;

/// Persisted form of a project.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub project_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<DescriptorItem>,
    /// Repository id to location, used to register repositories referenced by managed items.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub repositories: BTreeMap<String, String>,
}

/// One declared project member.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DescriptorItem {
    Unmanaged {
        /// Path relative to the project file's directory.
        path: String,
        #[serde(default, skip_serializing_if = "is_false")]
        default: bool,
    },
    Managed {
        repository: String,
        namespace: String,
        filename: String,
        version: String,
        #[serde(default, skip_serializing_if = "is_false")]
        default: bool,
    },
}

impl DescriptorItem {
    pub fn is_default(&self) -> bool {
        match self {
            DescriptorItem::Unmanaged { default, .. } | DescriptorItem::Managed { default, .. } => {
                *default
            }
        }
    }

    pub fn managed(repository: impl Into<String>, identity: LibraryIdentity, default: bool) -> Self {
        DescriptorItem::Managed {
            repository: repository.into(),
            namespace: identity.namespace,
            filename: identity.filename,
            version: identity.version,
            default,
        }
    }
}

impl ProjectDescriptor {
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            description: String::new(),
            items: Vec::new(),
            repositories: BTreeMap::new(),
        }
    }

    pub fn read(path: &Path) -> Result<Self, SchemalibError> {
        let text = fs::read_to_string(path)
            .map_err(|err| SchemalibError::load(path.display(), err))?;
        let descriptor: Self = serde_yaml::from_str(&text)
            .map_err(|err| SchemalibError::load(path.display(), err))?;
        if descriptor.project_id.trim().is_empty() {
            return Err(SchemalibError::load(
                path.display(),
                "project_id must not be empty",
            ));
        }
        Ok(descriptor)
    }

    pub fn write(&self, path: &Path) -> Result<(), SchemalibError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
