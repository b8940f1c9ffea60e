use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::library::{LibraryIdentity, LibraryStatus};
use crate::model::LibraryKey;
use crate::registry::ItemState;

/// Failures reported by a repository transport.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{identity} not found in repository {repository}")]
    NotFound {
        repository: String,
        identity: LibraryIdentity,
    },
    #[error("permission denied for namespace {namespace} in repository {repository}")]
    PermissionDenied {
        repository: String,
        namespace: String,
    },
    #[error("conflict on {identity}: {message}")]
    Conflict {
        identity: LibraryIdentity,
        message: String,
    },
    #[error("repository {repository} unreachable: {message}")]
    Unreachable { repository: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("repository io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected lifecycle transitions. None of these leave partial state behind.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot {operation} {library}: item is {state}")]
    IllegalState {
        library: LibraryIdentity,
        operation: &'static str,
        state: ItemState,
    },
    #[error("cannot {operation} {library}: status is {status}")]
    StatusMismatch {
        library: LibraryIdentity,
        operation: &'static str,
        status: LibraryStatus,
    },
    #[error("{library} is locked by {owner}")]
    LockedByOther {
        library: LibraryIdentity,
        owner: String,
    },
    #[error("lock on {library} is no longer held by {user}")]
    LockLost {
        library: LibraryIdentity,
        user: String,
    },
    #[error("cannot lock {library}: WIP file {} is in use by {holder}", .path.display())]
    WipInUse {
        library: LibraryIdentity,
        holder: LibraryIdentity,
        path: PathBuf,
    },
}

/// Batch publish failures.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(
        "{} item(s) depend on {} unmanaged librar(y/ies) outside the publish batch",
        .pending.len(),
        .blocking.len()
    )]
    UnmanagedDependencies {
        pending: Vec<LibraryKey>,
        blocking: Vec<LibraryKey>,
    },
    #[error("permission denied: cannot publish namespace {namespace} to repository {repository}")]
    PermissionDenied {
        repository: String,
        namespace: String,
    },
    #[error("publish of {library} failed and the batch was rolled back: {source}")]
    Transfer {
        library: LibraryIdentity,
        #[source]
        source: Box<SchemalibError>,
    },
}

/// High-level error type shared across schemalib components.
#[derive(Debug, Error)]
pub enum SchemalibError {
    #[error("project error: {0}")]
    Project(String),
    #[error("duplicate project id: {0}")]
    DuplicateProjectId(String),
    #[error("duplicate project file: {}", .0.display())]
    DuplicateProjectFile(PathBuf),
    #[error("project handle belongs to a different project manager")]
    WrongManager,
    #[error("unknown library: {0}")]
    UnknownLibrary(LibraryKey),
    #[error("unknown repository: {0}")]
    UnknownRepository(String),
    #[error("failed to load {location}: {message}")]
    Load { location: String, message: String },
    #[error("invalid location: {0}")]
    Location(String),
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SchemalibError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SchemalibError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl SchemalibError {
    pub fn load(location: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Load {
            location: location.to_string(),
            message: message.to_string(),
        }
    }

    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            SchemalibError::Project(msg) => SchemalibError::Project(format!("{ctx}: {msg}")),
            SchemalibError::Load { location, message } => SchemalibError::Load {
                location,
                message: format!("{ctx}: {message}"),
            },
            SchemalibError::Location(msg) => SchemalibError::Location(format!("{ctx}: {msg}")),
            SchemalibError::Workspace(msg) => SchemalibError::Workspace(format!("{ctx}: {msg}")),
            SchemalibError::Serialization(msg) => {
                SchemalibError::Serialization(format!("{ctx}: {msg}"))
            }
            other => other,
        }
    }
}
