//! Repository transports and the registry that resolves repository ids to clients.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RepositoryError, SchemalibError};
use crate::library::{LibraryIdentity, LibraryStatus};

pub mod filesystem;
pub mod http;

pub use filesystem::FileRepository;
pub use http::HttpRepository;

/// Local mirror of a repository item's metadata.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RepositoryItem {
    pub repository: String,
    pub identity: LibraryIdentity,
    pub status: LibraryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    /// Hex-encoded SHA-256 of the committed content.
    pub digest: String,
    /// Incremented on every content or metadata change; used for stale-write detection.
    pub revision: u64,
}

impl RepositoryItem {
    pub fn uri(&self) -> Result<Url, SchemalibError> {
        self.identity.repository_uri(&self.repository)
    }

    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }
}

/// Remote repository operations. Every call may block on I/O and may fail.
pub trait RepositoryClient: Send + Sync {
    fn id(&self) -> &str;

    /// Location string suitable for re-registering this repository.
    fn location(&self) -> String;

    /// The user lock ownership is evaluated against.
    fn user(&self) -> &str;

    fn item(&self, identity: &LibraryIdentity) -> Result<RepositoryItem, RepositoryError>;

    fn download(&self, item: &RepositoryItem) -> Result<String, RepositoryError>;

    fn can_write(&self, namespace: &str) -> Result<bool, RepositoryError>;

    fn publish(
        &self,
        content: &Path,
        identity: &LibraryIdentity,
        status: LibraryStatus,
    ) -> Result<RepositoryItem, RepositoryError>;

    fn lock(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError>;

    /// Releases the lock, first committing `commit` when given.
    fn unlock(
        &self,
        item: &RepositoryItem,
        commit: Option<&Path>,
    ) -> Result<RepositoryItem, RepositoryError>;

    /// Pushes WIP content while keeping the lock.
    fn commit(&self, item: &RepositoryItem, content: &Path)
    -> Result<RepositoryItem, RepositoryError>;

    /// Discards uncommitted remote WIP state while keeping the lock.
    fn revert(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError>;

    fn promote(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError>;

    fn demote(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError>;

    fn delete(&self, item: &RepositoryItem) -> Result<(), RepositoryError>;
}

/// Repository id to client mapping for one manager.
pub struct RepositoryRegistry {
    user: String,
    clients: BTreeMap<String, Arc<dyn RepositoryClient>>,
}

impl RepositoryRegistry {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            clients: BTreeMap::new(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn register(&mut self, client: Arc<dyn RepositoryClient>) {
        self.clients.insert(client.id().to_string(), client);
    }

    /// Creates and registers a client for `location`, choosing the transport by scheme.
    /// Relative filesystem paths resolve against `base_dir`.
    pub fn register_location(
        &mut self,
        id: &str,
        location: &str,
        base_dir: Option<&Path>,
    ) -> Result<Arc<dyn RepositoryClient>, SchemalibError> {
        let client: Arc<dyn RepositoryClient> = match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                Arc::new(HttpRepository::new(id, url, self.user.clone()))
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|_| {
                    SchemalibError::Location(format!("invalid file url {location}"))
                })?;
                Arc::new(FileRepository::open(id, path, self.user.clone())?)
            }
            Ok(url) if url.scheme().len() > 1 => {
                return Err(SchemalibError::Location(format!(
                    "unsupported repository scheme {} for {id}",
                    url.scheme()
                )));
            }
            _ => {
                let path = PathBuf::from(location);
                let path = match base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path,
                };
                Arc::new(FileRepository::open(id, path, self.user.clone())?)
            }
        };
        self.register(client.clone());
        Ok(client)
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn RepositoryClient>, SchemalibError> {
        self.clients
            .get(id)
            .cloned()
            .ok_or_else(|| SchemalibError::UnknownRepository(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    pub fn locations(&self) -> BTreeMap<String, String> {
        self.clients
            .iter()
            .map(|(id, client)| (id.clone(), client.location()))
            .collect()
    }
}
