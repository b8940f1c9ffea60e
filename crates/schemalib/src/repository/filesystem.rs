use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RepositoryError;
use crate::library::{LibraryIdentity, LibraryStatus};
use crate::repository::{RepositoryClient, RepositoryItem};

const ITEMS_DIR: &str = "items";
const METADATA_FILE: &str = "item.json";
const PERMISSIONS_FILE: &str = "permissions.json";

/// Namespace write grants. Namespaces without an entry are writable by everyone.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryPermissions {
    #[serde(default)]
    pub namespaces: BTreeMap<String, Vec<String>>,
}

/// Directory-backed repository.
///
/// Layout: `{root}/items/{namespace digest}/{filename}/{version}/` holding the content file
/// and `item.json`. Grants live in `{root}/permissions.json`.
pub struct FileRepository {
    id: String,
    root: PathBuf,
    user: String,
    io_guard: Mutex<()>,
}

impl FileRepository {
    pub fn open(
        id: impl Into<String>,
        root: impl Into<PathBuf>,
        user: impl Into<String>,
    ) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(ITEMS_DIR))?;
        Ok(Self {
            id: id.into(),
            root,
            user: user.into(),
            io_guard: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_permissions(&self, permissions: &RepositoryPermissions) -> io::Result<()> {
        let body = serde_json::to_string_pretty(permissions).map_err(io::Error::other)?;
        fs::write(self.root.join(PERMISSIONS_FILE), body)
    }

    fn item_dir(&self, identity: &LibraryIdentity) -> PathBuf {
        let namespace = hex::encode(Sha256::digest(identity.namespace.as_bytes()));
        self.root
            .join(ITEMS_DIR)
            .join(&namespace[..16])
            .join(&identity.filename)
            .join(&identity.version)
    }

    fn content_path(&self, identity: &LibraryIdentity) -> PathBuf {
        self.item_dir(identity).join(&identity.filename)
    }

    fn read_item(&self, identity: &LibraryIdentity) -> Result<RepositoryItem, RepositoryError> {
        let path = self.item_dir(identity).join(METADATA_FILE);
        if !path.exists() {
            return Err(RepositoryError::NotFound {
                repository: self.id.clone(),
                identity: identity.clone(),
            });
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|err| {
            RepositoryError::Transport(format!("corrupt metadata {}: {err}", path.display()))
        })
    }

    fn write_item(&self, item: &RepositoryItem) -> Result<(), RepositoryError> {
        let dir = self.item_dir(&item.identity);
        fs::create_dir_all(&dir)?;
        let body = serde_json::to_string_pretty(item)
            .map_err(|err| RepositoryError::Transport(err.to_string()))?;
        fs::write(dir.join(METADATA_FILE), body)?;
        Ok(())
    }

    fn store_content(
        &self,
        identity: &LibraryIdentity,
        source: &Path,
    ) -> Result<String, RepositoryError> {
        let bytes = fs::read(source)?;
        let target = self.content_path(identity);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&target, &bytes)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    fn permissions(&self) -> Result<RepositoryPermissions, RepositoryError> {
        let path = self.root.join(PERMISSIONS_FILE);
        if !path.exists() {
            return Ok(RepositoryPermissions::default());
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|err| {
            RepositoryError::Transport(format!("corrupt permissions {}: {err}", path.display()))
        })
    }

    fn ensure_writable(&self, namespace: &str) -> Result<(), RepositoryError> {
        if self.can_write(namespace)? {
            Ok(())
        } else {
            Err(RepositoryError::PermissionDenied {
                repository: self.id.clone(),
                namespace: namespace.to_string(),
            })
        }
    }

    /// Reads current metadata and rejects writes based on an outdated mirror.
    fn current(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        let current = self.read_item(&item.identity)?;
        if current.revision != item.revision {
            return Err(RepositoryError::Conflict {
                identity: item.identity.clone(),
                message: format!(
                    "revision {} is stale; repository is at {}",
                    item.revision, current.revision
                ),
            });
        }
        Ok(current)
    }

    fn require_owner(&self, item: &RepositoryItem) -> Result<(), RepositoryError> {
        match item.locked_by.as_deref() {
            Some(owner) if owner == self.user => Ok(()),
            Some(owner) => Err(RepositoryError::Conflict {
                identity: item.identity.clone(),
                message: format!("locked by {owner}"),
            }),
            None => Err(RepositoryError::Conflict {
                identity: item.identity.clone(),
                message: "item is not locked".into(),
            }),
        }
    }

    fn require_unlocked(&self, item: &RepositoryItem) -> Result<(), RepositoryError> {
        match item.locked_by.as_deref() {
            Some(owner) => Err(RepositoryError::Conflict {
                identity: item.identity.clone(),
                message: format!("locked by {owner}"),
            }),
            None => Ok(()),
        }
    }

    fn set_status(
        &self,
        item: &RepositoryItem,
        from: LibraryStatus,
        to: LibraryStatus,
    ) -> Result<RepositoryItem, RepositoryError> {
        let _guard = self.io_guard.lock();
        let mut current = self.current(item)?;
        self.ensure_writable(&current.identity.namespace)?;
        self.require_unlocked(&current)?;
        if current.status != from {
            return Err(RepositoryError::Conflict {
                identity: current.identity.clone(),
                message: format!("status is {}, expected {from}", current.status),
            });
        }
        current.status = to;
        current.revision += 1;
        self.write_item(&current)?;
        Ok(current)
    }
}

impl RepositoryClient for FileRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn item(&self, identity: &LibraryIdentity) -> Result<RepositoryItem, RepositoryError> {
        let _guard = self.io_guard.lock();
        self.read_item(identity)
    }

    fn download(&self, item: &RepositoryItem) -> Result<String, RepositoryError> {
        let _guard = self.io_guard.lock();
        let path = self.content_path(&item.identity);
        if !path.exists() {
            return Err(RepositoryError::NotFound {
                repository: self.id.clone(),
                identity: item.identity.clone(),
            });
        }
        Ok(fs::read_to_string(path)?)
    }

    fn can_write(&self, namespace: &str) -> Result<bool, RepositoryError> {
        let permissions = self.permissions()?;
        Ok(match permissions.namespaces.get(namespace) {
            Some(writers) => writers.iter().any(|writer| writer == &self.user),
            None => true,
        })
    }

    fn publish(
        &self,
        content: &Path,
        identity: &LibraryIdentity,
        status: LibraryStatus,
    ) -> Result<RepositoryItem, RepositoryError> {
        let _guard = self.io_guard.lock();
        self.ensure_writable(&identity.namespace)?;
        if self.item_dir(identity).join(METADATA_FILE).exists() {
            return Err(RepositoryError::Conflict {
                identity: identity.clone(),
                message: "already published".into(),
            });
        }
        let digest = self.store_content(identity, content)?;
        let item = RepositoryItem {
            repository: self.id.clone(),
            identity: identity.clone(),
            status,
            locked_by: None,
            digest,
            revision: 1,
        };
        self.write_item(&item)?;
        Ok(item)
    }

    fn lock(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        let _guard = self.io_guard.lock();
        let mut current = self.current(item)?;
        self.ensure_writable(&current.identity.namespace)?;
        self.require_unlocked(&current)?;
        current.locked_by = Some(self.user.clone());
        current.revision += 1;
        self.write_item(&current)?;
        Ok(current)
    }

    fn unlock(
        &self,
        item: &RepositoryItem,
        commit: Option<&Path>,
    ) -> Result<RepositoryItem, RepositoryError> {
        let _guard = self.io_guard.lock();
        let mut current = self.current(item)?;
        self.require_owner(&current)?;
        if let Some(content) = commit {
            current.digest = self.store_content(&current.identity, content)?;
        }
        current.locked_by = None;
        current.revision += 1;
        self.write_item(&current)?;
        Ok(current)
    }

    fn commit(
        &self,
        item: &RepositoryItem,
        content: &Path,
    ) -> Result<RepositoryItem, RepositoryError> {
        let _guard = self.io_guard.lock();
        let mut current = self.current(item)?;
        self.require_owner(&current)?;
        current.digest = self.store_content(&current.identity, content)?;
        current.revision += 1;
        self.write_item(&current)?;
        Ok(current)
    }

    fn revert(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        let _guard = self.io_guard.lock();
        let current = self.current(item)?;
        self.require_owner(&current)?;
        // Committed content is the only remote state; nothing else to discard.
        Ok(current)
    }

    fn promote(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.set_status(item, LibraryStatus::Draft, LibraryStatus::Final)
    }

    fn demote(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.set_status(item, LibraryStatus::Final, LibraryStatus::Draft)
    }

    fn delete(&self, item: &RepositoryItem) -> Result<(), RepositoryError> {
        let _guard = self.io_guard.lock();
        let current = self.read_item(&item.identity)?;
        self.ensure_writable(&current.identity.namespace)?;
        fs::remove_dir_all(self.item_dir(&item.identity))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn identity() -> LibraryIdentity {
        LibraryIdentity::new("urn:common", "common.yaml", "1.0.0")
    }

    fn published(temp: &Path, user: &str) -> (FileRepository, RepositoryItem) {
        let repo = FileRepository::open("local", temp.join("repo"), user).unwrap();
        let source = temp.join("source.yaml");
        fs::write(&source, "name: Common\n").unwrap();
        let item = repo
            .publish(&source, &identity(), LibraryStatus::Draft)
            .unwrap();
        (repo, item)
    }

    #[test]
    fn publish_stores_content_and_digest() {
        let temp = tempdir().unwrap();
        let (repo, item) = published(temp.path(), "ana");

        assert_eq!(item.revision, 1);
        assert_eq!(item.digest.len(), 64);
        assert_eq!(repo.download(&item).unwrap(), "name: Common\n");
        assert_eq!(repo.item(&identity()).unwrap(), item);

        let again = repo.publish(&temp.path().join("source.yaml"), &identity(), LibraryStatus::Draft);
        assert!(matches!(again, Err(RepositoryError::Conflict { .. })));
    }

    #[test]
    fn lock_is_exclusive_between_users() {
        let temp = tempdir().unwrap();
        let (repo, item) = published(temp.path(), "ana");
        let locked = repo.lock(&item).unwrap();
        assert_eq!(locked.locked_by.as_deref(), Some("ana"));

        let other = FileRepository::open("local", temp.path().join("repo"), "bo").unwrap();
        let current = other.item(&identity()).unwrap();
        assert!(matches!(
            other.lock(&current),
            Err(RepositoryError::Conflict { .. })
        ));
        assert!(matches!(
            other.unlock(&current, None),
            Err(RepositoryError::Conflict { .. })
        ));
    }

    #[test]
    fn stale_revision_is_rejected() {
        let temp = tempdir().unwrap();
        let (repo, item) = published(temp.path(), "ana");
        repo.promote(&item).unwrap();

        assert!(matches!(
            repo.lock(&item),
            Err(RepositoryError::Conflict { .. })
        ));
    }

    #[test]
    fn commit_under_lock_updates_content() {
        let temp = tempdir().unwrap();
        let (repo, item) = published(temp.path(), "ana");
        let locked = repo.lock(&item).unwrap();
        let wip = temp.path().join("wip.yaml");
        fs::write(&wip, "name: Common v2\n").unwrap();

        let committed = repo.commit(&locked, &wip).unwrap();
        assert_ne!(committed.digest, item.digest);
        assert!(committed.is_locked());
        assert_eq!(repo.download(&committed).unwrap(), "name: Common v2\n");

        let unlocked = repo.unlock(&committed, None).unwrap();
        assert!(!unlocked.is_locked());
    }

    #[test]
    fn download_never_sees_a_partial_commit() {
        let temp = tempdir().unwrap();
        let (repo, item) = published(temp.path(), "ana");
        let mut locked = repo.lock(&item).unwrap();
        let contents = ["a".repeat(256 * 1024), "b".repeat(256 * 1024)];
        let sources: Vec<PathBuf> = contents
            .iter()
            .enumerate()
            .map(|(index, content)| {
                let path = temp.path().join(format!("wip-{index}.yaml"));
                fs::write(&path, content).unwrap();
                path
            })
            .collect();
        locked = repo.commit(&locked, &sources[0]).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..40 {
                    locked = repo.commit(&locked, &sources[round % 2]).unwrap();
                }
            });
            for _ in 0..40 {
                let downloaded = repo.download(&item).unwrap();
                assert!(contents.contains(&downloaded));
            }
        });
    }

    #[test]
    fn permissions_restrict_writers_per_namespace() {
        let temp = tempdir().unwrap();
        let repo = FileRepository::open("local", temp.path().join("repo"), "ana").unwrap();
        let mut permissions = RepositoryPermissions::default();
        permissions
            .namespaces
            .insert("urn:restricted".into(), vec!["bo".into()]);
        repo.write_permissions(&permissions).unwrap();

        assert!(!repo.can_write("urn:restricted").unwrap());
        assert!(repo.can_write("urn:open").unwrap());
    }
}
