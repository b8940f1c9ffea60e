#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use schemalib::repository::filesystem::RepositoryPermissions;
use schemalib::{
    FileRepository, LibraryIdentity, LibraryStatus, ManagerSettings, ProjectManager,
    RepositoryClient, RepositoryError, RepositoryItem, RepositoryRegistry,
};
use tempfile::TempDir;

pub const USER: &str = "ana";
pub const REPO: &str = "local";
pub const NAMESPACE: &str = "urn:orders";

pub struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    pub repo: Arc<FileRepository>,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().canonicalize().expect("canonical tempdir");
        fs::create_dir_all(root.join("libs")).expect("libs dir");
        let repo = Arc::new(FileRepository::open(REPO, root.join("repo"), USER).expect("repo"));
        Self {
            _temp: temp,
            root,
            repo,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn libs(&self) -> PathBuf {
        self.root.join("libs")
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.root.join("repo")
    }

    pub fn wip_dir(&self) -> PathBuf {
        self.root.join("wip")
    }

    pub fn settings(&self) -> ManagerSettings {
        ManagerSettings {
            wip_folder: self.wip_dir(),
            auto_save: true,
        }
    }

    pub fn registry(&self) -> RepositoryRegistry {
        let mut registry = RepositoryRegistry::new(USER);
        registry.register(self.repo.clone());
        registry
    }

    pub fn manager(&self) -> ProjectManager {
        ProjectManager::new(self.settings(), self.registry())
    }

    /// Repository view for a second user sharing the same storage.
    pub fn repo_as(&self, user: &str) -> FileRepository {
        FileRepository::open(REPO, self.repo_dir(), user).expect("repo for user")
    }

    /// Writes `libs/{file}` and returns its path.
    pub fn write_library(&self, file: &str, imports: &[String]) -> PathBuf {
        let path = self.libs().join(file);
        fs::write(&path, document(file, NAMESPACE, "1.0.0", imports)).expect("write library");
        path
    }

    /// Publishes a DRAFT library straight into the repository.
    pub fn seed(&self, file: &str, imports: &[String]) -> RepositoryItem {
        self.seed_version(file, "1.0.0", imports)
    }

    pub fn seed_version(&self, file: &str, version: &str, imports: &[String]) -> RepositoryItem {
        let identity = LibraryIdentity::new(NAMESPACE, file, version);
        let staged = self.root.join(format!("seed-{version}-{file}"));
        fs::write(&staged, document(file, NAMESPACE, version, imports)).expect("stage seed");
        let item = self
            .repo
            .publish(&staged, &identity, LibraryStatus::Draft)
            .expect("seed publish");
        fs::remove_file(staged).expect("remove staged seed");
        item
    }

    pub fn restrict_namespace(&self, writers: &[&str]) {
        let mut permissions = RepositoryPermissions::default();
        permissions.namespaces.insert(
            NAMESPACE.to_string(),
            writers.iter().map(|writer| writer.to_string()).collect(),
        );
        self.repo.write_permissions(&permissions).expect("permissions");
    }
}

pub fn identity(file: &str) -> LibraryIdentity {
    LibraryIdentity::new(NAMESPACE, file, "1.0.0")
}

pub fn repository_uri(file: &str) -> String {
    identity(file)
        .repository_uri(REPO)
        .expect("repository uri")
        .to_string()
}

pub fn document(file: &str, namespace: &str, version: &str, imports: &[String]) -> String {
    let name = file.trim_end_matches(".yaml");
    let mut text = format!(
        "name: {name}\nnamespace: \"{namespace}\"\nversion: \"{version}\"\nstatus: DRAFT\n"
    );
    if !imports.is_empty() {
        text.push_str("imports:\n");
        for import in imports {
            text.push_str(&format!("  - \"{import}\"\n"));
        }
    }
    text.push_str(&format!("content: \"types for {name}\"\n"));
    text
}

/// Delegating client that fails the n-th publish and records deletions.
pub struct FlakyRepository {
    inner: Arc<FileRepository>,
    fail_on: usize,
    publishes: Mutex<usize>,
    deleted: Mutex<Vec<LibraryIdentity>>,
}

impl FlakyRepository {
    pub fn new(inner: Arc<FileRepository>, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            publishes: Mutex::new(0),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn publish_attempts(&self) -> usize {
        *self.publishes.lock()
    }

    pub fn deleted(&self) -> Vec<LibraryIdentity> {
        self.deleted.lock().clone()
    }
}

impl RepositoryClient for FlakyRepository {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn location(&self) -> String {
        self.inner.location()
    }

    fn user(&self) -> &str {
        self.inner.user()
    }

    fn item(&self, identity: &LibraryIdentity) -> Result<RepositoryItem, RepositoryError> {
        self.inner.item(identity)
    }

    fn download(&self, item: &RepositoryItem) -> Result<String, RepositoryError> {
        self.inner.download(item)
    }

    fn can_write(&self, namespace: &str) -> Result<bool, RepositoryError> {
        self.inner.can_write(namespace)
    }

    fn publish(
        &self,
        content: &Path,
        identity: &LibraryIdentity,
        status: LibraryStatus,
    ) -> Result<RepositoryItem, RepositoryError> {
        let attempt = {
            let mut publishes = self.publishes.lock();
            *publishes += 1;
            *publishes
        };
        if attempt == self.fail_on {
            return Err(RepositoryError::Unreachable {
                repository: REPO.to_string(),
                message: "connection reset".into(),
            });
        }
        self.inner.publish(content, identity, status)
    }

    fn lock(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.inner.lock(item)
    }

    fn unlock(
        &self,
        item: &RepositoryItem,
        commit: Option<&Path>,
    ) -> Result<RepositoryItem, RepositoryError> {
        self.inner.unlock(item, commit)
    }

    fn commit(&self, item: &RepositoryItem, content: &Path) -> Result<RepositoryItem, RepositoryError> {
        self.inner.commit(item, content)
    }

    fn revert(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.inner.revert(item)
    }

    fn promote(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.inner.promote(item)
    }

    fn demote(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.inner.demote(item)
    }

    fn delete(&self, item: &RepositoryItem) -> Result<(), RepositoryError> {
        self.deleted.lock().push(item.identity.clone());
        self.inner.delete(item)
    }
}
