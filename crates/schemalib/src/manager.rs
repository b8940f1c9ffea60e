use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::closure::{self, ModelNavigator, ReferenceNavigator};
use crate::descriptor::{DescriptorItem, ProjectDescriptor};
use crate::error::{LifecycleError, SchemalibError};
use crate::integrity::{LocationRewriter, ReferenceIntegrity};
use crate::library::{
    Library, LibraryIdentity, LibraryKind, LibraryStatus, ReferenceKind, file_url,
};
use crate::model::{LibraryKey, LibraryModel};
use crate::project::{ManagerId, Project, ProjectHandle, ProjectId};
use crate::registry::{ItemRegistry, ItemState, ProjectItem};
use crate::repository::{RepositoryItem, RepositoryRegistry};

static NEXT_MANAGER: AtomicU64 = AtomicU64::new(1);

const BUILTIN_PROJECT: ProjectId = ProjectId(0);

/// Behavior switches for a manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerSettings {
    /// WIP files live at `{wip_folder}/{namespace folder}/{filename}`.
    pub wip_folder: PathBuf,
    /// Persist project descriptors after membership changes.
    pub auto_save: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Warning,
    Error,
}

/// Non-fatal problem noticed while loading.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Finding {
    pub severity: FindingSeverity,
    pub subject: String,
    pub message: String,
}

impl Finding {
    pub fn warning(subject: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self {
            severity: FindingSeverity::Warning,
            subject: subject.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result of [`ProjectManager::load_project`].
#[derive(Debug)]
pub struct ProjectLoad {
    pub project: ProjectHandle,
    pub findings: Vec<Finding>,
}

/// A repository item requested as a project member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedItemRef {
    pub repository: String,
    pub identity: LibraryIdentity,
}

impl ManagedItemRef {
    pub fn new(repository: impl Into<String>, identity: LibraryIdentity) -> Self {
        Self {
            repository: repository.into(),
            identity,
        }
    }
}

/// Flattened view of one project item.
#[derive(Clone, Debug, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ItemSummary {
    pub key: LibraryKey,
    pub name: String,
    pub identity: LibraryIdentity,
    pub state: ItemState,
    pub status: LibraryStatus,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    pub read_only: bool,
}

pub struct ProjectManager {
    pub(crate) id: ManagerId,
    pub(crate) settings: ManagerSettings,
    pub(crate) model: LibraryModel,
    pub(crate) registry: ItemRegistry,
    pub(crate) projects: BTreeMap<ProjectId, Project>,
    pub(crate) next_project: u64,
    pub(crate) repositories: RepositoryRegistry,
    pub(crate) navigator: Box<dyn ReferenceNavigator>,
    pub(crate) integrity: Box<dyn ReferenceIntegrity>,
}

impl ProjectManager {
    pub fn new(settings: ManagerSettings, repositories: RepositoryRegistry) -> Self {
        Self::with_collaborators(
            settings,
            repositories,
            Box::new(ModelNavigator),
            Box::new(LocationRewriter),
        )
    }

    pub fn with_collaborators(
        settings: ManagerSettings,
        repositories: RepositoryRegistry,
        navigator: Box<dyn ReferenceNavigator>,
        integrity: Box<dyn ReferenceIntegrity>,
    ) -> Self {
        let mut projects = BTreeMap::new();
        projects.insert(BUILTIN_PROJECT, Project::builtin(BUILTIN_PROJECT));
        Self {
            id: ManagerId(NEXT_MANAGER.fetch_add(1, Ordering::Relaxed)),
            settings,
            model: LibraryModel::new(),
            registry: ItemRegistry::new(),
            projects,
            next_project: 0,
            repositories,
            navigator,
            integrity,
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn model(&self) -> &LibraryModel {
        &self.model
    }

    pub fn registry(&self) -> &ItemRegistry {
        &self.registry
    }

    pub fn repositories(&self) -> &RepositoryRegistry {
        &self.repositories
    }

    pub fn repositories_mut(&mut self) -> &mut RepositoryRegistry {
        &mut self.repositories
    }

    pub fn builtin_project(&self) -> ProjectHandle {
        self.handle(BUILTIN_PROJECT)
    }

    /// Open user projects in creation order.
    pub fn projects(&self) -> Vec<ProjectHandle> {
        self.projects
            .values()
            .filter(|project| !project.is_builtin())
            .map(|project| self.handle(project.id()))
            .collect()
    }

    pub fn project(&self, handle: ProjectHandle) -> Result<&Project, SchemalibError> {
        let id = self.resolve_handle(handle)?;
        self.project_by_id(id)
    }

    pub fn item(&self, key: LibraryKey) -> Result<&ProjectItem, SchemalibError> {
        self.registry
            .get(key)
            .ok_or(SchemalibError::UnknownLibrary(key))
    }

    pub fn find_item(&self, identity: &LibraryIdentity) -> Option<LibraryKey> {
        self.model
            .find_by_identity(identity)
            .filter(|key| self.registry.contains(*key))
    }

    pub fn summary(&self, key: LibraryKey) -> Result<ItemSummary, SchemalibError> {
        let library = self.model.library(key)?;
        let item = self.item(key)?;
        Ok(ItemSummary {
            key,
            name: library.name.clone(),
            identity: library.identity(),
            state: item.state(),
            status: library.status,
            location: library.location.to_string(),
            repository: item.repository().map(|remote| remote.repository.clone()),
            locked_by: item
                .repository()
                .and_then(|remote| remote.locked_by.clone()),
            read_only: library.read_only,
        })
    }

    pub fn project_items(&self, handle: ProjectHandle) -> Result<Vec<ItemSummary>, SchemalibError> {
        self.project(handle)?
            .members()
            .iter()
            .map(|key| self.summary(*key))
            .collect()
    }

    /// Creates an empty project and writes its descriptor immediately.
    pub fn new_project(
        &mut self,
        path: impl AsRef<Path>,
        project_id: &str,
        name: &str,
        description: &str,
    ) -> Result<ProjectHandle, SchemalibError> {
        if project_id.trim().is_empty() {
            return Err(SchemalibError::Project("project id must not be empty".into()));
        }
        let file = normalize_project_path(path.as_ref())?;
        self.ensure_unique(project_id, &file)?;

        let id = self.allocate_project_id();
        self.projects.insert(
            id,
            Project::new(id, project_id, file.clone(), name, description),
        );
        if let Err(err) = self.write_descriptor(id) {
            self.projects.remove(&id);
            return Err(err);
        }

        tracing::info!(project = project_id, file = %file.display(), "created project");
        Ok(self.handle(id))
    }

    /// Opens a project descriptor and loads every declared member plus its closure.
    /// On a fatal error the project is discarded and items it loaded are purged.
    pub fn load_project(&mut self, path: impl AsRef<Path>) -> Result<ProjectLoad, SchemalibError> {
        let file = normalize_project_path(path.as_ref())?;
        if self.projects.values().any(|project| project.file() == Some(file.as_path())) {
            return Err(SchemalibError::DuplicateProjectFile(file));
        }
        let descriptor = ProjectDescriptor::read(&file)?;
        self.ensure_unique(&descriptor.project_id, &file)?;

        let id = self.allocate_project_id();
        self.projects.insert(
            id,
            Project::new(
                id,
                &descriptor.project_id,
                file.clone(),
                &descriptor.name,
                &descriptor.description,
            ),
        );

        let mut findings = Vec::new();
        if let Err(err) = self.populate(id, &descriptor, &file, &mut findings) {
            self.discard_project(id);
            return Err(err.context(format!("loading project {}", file.display())));
        }

        tracing::info!(
            project = %descriptor.project_id,
            members = self.project_by_id(id)?.members().len(),
            findings = findings.len(),
            "loaded project"
        );
        Ok(ProjectLoad {
            project: self.handle(id),
            findings,
        })
    }

    /// Writes the descriptor and, when asked, every editable unmanaged or WIP member.
    pub fn save_project(
        &self,
        handle: ProjectHandle,
        save_unmanaged: bool,
    ) -> Result<(), SchemalibError> {
        let id = self.resolve_handle(handle)?;
        self.write_descriptor(id)?;
        if save_unmanaged {
            for key in self.project_by_id(id)?.members() {
                self.persist_library(*key)?;
            }
        }
        Ok(())
    }

    pub fn close_project(&mut self, handle: ProjectHandle) -> Result<(), SchemalibError> {
        let id = self.resolve_handle(handle)?;
        if id == BUILTIN_PROJECT {
            return Err(SchemalibError::Project(
                "the built-in project cannot be closed".into(),
            ));
        }
        let name = self.project_by_id(id)?.name().to_string();
        self.discard_project(id);
        tracing::info!(project = %name, "closed project");
        Ok(())
    }

    /// Closes every user project. Only built-in libraries remain resident afterwards.
    pub fn close_all(&mut self) {
        let ids: Vec<ProjectId> = self
            .projects
            .keys()
            .copied()
            .filter(|id| *id != BUILTIN_PROJECT)
            .collect();
        for id in ids {
            self.detach_project(id);
        }
        self.purge_orphans();
        if self.registry.is_empty() {
            self.model.clear();
        }
    }

    /// Adds repository items, skipping ones already resident, then reconciles the closure.
    pub fn add_managed_project_items(
        &mut self,
        items: &[ManagedItemRef],
        handle: ProjectHandle,
    ) -> Result<Vec<LibraryKey>, SchemalibError> {
        self.add_items(handle, items, |manager, request, findings| {
            manager.load_managed(&request.repository, &request.identity, findings)
        })
    }

    /// Adds local library files, skipping ones already resident, then reconciles the closure.
    pub fn add_unmanaged_project_items<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        handle: ProjectHandle,
    ) -> Result<Vec<LibraryKey>, SchemalibError> {
        self.add_items(handle, files, |manager, file, _| {
            manager.load_unmanaged(file.as_ref())
        })
    }

    /// Detaches members. Items still required by the project's closure are re-attached.
    pub fn remove_project_items(
        &mut self,
        items: &[LibraryKey],
        handle: ProjectHandle,
    ) -> Result<(), SchemalibError> {
        let id = self.resolve_handle(handle)?;
        let project = self.project_by_id(id)?;
        if let Some(missing) = items.iter().find(|key| !project.contains(**key)) {
            return Err(SchemalibError::Project(format!(
                "{missing} is not a member of {}",
                project.name()
            )));
        }
        for key in items {
            self.detach(*key, id);
        }
        self.reconcile(id);
        self.purge_orphans();
        self.auto_save(id)
    }

    /// Records a structural reference and reconciles every project's closure.
    pub fn add_reference(
        &mut self,
        from: LibraryKey,
        kind: ReferenceKind,
        target: Url,
    ) -> Result<Vec<Finding>, SchemalibError> {
        let state = self.item(from)?.state();
        let library = self.model.library(from)?;
        if library.read_only {
            return Err(LifecycleError::IllegalState {
                library: library.identity(),
                operation: "modify",
                state,
            }
            .into());
        }
        self.model.add_reference(from, kind, target)?;
        let mut findings = Vec::new();
        self.sync_closure(&mut findings);
        Ok(findings)
    }

    /// Applies `edit` to an editable (unmanaged or WIP) library, then reconciles closures.
    pub fn edit_library(
        &mut self,
        key: LibraryKey,
        edit: impl FnOnce(&mut Library),
    ) -> Result<Vec<Finding>, SchemalibError> {
        let state = self.item(key)?.state();
        let library = self.model.library_mut(key)?;
        if library.read_only {
            return Err(LifecycleError::IllegalState {
                library: library.identity(),
                operation: "modify",
                state,
            }
            .into());
        }
        let location = library.location.clone();
        let repository_uri = library.repository_uri.clone();
        edit(library);
        library.location = location;
        library.repository_uri = repository_uri;
        self.model.mark_changed(key);

        let mut findings = Vec::new();
        self.sync_closure(&mut findings);
        Ok(findings)
    }

    pub fn set_default_item(
        &mut self,
        handle: ProjectHandle,
        item: Option<LibraryKey>,
    ) -> Result<(), SchemalibError> {
        let id = self.resolve_handle(handle)?;
        let project = self.project_mut(id)?;
        if let Some(key) = item {
            if !project.contains(key) {
                return Err(SchemalibError::Project(format!(
                    "{key} is not a member of {}",
                    project.name()
                )));
            }
        }
        project.set_default_item(item);
        self.auto_save(id)
    }

    /// Registers a read-only library as a member of the built-in project.
    pub fn add_builtin_library(&mut self, mut library: Library) -> Result<LibraryKey, SchemalibError> {
        if let Some(key) = self.model.resolve(&library.location) {
            return Ok(key);
        }
        library.read_only = true;
        let key = self.model.insert(library);
        self.attach(key, BUILTIN_PROJECT);
        let mut findings = Vec::new();
        self.sync_closure(&mut findings);
        Ok(key)
    }

    /// Removes items that belong to no project, their libraries, and any resident library
    /// no remaining item reaches. Returns the number of libraries removed.
    pub fn purge_orphans(&mut self) -> usize {
        let orphans = self.registry.orphans();
        for key in &orphans {
            self.registry.remove(*key);
            self.model.remove(*key);
        }

        let roots: Vec<LibraryKey> = self.registry.keys().collect();
        let keep = closure::reachable(&self.model, self.navigator.as_ref(), roots);
        let stale: Vec<LibraryKey> = self.model.keys().filter(|key| !keep.contains(key)).collect();
        for key in &stale {
            self.model.remove(*key);
        }

        let removed = orphans.len() + stale.len();
        if removed > 0 {
            tracing::debug!(
                orphans = orphans.len(),
                unreachable = stale.len(),
                "purged orphaned libraries"
            );
        }
        removed
    }

    pub(crate) fn handle(&self, project: ProjectId) -> ProjectHandle {
        ProjectHandle {
            manager: self.id,
            project,
        }
    }

    pub(crate) fn resolve_handle(&self, handle: ProjectHandle) -> Result<ProjectId, SchemalibError> {
        if handle.manager != self.id {
            return Err(SchemalibError::WrongManager);
        }
        if !self.projects.contains_key(&handle.project) {
            return Err(SchemalibError::Project(format!(
                "{} is not open",
                handle.project
            )));
        }
        Ok(handle.project)
    }

    fn project_by_id(&self, id: ProjectId) -> Result<&Project, SchemalibError> {
        self.projects
            .get(&id)
            .ok_or_else(|| SchemalibError::Project(format!("{id} is not open")))
    }

    fn project_mut(&mut self, id: ProjectId) -> Result<&mut Project, SchemalibError> {
        self.projects
            .get_mut(&id)
            .ok_or_else(|| SchemalibError::Project(format!("{id} is not open")))
    }

    fn allocate_project_id(&mut self) -> ProjectId {
        self.next_project += 1;
        ProjectId(self.next_project)
    }

    fn ensure_unique(&self, project_id: &str, file: &Path) -> Result<(), SchemalibError> {
        for project in self.projects.values() {
            if project.project_id() == Some(project_id) {
                return Err(SchemalibError::DuplicateProjectId(project_id.to_string()));
            }
            if project.file() == Some(file) {
                return Err(SchemalibError::DuplicateProjectFile(file.to_path_buf()));
            }
        }
        Ok(())
    }

    pub(crate) fn attach(&mut self, key: LibraryKey, project: ProjectId) {
        if let Some(target) = self.projects.get_mut(&project) {
            target.add_member(key);
            self.registry.attach(key, project);
        }
    }

    fn detach(&mut self, key: LibraryKey, project: ProjectId) {
        if let Some(target) = self.projects.get_mut(&project) {
            target.remove_member(key);
        }
        self.registry.detach(key, project);
    }

    fn detach_project(&mut self, id: ProjectId) {
        if let Some(project) = self.projects.remove(&id) {
            for key in project.members() {
                self.registry.detach(*key, id);
            }
        }
    }

    fn discard_project(&mut self, id: ProjectId) {
        self.detach_project(id);
        self.purge_orphans();
    }

    fn populate(
        &mut self,
        id: ProjectId,
        descriptor: &ProjectDescriptor,
        file: &Path,
        findings: &mut Vec<Finding>,
    ) -> Result<(), SchemalibError> {
        let base_dir = file.parent().map(Path::to_path_buf).unwrap_or_default();

        for (repository, location) in &descriptor.repositories {
            if self.repositories.contains(repository) {
                continue;
            }
            match self
                .repositories
                .register_location(repository, location, Some(&base_dir))
            {
                Ok(_) => {
                    tracing::info!(repository = %repository, location = %location, "registered repository from project")
                }
                Err(err) => {
                    tracing::warn!(repository = %repository, error = %err, "could not register repository");
                    findings.push(Finding::warning(format!("repository {repository}"), err));
                }
            }
        }

        for entry in &descriptor.items {
            let key = match entry {
                DescriptorItem::Unmanaged { path, .. } => self.load_unmanaged(&base_dir.join(path))?,
                DescriptorItem::Managed {
                    repository,
                    namespace,
                    filename,
                    version,
                    ..
                } => {
                    let identity = LibraryIdentity::new(namespace, filename, version);
                    if !self.repositories.contains(repository) {
                        tracing::warn!(library = %identity, repository = %repository, "skipping item from unavailable repository");
                        findings.push(Finding::warning(
                            &identity,
                            format!("repository {repository} is not available; item skipped"),
                        ));
                        continue;
                    }
                    self.load_managed(repository, &identity, findings)?
                }
            };
            self.attach(key, id);
            if entry.is_default() {
                self.project_mut(id)?.set_default_item(Some(key));
            }
        }

        self.sync_closure(findings);
        self.reconcile(id);
        Ok(())
    }

    fn add_items<T>(
        &mut self,
        handle: ProjectHandle,
        requests: &[T],
        mut load: impl FnMut(&mut Self, &T, &mut Vec<Finding>) -> Result<LibraryKey, SchemalibError>,
    ) -> Result<Vec<LibraryKey>, SchemalibError> {
        let id = self.resolve_handle(handle)?;
        let mut findings = Vec::new();
        let mut added = Vec::new();
        let mut failure = None;
        for request in requests {
            match load(self, request, &mut findings) {
                Ok(key) => {
                    self.attach(key, id);
                    added.push(key);
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        self.sync_closure(&mut findings);
        self.reconcile(id);
        self.purge_orphans();
        if let Some(err) = failure {
            return Err(err);
        }
        self.auto_save(id)?;
        Ok(added)
    }

    /// Loads a library file as a project item candidate.
    pub(crate) fn load_unmanaged(&mut self, path: &Path) -> Result<LibraryKey, SchemalibError> {
        let key = self.load_library_file(path)?;
        let library = self.model.library(key)?;
        if library.kind != LibraryKind::Library {
            return Err(SchemalibError::load(
                &library.location,
                "legacy schemas cannot be project members",
            ));
        }
        self.registry.ensure(key);
        Ok(key)
    }

    /// Loads a file into the model, returning the existing key when it is already resident.
    fn load_library_file(&mut self, path: &Path) -> Result<LibraryKey, SchemalibError> {
        let canonical =
            fs::canonicalize(path).map_err(|err| SchemalibError::load(path.display(), err))?;
        let location = file_url(&canonical)?;
        if let Some(key) = self.model.resolve(&location) {
            return Ok(key);
        }

        let library = Library::load_file(&canonical)?;
        let key = self.model.insert(library);
        tracing::debug!(library = %key, path = %canonical.display(), "loaded library file");
        Ok(key)
    }

    /// Loads repository content, returning the existing key when it is already resident.
    pub(crate) fn load_managed(
        &mut self,
        repository: &str,
        identity: &LibraryIdentity,
        findings: &mut Vec<Finding>,
    ) -> Result<LibraryKey, SchemalibError> {
        identity.validate()?;
        let uri = identity.repository_uri(repository)?;
        if let Some(key) = self.model.resolve(&uri) {
            return Ok(key);
        }

        let client = self.repositories.get(repository)?;
        let remote = client.item(identity)?;
        let state = ItemState::from_lock(remote.locked_by.as_deref(), client.user());

        let (content, location) = if state == ItemState::ManagedWip {
            let wip_path = self.wip_path(identity);
            let content = if wip_path.exists() {
                fs::read_to_string(&wip_path)?
            } else {
                let content = client.download(&remote)?;
                write_file(&wip_path, &content)?;
                content
            };
            (content, file_url(&wip_path)?)
        } else {
            (client.download(&remote)?, uri)
        };

        let (mut library, corrections) = managed_library(&content, location, &remote)?;
        library.read_only = state != ItemState::ManagedWip;
        for correction in corrections {
            tracing::warn!(library = %identity, "{correction}");
            findings.push(Finding::warning(identity, correction));
        }
        let key = self.model.insert(library);
        self.registry.ensure(key).set_managed(state, remote);
        tracing::debug!(library = %key, identity = %identity, state = %state, "loaded managed library");
        Ok(key)
    }

    fn load_location(
        &mut self,
        url: &Url,
        findings: &mut Vec<Finding>,
    ) -> Result<LibraryKey, SchemalibError> {
        if let Some((repository, identity)) = LibraryIdentity::from_repository_uri(url) {
            return self.load_managed(&repository, &identity, findings);
        }
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| SchemalibError::Location(format!("invalid file url {url}")))?;
            return self.load_library_file(&path);
        }
        Err(SchemalibError::Location(format!(
            "no loader for reference {url}"
        )))
    }

    /// Loads every referenced library that is not resident yet. Failures become findings.
    fn load_dependencies(&mut self, findings: &mut Vec<Finding>) {
        let mut attempted: BTreeSet<String> = BTreeSet::new();
        loop {
            let pending: Vec<(LibraryKey, Url)> = closure::unresolved_references(&self.model)
                .into_iter()
                .filter(|(_, url)| attempted.insert(url.to_string()))
                .collect();
            if pending.is_empty() {
                break;
            }
            for (source, url) in pending {
                if let Err(err) = self.load_location(&url, findings) {
                    let subject = self
                        .model
                        .get(source)
                        .map(|library| library.identity().to_string())
                        .unwrap_or_else(|| source.to_string());
                    tracing::warn!(library = %subject, reference = %url, error = %err, "unresolved reference");
                    findings.push(Finding::warning(
                        subject,
                        format!("unresolved reference {url}: {err}"),
                    ));
                }
            }
        }
    }

    /// Pulls in missing dependencies, then drains the model's events and reconciles only the
    /// projects whose members depend on a library that was added or changed.
    pub(crate) fn sync_closure(&mut self, findings: &mut Vec<Finding>) {
        self.load_dependencies(findings);
        let changed: BTreeSet<LibraryKey> = self
            .model
            .drain_events()
            .iter()
            .filter(|event| event.is_structural())
            .map(|event| event.subject())
            .collect();
        if changed.is_empty() {
            return;
        }

        let affected = closure::dependents(&self.model, self.navigator.as_ref(), changed);
        let ids: Vec<ProjectId> = self
            .projects
            .iter()
            .filter(|(_, project)| project.members().iter().any(|key| affected.contains(key)))
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.reconcile(id);
        }
    }

    fn reconcile(&mut self, id: ProjectId) {
        let Some(project) = self.projects.get(&id) else {
            return;
        };
        let report = closure::analyze(&self.model, self.navigator.as_ref(), project.members());
        if report.is_complete() {
            return;
        }
        tracing::debug!(project = %id, added = report.missing.len(), "closure reconciliation added members");
        for key in report.missing {
            self.attach(key, id);
        }
    }

    pub(crate) fn auto_save(&self, id: ProjectId) -> Result<(), SchemalibError> {
        if self.settings.auto_save && id != BUILTIN_PROJECT {
            self.write_descriptor(id)?;
        }
        Ok(())
    }

    fn write_descriptor(&self, id: ProjectId) -> Result<(), SchemalibError> {
        let project = self.project_by_id(id)?;
        let (Some(project_id), Some(file)) = (project.project_id(), project.file()) else {
            return Err(SchemalibError::Project(
                "the built-in project is not persisted".into(),
            ));
        };
        let base_dir = file.parent();

        let mut descriptor = ProjectDescriptor::new(project_id, project.name());
        descriptor.description = project.description().to_string();
        for key in project.members() {
            let library = self.model.library(*key)?;
            let default = project.default_item() == Some(*key);
            let remote = self
                .registry
                .get(*key)
                .filter(|item| item.state().is_managed())
                .and_then(ProjectItem::repository);
            let entry = match remote {
                Some(remote) => {
                    if let Ok(client) = self.repositories.get(&remote.repository) {
                        descriptor
                            .repositories
                            .insert(remote.repository.clone(), client.location());
                    }
                    DescriptorItem::managed(&remote.repository, remote.identity.clone(), default)
                }
                None => {
                    let path = library.file_path().ok_or_else(|| {
                        SchemalibError::Project(format!(
                            "unmanaged library {} has no file location",
                            library.identity()
                        ))
                    })?;
                    DescriptorItem::Unmanaged {
                        path: relative_path(base_dir, &path),
                        default,
                    }
                }
            };
            descriptor.items.push(entry);
        }
        descriptor.write(file)
    }

    /// Writes an editable library back to its file. Returns the path written.
    pub(crate) fn persist_library(&self, key: LibraryKey) -> Result<Option<PathBuf>, SchemalibError> {
        let library = self.model.library(key)?;
        let state = self.registry.state(key).unwrap_or_default();
        if library.read_only || !matches!(state, ItemState::Unmanaged | ItemState::ManagedWip) {
            return Ok(None);
        }
        let Some(path) = library.file_path() else {
            return Ok(None);
        };
        if state == ItemState::ManagedWip {
            // Repository content carries absolute references only.
            write_file(&path, &library.to_document_string(None)?)?;
        } else {
            library.save_file(&path)?;
        }
        Ok(Some(path))
    }

    pub(crate) fn wip_path(&self, identity: &LibraryIdentity) -> PathBuf {
        self.settings
            .wip_folder
            .join(namespace_folder(&identity.namespace))
            .join(&identity.filename)
    }
}

/// Parses repository content and aligns it with the repository's identity and status.
/// Returns the library and a description of every field that had to be corrected.
pub(crate) fn managed_library(
    content: &str,
    location: Url,
    remote: &RepositoryItem,
) -> Result<(Library, Vec<String>), SchemalibError> {
    let identity = &remote.identity;
    let mut library = Library::parse(content, location, identity.filename.clone(), None)?;
    let mut corrections = Vec::new();
    if library.namespace != identity.namespace {
        corrections.push(format!(
            "namespace {} does not match repository namespace {}; using the repository value",
            library.namespace, identity.namespace
        ));
        library.namespace = identity.namespace.clone();
    }
    if library.version != identity.version {
        corrections.push(format!(
            "version {} does not match repository version {}; using the repository value",
            library.version, identity.version
        ));
        library.version = identity.version.clone();
    }
    library.status = remote.status;
    library.repository_uri = Some(remote.uri()?);
    library.read_only = true;
    Ok((library, corrections))
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<(), SchemalibError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn namespace_folder(namespace: &str) -> String {
    let folder: String = namespace
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    let folder = folder.trim_matches('_');
    if folder.is_empty() {
        "default".to_string()
    } else {
        folder.to_string()
    }
}

/// Absolute project path with a canonical parent so load and create agree.
fn normalize_project_path(path: &Path) -> Result<PathBuf, SchemalibError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };
    let file_name = absolute.file_name().ok_or_else(|| {
        SchemalibError::Project(format!("{} is not a file path", path.display()))
    })?;
    match absolute.parent() {
        Some(parent) if parent.is_dir() => Ok(fs::canonicalize(parent)?.join(file_name)),
        _ => {
            let mut normalized = PathBuf::new();
            for component in absolute.components() {
                match component {
                    Component::CurDir => {}
                    Component::ParentDir => {
                        normalized.pop();
                    }
                    other => normalized.push(other.as_os_str()),
                }
            }
            Ok(normalized)
        }
    }
}

fn relative_path(base: Option<&Path>, path: &Path) -> String {
    base.and_then(|base| path.strip_prefix(base).ok())
        .map(|relative| relative.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|| path.display().to_string())
}
