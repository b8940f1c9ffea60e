use std::collections::BTreeSet;

use url::Url;

use crate::backup::{BackupFile, StagingArea};
use crate::closure;
use crate::error::{LifecycleError, PublishError, SchemalibError};
use crate::integrity::ReferenceSnapshot;
use crate::library::{LibraryIdentity, LibraryKind};
use crate::manager::ProjectManager;
use crate::model::LibraryKey;
use crate::registry::ItemState;
use crate::repository::{RepositoryClient, RepositoryItem};

const STAGING_DIR: &str = ".staging";

struct PublishTarget {
    key: LibraryKey,
    identity: LibraryIdentity,
    original_location: Url,
    original_read_only: bool,
    uri: Url,
}

struct Transferred {
    remote: RepositoryItem,
    backup: Option<BackupFile>,
}

impl ProjectManager {
    /// Publishes unmanaged items to `repository`. On success every item is
    /// `MANAGED_UNLOCKED` and the original files remain as `.bak` recovery copies.
    pub fn publish(
        &mut self,
        items: &[LibraryKey],
        repository: &str,
    ) -> Result<Vec<RepositoryItem>, SchemalibError> {
        let batch = self.publish_batch(items)?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.repositories.get(repository)?;

        self.authorize_publish(client.as_ref(), &batch)?;
        self.check_publish_closure(&batch)?;

        let snapshot = ReferenceSnapshot::capture(&self.model);
        let targets = match self.prepare_publish(&batch, repository) {
            Ok(targets) => targets,
            Err(err) => {
                self.clear_publish_marks(&batch);
                snapshot.restore(&mut self.model);
                tracing::warn!(error = %err, "publish preparation failed; references restored");
                return Err(err);
            }
        };

        let mut staging = StagingArea::new(self.settings.wip_folder.join(STAGING_DIR));
        let mut transferred = Vec::with_capacity(targets.len());
        let mut failure = None;
        for target in &targets {
            match self.transfer(client.as_ref(), target, &mut staging) {
                Ok(done) => transferred.push(done),
                Err(err) => {
                    self.restore_target(target);
                    failure = Some((target.identity.clone(), err));
                    break;
                }
            }
        }

        let Some((library, err)) = failure else {
            self.finish_publish(&targets);
            tracing::info!(repository, items = targets.len(), "published libraries");
            return Ok(transferred
                .into_iter()
                .map(|done| {
                    if let Some(backup) = done.backup {
                        let _ = backup.keep();
                    }
                    done.remote
                })
                .collect());
        };

        self.rollback_publish(client.as_ref(), &targets, transferred);
        self.clear_publish_marks(&batch);
        snapshot.restore(&mut self.model);
        tracing::warn!(library = %library, error = %err, "publish failed; batch rolled back");
        Err(PublishError::Transfer {
            library,
            source: Box::new(err),
        }
        .into())
    }

    /// Deduplicates the request and checks that every entry is an unmanaged item.
    fn publish_batch(&self, items: &[LibraryKey]) -> Result<Vec<LibraryKey>, SchemalibError> {
        let mut seen = BTreeSet::new();
        let mut batch = Vec::new();
        for key in items {
            if !seen.insert(*key) {
                continue;
            }
            let state = self.item(*key)?.state();
            let library = self.model.library(*key)?;
            if state != ItemState::Unmanaged || library.kind != LibraryKind::Library {
                return Err(LifecycleError::IllegalState {
                    library: library.identity(),
                    operation: "publish",
                    state,
                }
                .into());
            }
            batch.push(*key);
        }
        Ok(batch)
    }

    fn authorize_publish(
        &self,
        client: &dyn RepositoryClient,
        batch: &[LibraryKey],
    ) -> Result<(), SchemalibError> {
        let mut namespaces = BTreeSet::new();
        for key in batch {
            namespaces.insert(self.model.library(*key)?.namespace.clone());
        }
        for namespace in namespaces {
            if !client.can_write(&namespace)? {
                return Err(PublishError::PermissionDenied {
                    repository: client.id().to_string(),
                    namespace,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Every library a batch item depends on must be managed or part of the batch.
    fn check_publish_closure(&self, batch: &[LibraryKey]) -> Result<(), SchemalibError> {
        let members: BTreeSet<LibraryKey> = batch.iter().copied().collect();
        let mut pending = Vec::new();
        let mut blocking = BTreeSet::new();

        for key in batch {
            let mut blocked = false;
            for dependency in closure::reachable(&self.model, self.navigator.as_ref(), [*key]) {
                if members.contains(&dependency) {
                    continue;
                }
                let library = self.model.library(dependency)?;
                if library.kind != LibraryKind::Library {
                    continue;
                }
                let managed = self
                    .registry
                    .state(dependency)
                    .map(ItemState::is_managed)
                    .unwrap_or(library.repository_uri.is_some());
                if !managed {
                    blocking.insert(dependency);
                    blocked = true;
                }
            }
            if blocked {
                pending.push(*key);
            }
        }

        if blocking.is_empty() {
            return Ok(());
        }
        Err(PublishError::UnmanagedDependencies {
            pending,
            blocking: blocking.into_iter().collect(),
        }
        .into())
    }

    /// Assigns each item its repository URI and repoints peer references at it.
    fn prepare_publish(
        &mut self,
        batch: &[LibraryKey],
        repository: &str,
    ) -> Result<Vec<PublishTarget>, SchemalibError> {
        let mut targets = Vec::with_capacity(batch.len());
        for key in batch {
            let library = self.model.library(*key)?;
            let identity = library.identity();
            identity.validate()?;
            let uri = identity.repository_uri(repository)?;
            targets.push(PublishTarget {
                key: *key,
                identity,
                original_location: library.location.clone(),
                original_read_only: library.read_only,
                uri,
            });
        }

        for target in &targets {
            self.model.library_mut(target.key)?.repository_uri = Some(target.uri.clone());
            self.integrity.relocate(
                &mut self.model,
                target.key,
                &target.original_location,
                &target.uri,
            )?;
        }
        Ok(targets)
    }

    fn transfer(
        &mut self,
        client: &dyn RepositoryClient,
        target: &PublishTarget,
        staging: &mut StagingArea,
    ) -> Result<Transferred, SchemalibError> {
        let library = self.model.library(target.key)?;
        let status = library.status;
        let staged = staging.stage(&library.to_document_string(None)?)?;
        let remote = client.publish(&staged, &target.identity, status)?;

        let backup = match target.original_location.to_file_path() {
            Ok(path) if path.exists() => match BackupFile::create(&path) {
                Ok(backup) => Some(backup),
                Err(err) => {
                    if let Err(delete) = client.delete(&remote) {
                        tracing::warn!(library = %target.identity, error = %delete, "could not delete published item");
                    }
                    return Err(err.into());
                }
            },
            _ => None,
        };

        if let Ok(library) = self.model.library_mut(target.key) {
            library.location = target.uri.clone();
            library.read_only = true;
        }
        self.registry
            .ensure(target.key)
            .set_managed(ItemState::ManagedUnlocked, remote.clone());
        tracing::debug!(library = %target.identity, revision = remote.revision, "transferred library");
        Ok(Transferred { remote, backup })
    }

    fn restore_target(&mut self, target: &PublishTarget) {
        if let Ok(library) = self.model.library_mut(target.key) {
            library.location = target.original_location.clone();
            library.repository_uri = None;
            library.read_only = target.original_read_only;
        }
        if let Some(item) = self.registry.get_mut(target.key) {
            item.set_unmanaged();
        }
    }

    fn clear_publish_marks(&mut self, batch: &[LibraryKey]) {
        for key in batch {
            if let Ok(library) = self.model.library_mut(*key) {
                library.repository_uri = None;
            }
        }
    }

    /// Undoes completed transfers in reverse order. Cleanup failures are logged and skipped.
    fn rollback_publish(
        &mut self,
        client: &dyn RepositoryClient,
        targets: &[PublishTarget],
        transferred: Vec<Transferred>,
    ) {
        let completed: Vec<(&PublishTarget, Transferred)> =
            targets.iter().zip(transferred).collect();
        for (target, done) in completed.into_iter().rev() {
            if let Err(err) = client.delete(&done.remote) {
                tracing::warn!(library = %target.identity, error = %err, "rollback could not delete published item");
            }
            if let Some(backup) = done.backup {
                if let Err(err) = backup.restore() {
                    tracing::warn!(library = %target.identity, error = %err, "rollback could not restore original file");
                }
            }
            self.restore_target(target);
        }
    }

    /// Rewrites references once more and persists the peers and descriptors that changed.
    fn finish_publish(&mut self, targets: &[PublishTarget]) {
        let mut touched = BTreeSet::new();
        for target in targets {
            match self.integrity.relocate(
                &mut self.model,
                target.key,
                &target.original_location,
                &target.uri,
            ) {
                Ok(rewritten) => touched.extend(rewritten),
                Err(err) => {
                    tracing::warn!(library = %target.identity, error = %err, "could not rewrite references after publish")
                }
            }
            touched.extend(closure::referencing(&self.model, target.key));
        }

        if !self.settings.auto_save {
            return;
        }
        for key in touched {
            if let Err(err) = self.persist_library(key) {
                tracing::warn!(library = %key, error = %err, "could not save rewritten library");
            }
        }
        let published: BTreeSet<LibraryKey> = targets.iter().map(|target| target.key).collect();
        let projects: BTreeSet<_> = published
            .iter()
            .filter_map(|key| self.registry.get(*key))
            .flat_map(|item| item.projects().iter().copied())
            .collect();
        for project in projects {
            if let Err(err) = self.auto_save(project) {
                tracing::warn!(project = %project, error = %err, "could not save project after publish");
            }
        }
    }
}
