use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::backup::{BackupFile, backup_path};
use crate::error::{LifecycleError, SchemalibError};
use crate::library::{LibraryIdentity, LibraryStatus, file_url};
use crate::manager::{ProjectManager, managed_library, write_file};
use crate::model::LibraryKey;
use crate::registry::ItemState;
use crate::repository::{RepositoryClient, RepositoryItem};

impl ProjectManager {
    /// Acquires the repository lock and switches the item to a local WIP file.
    pub fn lock(&mut self, key: LibraryKey) -> Result<(), SchemalibError> {
        let (client, mirror) = self.managed_target(key, "lock", ItemState::ManagedUnlocked)?;
        let wip_path = self.wip_path(&mirror.identity);
        if let Some(holder) = self.wip_holder(key, &wip_path)? {
            return Err(LifecycleError::WipInUse {
                library: mirror.identity,
                holder,
                path: wip_path,
            }
            .into());
        }
        let remote = client.item(&mirror.identity)?;
        if let Some(owner) = remote.locked_by.clone() {
            self.apply_remote(key, remote, client.user())?;
            return Err(LifecycleError::LockedByOther {
                library: mirror.identity,
                owner,
            }
            .into());
        }

        let content = client.download(&remote)?;
        let (mut library, _) = managed_library(&content, file_url(&wip_path)?, &remote)?;
        library.read_only = false;

        if let Some(dir) = wip_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let backup = BackupFile::create(&wip_path)?;
        let locked = match fs::write(&wip_path, &content)
            .map_err(SchemalibError::from)
            .and_then(|()| client.lock(&remote).map_err(SchemalibError::from))
        {
            Ok(locked) => locked,
            Err(err) => {
                if let Err(restore) = backup.restore() {
                    tracing::warn!(path = %wip_path.display(), error = %restore, "could not restore WIP backup");
                }
                return Err(err);
            }
        };
        discard(backup);

        self.model.replace(key, library)?;
        self.registry
            .ensure(key)
            .set_managed(ItemState::ManagedWip, locked);
        self.sync_content(key);
        tracing::info!(library = %mirror.identity, wip = %wip_path.display(), "locked library for editing");
        Ok(())
    }

    /// Releases the lock. With `commit_wip` the WIP content is pushed first; otherwise local
    /// edits are discarded and the repository content is reloaded.
    pub fn unlock(&mut self, key: LibraryKey, commit_wip: bool) -> Result<(), SchemalibError> {
        let (client, mirror) = self.managed_target(key, "unlock", ItemState::ManagedWip)?;
        let remote = self.refresh_owned(key, client.as_ref(), &mirror)?;
        let wip_path = self.wip_path(&remote.identity);
        let uri = remote.uri()?;

        let (unlocked, replacement) = if commit_wip {
            self.write_wip(key, &wip_path)?;
            (client.unlock(&remote, Some(&wip_path))?, None)
        } else {
            let content = client.download(&remote)?;
            let (library, _) = managed_library(&content, uri.clone(), &remote)?;
            (client.unlock(&remote, None)?, Some(library))
        };

        if let Some(library) = replacement {
            self.model.replace(key, library)?;
        }
        let library = self.model.library_mut(key)?;
        library.location = uri;
        library.read_only = true;
        library.status = unlocked.status;
        self.registry
            .ensure(key)
            .set_managed(ItemState::ManagedUnlocked, unlocked);
        remove_wip_files(&wip_path);
        self.sync_content(key);
        tracing::info!(library = %mirror.identity, committed = commit_wip, "unlocked library");
        Ok(())
    }

    /// Pushes WIP content to the repository while keeping the lock.
    pub fn commit(&mut self, key: LibraryKey) -> Result<(), SchemalibError> {
        let (client, mirror) = self.managed_target(key, "commit", ItemState::ManagedWip)?;
        let remote = self.refresh_owned(key, client.as_ref(), &mirror)?;
        let wip_path = self.wip_path(&remote.identity);
        self.write_wip(key, &wip_path)?;
        let committed = client.commit(&remote, &wip_path)?;
        self.registry
            .ensure(key)
            .set_managed(ItemState::ManagedWip, committed);
        tracing::info!(library = %mirror.identity, "committed WIP content");
        Ok(())
    }

    /// Discards local WIP edits in favor of the last committed repository content.
    pub fn revert(&mut self, key: LibraryKey) -> Result<(), SchemalibError> {
        let (client, mirror) = self.managed_target(key, "revert", ItemState::ManagedWip)?;
        let remote = self.refresh_owned(key, client.as_ref(), &mirror)?;
        let reverted = client.revert(&remote)?;
        let content = client.download(&reverted)?;

        let wip_path = self.wip_path(&reverted.identity);
        let (mut library, _) = managed_library(&content, file_url(&wip_path)?, &reverted)?;
        library.read_only = false;

        let backup = BackupFile::create(&wip_path)?;
        if let Err(err) = write_file(&wip_path, &content) {
            if let Err(restore) = backup.restore() {
                tracing::warn!(path = %wip_path.display(), error = %restore, "could not restore WIP backup");
            }
            return Err(err);
        }
        discard(backup);

        self.model.replace(key, library)?;
        self.registry
            .ensure(key)
            .set_managed(ItemState::ManagedWip, reverted);
        self.sync_content(key);
        tracing::info!(library = %mirror.identity, "reverted WIP content");
        Ok(())
    }

    /// DRAFT -> FINAL.
    pub fn promote(&mut self, key: LibraryKey) -> Result<(), SchemalibError> {
        self.change_status(key, "promote", LibraryStatus::Draft)
    }

    /// FINAL -> DRAFT.
    pub fn demote(&mut self, key: LibraryKey) -> Result<(), SchemalibError> {
        self.change_status(key, "demote", LibraryStatus::Final)
    }

    /// Re-reads lock ownership and status from the repository.
    pub fn refresh(&mut self, key: LibraryKey) -> Result<ItemState, SchemalibError> {
        let item = self.item(key)?;
        let Some(mirror) = item.repository().cloned() else {
            return Ok(item.state());
        };
        let client = self.repositories.get(&mirror.repository)?;
        let remote = client.item(&mirror.identity)?;
        self.apply_remote(key, remote, client.user())
    }

    fn change_status(
        &mut self,
        key: LibraryKey,
        operation: &'static str,
        required: LibraryStatus,
    ) -> Result<(), SchemalibError> {
        let (client, mirror) = self.managed_target(key, operation, ItemState::ManagedUnlocked)?;
        if mirror.status != required {
            return Err(LifecycleError::StatusMismatch {
                library: mirror.identity,
                operation,
                status: mirror.status,
            }
            .into());
        }

        let remote = client.item(&mirror.identity)?;
        if let Some(owner) = remote.locked_by.clone() {
            self.apply_remote(key, remote, client.user())?;
            return Err(LifecycleError::LockedByOther {
                library: mirror.identity,
                owner,
            }
            .into());
        }
        let updated = match required {
            LibraryStatus::Draft => client.promote(&remote)?,
            LibraryStatus::Final => client.demote(&remote)?,
        };
        let status = updated.status;
        self.model.library_mut(key)?.status = status;
        self.registry
            .ensure(key)
            .set_managed(ItemState::ManagedUnlocked, updated);
        tracing::info!(library = %mirror.identity, %status, "changed library status");
        Ok(())
    }

    /// Another resident library already backed by `wip_path`, such as a second version of
    /// the same file.
    fn wip_holder(
        &self,
        key: LibraryKey,
        wip_path: &Path,
    ) -> Result<Option<LibraryIdentity>, SchemalibError> {
        let location = file_url(wip_path)?;
        Ok(self
            .model
            .iter()
            .find(|(other, library)| *other != key && library.location == location)
            .map(|(_, library)| library.identity()))
    }

    /// Checks the local state precondition and resolves the item's repository client.
    fn managed_target(
        &self,
        key: LibraryKey,
        operation: &'static str,
        required: ItemState,
    ) -> Result<(Arc<dyn RepositoryClient>, RepositoryItem), SchemalibError> {
        let library = self.model.library(key)?;
        let item = self.item(key)?;
        if item.state() != required {
            return Err(LifecycleError::IllegalState {
                library: library.identity(),
                operation,
                state: item.state(),
            }
            .into());
        }
        let mirror = item.repository().cloned().ok_or_else(|| {
            SchemalibError::Project(format!(
                "{} has no repository metadata",
                library.identity()
            ))
        })?;
        let client = self.repositories.get(&mirror.repository)?;
        Ok((client, mirror))
    }

    /// Confirms the current user still holds the lock. On a mismatch the local mirror is
    /// updated before the conflict is returned.
    fn refresh_owned(
        &mut self,
        key: LibraryKey,
        client: &dyn RepositoryClient,
        mirror: &RepositoryItem,
    ) -> Result<RepositoryItem, SchemalibError> {
        let remote = client.item(&mirror.identity)?;
        let error = match remote.locked_by.as_deref() {
            Some(owner) if owner == client.user() => return Ok(remote),
            Some(owner) => LifecycleError::LockedByOther {
                library: mirror.identity.clone(),
                owner: owner.to_string(),
            },
            None => LifecycleError::LockLost {
                library: mirror.identity.clone(),
                user: client.user().to_string(),
            },
        };
        self.apply_remote(key, remote, client.user())?;
        Err(error.into())
    }

    fn apply_remote(
        &mut self,
        key: LibraryKey,
        remote: RepositoryItem,
        user: &str,
    ) -> Result<ItemState, SchemalibError> {
        let state = ItemState::from_lock(remote.locked_by.as_deref(), user);
        let uri = remote.uri()?;
        let library = self.model.library_mut(key)?;
        library.status = remote.status;
        if state != ItemState::ManagedWip {
            library.location = uri;
            library.read_only = true;
        }
        let previous = self.registry.state(key);
        self.registry.ensure(key).set_managed(state, remote);
        if previous != Some(state) {
            tracing::debug!(library = %key, %state, "refreshed item state from repository");
        }
        Ok(state)
    }

    fn write_wip(&self, key: LibraryKey, wip_path: &Path) -> Result<(), SchemalibError> {
        let library = self.model.library(key)?;
        write_file(wip_path, &library.to_document_string(None)?)
    }

    /// Replaced content may carry new references.
    fn sync_content(&mut self, key: LibraryKey) {
        let mut findings = Vec::new();
        self.sync_closure(&mut findings);
        if !findings.is_empty() {
            tracing::debug!(library = %key, findings = findings.len(), "content change left unresolved references");
        }
    }
}

fn discard(backup: BackupFile) {
    let original = backup.original().to_path_buf();
    if let Err(err) = backup.discard() {
        tracing::warn!(path = %original.display(), error = %err, "could not remove backup file");
    }
}

fn remove_wip_files(wip_path: &Path) {
    for path in [wip_path.to_path_buf(), backup_path(wip_path)] {
        if path.exists() {
            if let Err(err) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %err, "could not remove WIP file");
            }
        }
    }
}
