use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::LibraryKey;
use crate::project::ProjectId;
use crate::repository::RepositoryItem;

/// Lifecycle state of a project item.
#[derive(
    Clone,
    Copy,
    Debug,
    Serialize,
    Deserialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    #[default]
    Unmanaged,
    ManagedUnlocked,
    /// Locked by another user.
    ManagedLocked,
    /// Locked by the current user and editable through a local WIP file.
    ManagedWip,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Unmanaged => "UNMANAGED",
            ItemState::ManagedUnlocked => "MANAGED_UNLOCKED",
            ItemState::ManagedLocked => "MANAGED_LOCKED",
            ItemState::ManagedWip => "MANAGED_WIP",
        }
    }

    pub fn is_managed(self) -> bool {
        !matches!(self, ItemState::Unmanaged)
    }

    /// Derives the state of a managed item from its repository lock holder.
    pub fn from_lock(locked_by: Option<&str>, user: &str) -> Self {
        match locked_by {
            None => ItemState::ManagedUnlocked,
            Some(owner) if owner == user => ItemState::ManagedWip,
            Some(_) => ItemState::ManagedLocked,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local representative of one resident library.
#[derive(Clone, Debug)]
pub struct ProjectItem {
    library: LibraryKey,
    state: ItemState,
    repository: Option<RepositoryItem>,
    projects: BTreeSet<ProjectId>,
}

impl ProjectItem {
    pub fn library(&self) -> LibraryKey {
        self.library
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Last known repository mirror. May be stale after a failed remote call.
    pub fn repository(&self) -> Option<&RepositoryItem> {
        self.repository.as_ref()
    }

    pub fn projects(&self) -> &BTreeSet<ProjectId> {
        &self.projects
    }

    pub fn is_orphaned(&self) -> bool {
        self.projects.is_empty()
    }

    pub(crate) fn set_managed(&mut self, state: ItemState, repository: RepositoryItem) {
        self.state = state;
        self.repository = Some(repository);
    }

    pub(crate) fn set_unmanaged(&mut self) {
        self.state = ItemState::Unmanaged;
        self.repository = None;
    }
}

/// All project items of a manager, keyed by the library they wrap.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: BTreeMap<LibraryKey, ProjectItem>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: LibraryKey) -> Option<&ProjectItem> {
        self.items.get(&key)
    }

    pub(crate) fn get_mut(&mut self, key: LibraryKey) -> Option<&mut ProjectItem> {
        self.items.get_mut(&key)
    }

    /// Returns the item for `key`, creating an unmanaged one on demand.
    pub(crate) fn ensure(&mut self, key: LibraryKey) -> &mut ProjectItem {
        self.items.entry(key).or_insert_with(|| ProjectItem {
            library: key,
            state: ItemState::Unmanaged,
            repository: None,
            projects: BTreeSet::new(),
        })
    }

    pub(crate) fn remove(&mut self, key: LibraryKey) -> Option<ProjectItem> {
        self.items.remove(&key)
    }

    pub(crate) fn attach(&mut self, key: LibraryKey, project: ProjectId) {
        self.ensure(key).projects.insert(project);
    }

    pub(crate) fn detach(&mut self, key: LibraryKey, project: ProjectId) {
        if let Some(item) = self.items.get_mut(&key) {
            item.projects.remove(&project);
        }
    }

    pub fn contains(&self, key: LibraryKey) -> bool {
        self.items.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = LibraryKey> + '_ {
        self.items.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn orphans(&self) -> Vec<LibraryKey> {
        self.items
            .values()
            .filter(|item| item.is_orphaned())
            .map(|item| item.library)
            .collect()
    }

    pub fn state(&self, key: LibraryKey) -> Option<ItemState> {
        self.items.get(&key).map(|item| item.state)
    }
}
