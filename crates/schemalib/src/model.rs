use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SchemalibError;
use crate::library::{Library, LibraryIdentity, ReferenceKind};

/// Arena key of a resident library. One key per distinct content object.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct LibraryKey(u64);

impl LibraryKey {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LibraryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lib#{}", self.0)
    }
}

/// Structural changes queued for the owning manager to reconcile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelEvent {
    LibraryAdded(LibraryKey),
    LibraryRemoved(LibraryKey),
    ReferenceAdded {
        from: LibraryKey,
        kind: ReferenceKind,
        target: Url,
    },
    /// The content object behind a key was swapped or edited in place.
    ContentChanged(LibraryKey),
}

impl ModelEvent {
    /// Events that can grow a project's dependency closure.
    pub fn is_structural(&self) -> bool {
        !matches!(self, ModelEvent::LibraryRemoved(_))
    }

    pub fn subject(&self) -> LibraryKey {
        match self {
            ModelEvent::LibraryAdded(key)
            | ModelEvent::LibraryRemoved(key)
            | ModelEvent::ContentChanged(key) => *key,
            ModelEvent::ReferenceAdded { from, .. } => *from,
        }
    }
}

/// The shared set of resident libraries.
#[derive(Debug, Default)]
pub struct LibraryModel {
    libraries: BTreeMap<LibraryKey, Library>,
    next_key: u64,
    events: VecDeque<ModelEvent>,
}

impl LibraryModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, library: Library) -> LibraryKey {
        self.next_key += 1;
        let key = LibraryKey(self.next_key);
        self.libraries.insert(key, library);
        self.events.push_back(ModelEvent::LibraryAdded(key));
        key
    }

    pub fn remove(&mut self, key: LibraryKey) -> Option<Library> {
        let removed = self.libraries.remove(&key);
        if removed.is_some() {
            self.events.push_back(ModelEvent::LibraryRemoved(key));
        }
        removed
    }

    /// Swaps the content object behind `key`, returning the previous one.
    pub fn replace(&mut self, key: LibraryKey, library: Library) -> Result<Library, SchemalibError> {
        let slot = self
            .libraries
            .get_mut(&key)
            .ok_or(SchemalibError::UnknownLibrary(key))?;
        let previous = std::mem::replace(slot, library);
        self.events.push_back(ModelEvent::ContentChanged(key));
        Ok(previous)
    }

    /// Queues a `ContentChanged` for a library edited through `library_mut`.
    pub fn mark_changed(&mut self, key: LibraryKey) {
        if self.libraries.contains_key(&key) {
            self.events.push_back(ModelEvent::ContentChanged(key));
        }
    }

    pub fn get(&self, key: LibraryKey) -> Option<&Library> {
        self.libraries.get(&key)
    }

    pub fn library(&self, key: LibraryKey) -> Result<&Library, SchemalibError> {
        self.libraries
            .get(&key)
            .ok_or(SchemalibError::UnknownLibrary(key))
    }

    pub fn library_mut(&mut self, key: LibraryKey) -> Result<&mut Library, SchemalibError> {
        self.libraries
            .get_mut(&key)
            .ok_or(SchemalibError::UnknownLibrary(key))
    }

    pub fn contains(&self, key: LibraryKey) -> bool {
        self.libraries.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = LibraryKey> + '_ {
        self.libraries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LibraryKey, &Library)> {
        self.libraries.iter().map(|(key, library)| (*key, library))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (LibraryKey, &mut Library)> {
        self.libraries
            .iter_mut()
            .map(|(key, library)| (*key, library))
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Finds the resident library a reference points at.
    pub fn resolve(&self, target: &Url) -> Option<LibraryKey> {
        self.libraries
            .iter()
            .find(|(_, library)| library.is_addressed_by(target))
            .map(|(key, _)| *key)
    }

    pub fn find_by_identity(&self, identity: &LibraryIdentity) -> Option<LibraryKey> {
        self.libraries
            .iter()
            .find(|(_, library)| {
                library.namespace == identity.namespace
                    && library.filename == identity.filename
                    && library.version == identity.version
            })
            .map(|(key, _)| *key)
    }

    /// Adds a structural reference and queues it for reconciliation.
    pub fn add_reference(
        &mut self,
        from: LibraryKey,
        kind: ReferenceKind,
        target: Url,
    ) -> Result<bool, SchemalibError> {
        let library = self.library_mut(from)?;
        let added = library.references.add(kind, target.clone());
        if added {
            self.events
                .push_back(ModelEvent::ReferenceAdded { from, kind, target });
        }
        Ok(added)
    }

    pub fn drain_events(&mut self) -> Vec<ModelEvent> {
        self.events.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.libraries.clear();
        self.events.clear();
    }
}
