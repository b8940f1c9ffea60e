use std::collections::BTreeMap;

use url::Url;

use crate::error::SchemalibError;
use crate::library::LibraryReferences;
use crate::model::{LibraryKey, LibraryModel};

/// Keeps include/import/extension references valid when a library changes location.
pub trait ReferenceIntegrity: Send + Sync {
    /// Repoints references to `previous` at `current` in every library other than `target`.
    /// Returns the libraries that were rewritten.
    fn relocate(
        &self,
        model: &mut LibraryModel,
        target: LibraryKey,
        previous: &Url,
        current: &Url,
    ) -> Result<Vec<LibraryKey>, SchemalibError>;
}

/// Rewrites reference URLs in place.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocationRewriter;

impl ReferenceIntegrity for LocationRewriter {
    fn relocate(
        &self,
        model: &mut LibraryModel,
        target: LibraryKey,
        previous: &Url,
        current: &Url,
    ) -> Result<Vec<LibraryKey>, SchemalibError> {
        if previous == current {
            return Ok(Vec::new());
        }
        let mut touched = Vec::new();
        for (key, library) in model.iter_mut() {
            if key == target {
                continue;
            }
            let mut changed = false;
            for url in library.references.iter_mut() {
                if url == previous {
                    *url = current.clone();
                    changed = true;
                }
            }
            if changed {
                touched.push(key);
            }
        }
        Ok(touched)
    }
}

/// Saved reference lists used to undo rewrites.
#[derive(Clone, Debug, Default)]
pub struct ReferenceSnapshot {
    references: BTreeMap<LibraryKey, LibraryReferences>,
}

impl ReferenceSnapshot {
    pub fn capture(model: &LibraryModel) -> Self {
        Self {
            references: model
                .iter()
                .map(|(key, library)| (key, library.references.clone()))
                .collect(),
        }
    }

    /// Puts every captured reference list back. Libraries added since capture are untouched.
    pub fn restore(&self, model: &mut LibraryModel) {
        for (key, library) in model.iter_mut() {
            if let Some(references) = self.references.get(&key) {
                library.references = references.clone();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}
