use std::collections::{BTreeMap, BTreeSet, VecDeque};

use url::Url;

use crate::library::LibraryKind;
use crate::model::{LibraryKey, LibraryModel};

/// Supplies the outgoing dependency edges of a library.
pub trait ReferenceNavigator: Send + Sync {
    fn dependencies(&self, model: &LibraryModel, library: LibraryKey) -> Vec<LibraryKey>;
}

/// Follows includes, imports, and extensions that resolve to resident libraries.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModelNavigator;

impl ReferenceNavigator for ModelNavigator {
    fn dependencies(&self, model: &LibraryModel, library: LibraryKey) -> Vec<LibraryKey> {
        let Some(source) = model.get(library) else {
            return Vec::new();
        };
        let mut targets = Vec::new();
        for (_, url) in source.references.iter() {
            if let Some(target) = model.resolve(url) {
                if target != library && !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }
}

/// Result of checking one project's members against the reference graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClosureReport {
    /// Reachable trackable libraries that are not yet members, in model order.
    pub missing: Vec<LibraryKey>,
}

impl ClosureReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Breadth-first reachability. Legacy schemas are traversed so their own dependencies count.
pub fn reachable<I>(
    model: &LibraryModel,
    navigator: &dyn ReferenceNavigator,
    roots: I,
) -> BTreeSet<LibraryKey>
where
    I: IntoIterator<Item = LibraryKey>,
{
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<LibraryKey> = VecDeque::new();
    for root in roots {
        if model.contains(root) && seen.insert(root) {
            queue.push_back(root);
        }
    }
    while let Some(current) = queue.pop_front() {
        for next in navigator.dependencies(model, current) {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}

/// Scans every resident library and reports which reachable ones the members lack.
pub fn analyze(
    model: &LibraryModel,
    navigator: &dyn ReferenceNavigator,
    members: &[LibraryKey],
) -> ClosureReport {
    let reachable = reachable(model, navigator, members.iter().copied());
    let missing = model
        .iter()
        .filter(|(key, library)| {
            reachable.contains(key)
                && !members.contains(key)
                && library.kind == LibraryKind::Library
        })
        .map(|(key, _)| key)
        .collect();
    ClosureReport { missing }
}

/// `changed` plus every resident library that transitively depends on one of them.
/// A project whose members intersect this set may have an incomplete closure.
pub fn dependents<I>(
    model: &LibraryModel,
    navigator: &dyn ReferenceNavigator,
    changed: I,
) -> BTreeSet<LibraryKey>
where
    I: IntoIterator<Item = LibraryKey>,
{
    let mut reverse: BTreeMap<LibraryKey, Vec<LibraryKey>> = BTreeMap::new();
    for key in model.keys() {
        for target in navigator.dependencies(model, key) {
            reverse.entry(target).or_default().push(key);
        }
    }

    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<LibraryKey> = VecDeque::new();
    for key in changed {
        if seen.insert(key) {
            queue.push_back(key);
        }
    }
    while let Some(current) = queue.pop_front() {
        for source in reverse.get(&current).into_iter().flatten() {
            if seen.insert(*source) {
                queue.push_back(*source);
            }
        }
    }
    seen
}

/// References that point at no resident library, in model order without duplicates.
pub fn unresolved_references(model: &LibraryModel) -> Vec<(LibraryKey, Url)> {
    let mut seen = BTreeSet::new();
    let mut unresolved = Vec::new();
    for (key, library) in model.iter() {
        for (_, url) in library.references.iter() {
            if model.resolve(url).is_none() && seen.insert(url.as_str().to_string()) {
                unresolved.push((key, url.clone()));
            }
        }
    }
    unresolved
}

/// Libraries whose references point at `target`.
pub fn referencing(model: &LibraryModel, target: LibraryKey) -> Vec<LibraryKey> {
    let Some(library) = model.get(target) else {
        return Vec::new();
    };
    model
        .iter()
        .filter(|(key, candidate)| {
            *key != target
                && candidate
                    .references
                    .iter()
                    .any(|(_, url)| library.is_addressed_by(url))
        })
        .map(|(key, _)| key)
        .collect()
}
