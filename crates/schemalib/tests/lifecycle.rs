mod common;

use std::fs;

use common::{Fixture, REPO, identity};
use schemalib::{
    ItemState, LibraryIdentity, LibraryKey, LibraryStatus, LifecycleError, ManagedItemRef,
    ProjectManager, RepositoryClient, SchemalibError, backup_path,
};

fn managed_project(fixture: &Fixture) -> (ProjectManager, LibraryKey) {
    fixture.seed("orders.yaml", &[]);
    let mut manager = fixture.manager();
    let handle = manager
        .new_project(fixture.root().join("p.slib.yaml"), "p", "P", "")
        .unwrap();
    let keys = manager
        .add_managed_project_items(&[ManagedItemRef::new(REPO, identity("orders.yaml"))], handle)
        .unwrap();
    (manager, keys[0])
}

fn state(manager: &ProjectManager, key: LibraryKey) -> ItemState {
    manager.item(key).unwrap().state()
}

fn remote_content(fixture: &Fixture) -> String {
    let item = fixture.repo.item(&identity("orders.yaml")).unwrap();
    fixture.repo.download(&item).unwrap()
}

#[test]
fn lock_switches_to_an_editable_wip_copy() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);

    manager.lock(key).unwrap();

    assert_eq!(state(&manager, key), ItemState::ManagedWip);
    let library = manager.model().library(key).unwrap();
    let wip = fixture.wip_dir().join("urn_orders").join("orders.yaml");
    assert_eq!(library.file_path().unwrap(), wip);
    assert!(!library.read_only);
    assert!(wip.exists());
    assert!(!backup_path(&wip).exists());
    let remote = fixture.repo.item(&identity("orders.yaml")).unwrap();
    assert_eq!(remote.locked_by.as_deref(), Some(common::USER));
}

#[test]
fn unlock_without_commit_discards_local_edits() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);
    let before = remote_content(&fixture);

    manager.lock(key).unwrap();
    manager
        .edit_library(key, |library| library.content = "edited".into())
        .unwrap();
    manager.unlock(key, false).unwrap();

    assert_eq!(remote_content(&fixture), before);
    assert_eq!(state(&manager, key), ItemState::ManagedUnlocked);
    let library = manager.model().library(key).unwrap();
    assert_eq!(
        library.location,
        identity("orders.yaml").repository_uri(REPO).unwrap()
    );
    assert!(library.read_only);
    assert_ne!(library.content, "edited");
    assert!(!fixture.wip_dir().join("urn_orders").join("orders.yaml").exists());
}

#[test]
fn commit_and_unlock_with_commit_push_wip_content() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);

    manager.lock(key).unwrap();
    manager
        .edit_library(key, |library| library.content = "first draft".into())
        .unwrap();
    manager.commit(key).unwrap();
    assert_eq!(state(&manager, key), ItemState::ManagedWip);
    assert!(remote_content(&fixture).contains("first draft"));

    manager
        .edit_library(key, |library| library.content = "second draft".into())
        .unwrap();
    manager.unlock(key, true).unwrap();
    assert_eq!(state(&manager, key), ItemState::ManagedUnlocked);
    assert!(remote_content(&fixture).contains("second draft"));
    assert!(fixture.repo.item(&identity("orders.yaml")).unwrap().locked_by.is_none());
}

#[test]
fn revert_restores_last_committed_content() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);
    let original = manager.model().library(key).unwrap().content.clone();

    manager.lock(key).unwrap();
    manager
        .edit_library(key, |library| library.content = "scratch".into())
        .unwrap();
    manager.revert(key).unwrap();

    assert_eq!(state(&manager, key), ItemState::ManagedWip);
    let library = manager.model().library(key).unwrap();
    assert_eq!(library.content, original);
    let wip = fs::read_to_string(library.file_path().unwrap()).unwrap();
    assert!(!wip.contains("scratch"));
}

#[test]
fn operations_outside_their_states_are_rejected_without_changes() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);

    for result in [
        manager.unlock(key, false),
        manager.commit(key),
        manager.revert(key),
    ] {
        assert!(matches!(
            result,
            Err(SchemalibError::Lifecycle(LifecycleError::IllegalState { .. }))
        ));
    }
    assert!(matches!(
        manager.demote(key),
        Err(SchemalibError::Lifecycle(LifecycleError::StatusMismatch { .. }))
    ));
    assert_eq!(state(&manager, key), ItemState::ManagedUnlocked);

    // Managed content is read-only until locked.
    assert!(manager.edit_library(key, |library| library.content.clear()).is_err());

    manager.lock(key).unwrap();
    assert!(matches!(
        manager.lock(key),
        Err(SchemalibError::Lifecycle(LifecycleError::IllegalState { .. }))
    ));
}

#[test]
fn promote_while_wip_is_rejected() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);
    manager.lock(key).unwrap();

    let err = manager.promote(key).unwrap_err();
    assert!(matches!(
        err,
        SchemalibError::Lifecycle(LifecycleError::IllegalState {
            state: ItemState::ManagedWip,
            ..
        })
    ));
    assert_eq!(state(&manager, key), ItemState::ManagedWip);
    assert_eq!(
        manager.model().library(key).unwrap().status,
        LibraryStatus::Draft
    );
    assert_eq!(
        fixture.repo.item(&identity("orders.yaml")).unwrap().status,
        LibraryStatus::Draft
    );
}

#[test]
fn promote_and_demote_toggle_release_status() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);

    manager.promote(key).unwrap();
    assert_eq!(manager.model().library(key).unwrap().status, LibraryStatus::Final);
    assert!(matches!(
        manager.promote(key),
        Err(SchemalibError::Lifecycle(LifecycleError::StatusMismatch { .. }))
    ));

    manager.demote(key).unwrap();
    assert_eq!(manager.model().library(key).unwrap().status, LibraryStatus::Draft);
    assert_eq!(
        fixture.repo.item(&identity("orders.yaml")).unwrap().status,
        LibraryStatus::Draft
    );
}

#[test]
fn lock_held_by_another_user_is_reported() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);

    let bob = fixture.repo_as("bob");
    let item = bob.item(&identity("orders.yaml")).unwrap();
    bob.lock(&item).unwrap();

    let err = manager.lock(key).unwrap_err();
    assert!(matches!(
        err,
        SchemalibError::Lifecycle(LifecycleError::LockedByOther { ref owner, .. }) if owner == "bob"
    ));
    assert_eq!(state(&manager, key), ItemState::ManagedLocked);
}

#[test]
fn failed_lock_restores_the_previous_wip_file() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);

    let wip = fixture.wip_dir().join("urn_orders").join("orders.yaml");
    fs::create_dir_all(wip.parent().unwrap()).unwrap();
    fs::write(&wip, "previous").unwrap();
    fixture.restrict_namespace(&["bob"]);

    let err = manager.lock(key).unwrap_err();
    assert!(matches!(err, SchemalibError::Repository(_)));
    assert_eq!(fs::read_to_string(&wip).unwrap(), "previous");
    assert!(!backup_path(&wip).exists());
    assert_eq!(state(&manager, key), ItemState::ManagedUnlocked);
    assert!(manager.model().library(key).unwrap().read_only);
}

#[test]
fn refresh_picks_up_a_lock_lost_elsewhere() {
    let fixture = Fixture::new();
    let (mut manager, key) = managed_project(&fixture);
    manager.lock(key).unwrap();

    // Another session of the same user releases the lock.
    let item = fixture.repo.item(&identity("orders.yaml")).unwrap();
    fixture.repo.unlock(&item, None).unwrap();

    let err = manager.commit(key).unwrap_err();
    assert!(matches!(
        err,
        SchemalibError::Lifecycle(LifecycleError::LockLost { .. })
    ));
    assert_eq!(state(&manager, key), ItemState::ManagedUnlocked);
    assert_eq!(manager.refresh(key).unwrap(), ItemState::ManagedUnlocked);
}

#[test]
fn second_version_cannot_take_over_a_wip_file() {
    let fixture = Fixture::new();
    let (mut manager, first) = managed_project(&fixture);
    fixture.seed_version("orders.yaml", "1.1.0", &[]);
    let newer = LibraryIdentity::new(common::NAMESPACE, "orders.yaml", "1.1.0");
    let handle = manager.projects()[0];
    let second = manager
        .add_managed_project_items(&[ManagedItemRef::new(REPO, newer.clone())], handle)
        .unwrap()[0];

    manager.lock(first).unwrap();
    manager
        .edit_library(first, |library| library.content = "first edits".into())
        .unwrap();
    manager.save_project(handle, true).unwrap();
    let wip = fixture.wip_dir().join("urn_orders").join("orders.yaml");
    let before = fs::read_to_string(&wip).unwrap();

    let err = manager.lock(second).unwrap_err();
    assert!(matches!(
        err,
        SchemalibError::Lifecycle(LifecycleError::WipInUse { ref holder, .. })
            if holder == &identity("orders.yaml")
    ));
    assert_eq!(state(&manager, second), ItemState::ManagedUnlocked);
    assert!(fixture.repo.item(&newer).unwrap().locked_by.is_none());
    assert_eq!(fs::read_to_string(&wip).unwrap(), before);
    assert!(before.contains("first edits"));
    assert!(!backup_path(&wip).exists());

    manager.unlock(first, true).unwrap();
    manager.lock(second).unwrap();
    assert!(fs::read_to_string(&wip).unwrap().contains("1.1.0"));
}
