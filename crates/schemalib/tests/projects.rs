mod common;

use std::collections::BTreeSet;
use std::fs;

use common::{Fixture, NAMESPACE, REPO, USER, identity, repository_uri};
use schemalib::{
    DescriptorItem, ItemState, LibraryIdentity, ManagedItemRef, ProjectDescriptor,
    ProjectManager, ReferenceKind, RepositoryRegistry, SchemalibError, file_url,
};

fn member_names(manager: &ProjectManager, handle: schemalib::ProjectHandle) -> BTreeSet<String> {
    manager
        .project_items(handle)
        .unwrap()
        .into_iter()
        .map(|item| item.identity.filename)
        .collect()
}

#[test]
fn duplicate_project_id_or_file_is_rejected_without_side_effects() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager();
    let first = fixture.root().join("orders.slib.yaml");
    manager
        .new_project(&first, "orders", "Orders", "")
        .unwrap();

    let other_file = fixture.root().join("other.slib.yaml");
    let err = manager
        .new_project(&other_file, "orders", "Orders again", "")
        .unwrap_err();
    assert!(matches!(err, SchemalibError::DuplicateProjectId(id) if id == "orders"));
    assert!(!other_file.exists());

    let err = manager
        .new_project(&first, "billing", "Billing", "")
        .unwrap_err();
    assert!(matches!(err, SchemalibError::DuplicateProjectFile(_)));

    let err = manager.load_project(&first).unwrap_err();
    assert!(matches!(err, SchemalibError::DuplicateProjectFile(_)));

    assert_eq!(manager.projects().len(), 1);
    let descriptor = ProjectDescriptor::read(&first).unwrap();
    assert_eq!(descriptor.project_id, "orders");
}

#[test]
fn handles_are_bound_to_their_manager() {
    let fixture = Fixture::new();
    let mut first = fixture.manager();
    let mut second = fixture.manager();
    let handle = first
        .new_project(fixture.root().join("p.slib.yaml"), "p", "P", "")
        .unwrap();

    assert!(matches!(
        second.close_project(handle),
        Err(SchemalibError::WrongManager)
    ));
    assert!(matches!(
        second.project_items(handle),
        Err(SchemalibError::WrongManager)
    ));
    assert_eq!(first.projects(), vec![handle]);
}

#[test]
fn adding_a_library_pulls_in_its_closure() {
    let fixture = Fixture::new();
    fixture.write_library("common.yaml", &[]);
    let orders = fixture.write_library("orders.yaml", &["common.yaml".to_string()]);

    let mut manager = fixture.manager();
    let handle = manager
        .new_project(fixture.root().join("p.slib.yaml"), "p", "P", "")
        .unwrap();
    let added = manager.add_unmanaged_project_items(&[orders], handle).unwrap();

    assert_eq!(added.len(), 1);
    assert_eq!(
        member_names(&manager, handle),
        BTreeSet::from(["common.yaml".to_string(), "orders.yaml".to_string()])
    );
    for item in manager.project_items(handle).unwrap() {
        assert_eq!(item.state, ItemState::Unmanaged);
    }

    // Auto-save persisted the reconciled membership.
    let descriptor = ProjectDescriptor::read(&fixture.root().join("p.slib.yaml")).unwrap();
    assert_eq!(descriptor.items.len(), 2);
}

#[test]
fn added_reference_is_reconciled_into_the_project() {
    let fixture = Fixture::new();
    let orders = fixture.write_library("orders.yaml", &[]);
    let audit = fixture.write_library("audit.yaml", &[]);

    let mut manager = fixture.manager();
    let handle = manager
        .new_project(fixture.root().join("p.slib.yaml"), "p", "P", "")
        .unwrap();
    let keys = manager.add_unmanaged_project_items(&[orders], handle).unwrap();
    assert_eq!(member_names(&manager, handle).len(), 1);

    let findings = manager
        .add_reference(keys[0], ReferenceKind::Include, file_url(&audit).unwrap())
        .unwrap();
    assert!(findings.is_empty());
    assert!(member_names(&manager, handle).contains("audit.yaml"));
}

#[test]
fn edited_reference_reaches_only_the_projects_using_the_library() {
    let fixture = Fixture::new();
    let orders = fixture.write_library("orders.yaml", &[]);
    let billing = fixture.write_library("billing.yaml", &[]);
    let audit = fixture.write_library("audit.yaml", &[]);

    let mut manager = fixture.manager();
    let first = manager
        .new_project(fixture.root().join("p.slib.yaml"), "p", "P", "")
        .unwrap();
    let second = manager
        .new_project(fixture.root().join("q.slib.yaml"), "q", "Q", "")
        .unwrap();
    let keys = manager.add_unmanaged_project_items(&[orders], first).unwrap();
    manager.add_unmanaged_project_items(&[billing], second).unwrap();

    let target = file_url(&audit).unwrap();
    manager
        .edit_library(keys[0], |library| {
            library.references.add(ReferenceKind::Import, target);
        })
        .unwrap();

    assert_eq!(
        member_names(&manager, first),
        BTreeSet::from(["audit.yaml".to_string(), "orders.yaml".to_string()])
    );
    assert_eq!(
        member_names(&manager, second),
        BTreeSet::from(["billing.yaml".to_string()])
    );
}

#[test]
fn load_pulls_in_managed_dependencies_missing_from_the_descriptor() {
    let fixture = Fixture::new();
    fixture.seed("common.yaml", &[]);
    fixture.seed("orders.yaml", &[repository_uri("common.yaml")]);

    let file = fixture.root().join("p.slib.yaml");
    let mut descriptor = ProjectDescriptor::new("p", "P");
    descriptor
        .items
        .push(DescriptorItem::managed(REPO, identity("orders.yaml"), true));
    descriptor
        .repositories
        .insert(REPO.to_string(), fixture.repo_dir().display().to_string());
    descriptor.write(&file).unwrap();

    // The manager starts without repositories; the descriptor registers them.
    let mut manager = ProjectManager::new(fixture.settings(), RepositoryRegistry::new(USER));
    let load = manager.load_project(&file).unwrap();

    assert!(load.findings.is_empty(), "{:?}", load.findings);
    let items = manager.project_items(load.project).unwrap();
    assert_eq!(items.len(), 2);
    for item in &items {
        assert_eq!(item.state, ItemState::ManagedUnlocked);
        assert!(item.read_only);
    }
    let project = manager.project(load.project).unwrap();
    let default = project.default_item().unwrap();
    assert_eq!(
        manager.summary(default).unwrap().identity,
        identity("orders.yaml")
    );
}

#[test]
fn managed_namespace_mismatch_is_corrected_to_the_repository_value() {
    let fixture = Fixture::new();
    let staged = fixture.root().join("staged.yaml");
    fs::write(
        &staged,
        common::document("orders.yaml", "urn:elsewhere", "1.0.0", &[]),
    )
    .unwrap();
    schemalib::RepositoryClient::publish(
        fixture.repo.as_ref(),
        &staged,
        &identity("orders.yaml"),
        schemalib::LibraryStatus::Draft,
    )
    .unwrap();

    let mut manager = fixture.manager();
    let handle = manager
        .new_project(fixture.root().join("p.slib.yaml"), "p", "P", "")
        .unwrap();
    manager
        .add_managed_project_items(&[ManagedItemRef::new(REPO, identity("orders.yaml"))], handle)
        .unwrap();

    let items = manager.project_items(handle).unwrap();
    assert_eq!(items[0].identity.namespace, NAMESPACE);
}

#[test]
fn failed_load_discards_the_project_and_its_items() {
    let fixture = Fixture::new();
    fixture.write_library("common.yaml", &[]);
    fixture.write_library("orders.yaml", &["common.yaml".to_string()]);

    let file = fixture.root().join("p.slib.yaml");
    let mut descriptor = ProjectDescriptor::new("p", "P");
    descriptor.items.push(DescriptorItem::Unmanaged {
        path: "libs/orders.yaml".into(),
        default: false,
    });
    descriptor.items.push(DescriptorItem::Unmanaged {
        path: "libs/missing.yaml".into(),
        default: false,
    });
    descriptor.write(&file).unwrap();

    let mut manager = fixture.manager();
    let err = manager.load_project(&file).unwrap_err();
    assert!(matches!(err, SchemalibError::Load { .. }));
    assert!(manager.projects().is_empty());
    assert!(manager.registry().is_empty());
    assert!(manager.model().is_empty());

    // The same file can be loaded once it is fixed.
    fixture.write_library("missing.yaml", &[]);
    assert!(manager.load_project(&file).is_ok());
}

#[test]
fn unknown_descriptor_repository_becomes_a_finding() {
    let fixture = Fixture::new();
    fixture.write_library("orders.yaml", &[]);

    let file = fixture.root().join("p.slib.yaml");
    let mut descriptor = ProjectDescriptor::new("p", "P");
    descriptor.items.push(DescriptorItem::Unmanaged {
        path: "libs/orders.yaml".into(),
        default: false,
    });
    descriptor.items.push(DescriptorItem::managed(
        "remote",
        LibraryIdentity::new(NAMESPACE, "billing.yaml", "2.0.0"),
        false,
    ));
    descriptor
        .repositories
        .insert("remote".into(), "gopher://repo.example.com".into());
    descriptor.write(&file).unwrap();

    let mut manager = fixture.manager();
    let load = manager.load_project(&file).unwrap();
    assert_eq!(load.findings.len(), 2);
    assert!(load.findings[0].subject.contains("remote"));
    assert!(load.findings[1].subject.contains("billing.yaml"));
    assert!(load.findings[1].message.contains("remote"));
    assert_eq!(member_names(&manager, load.project), BTreeSet::from(["orders.yaml".to_string()]));
}

#[test]
fn save_then_load_round_trips_members() {
    let fixture = Fixture::new();
    fixture.seed("common.yaml", &[]);
    fixture.write_library("shared.yaml", &[]);
    let orders = fixture.write_library(
        "orders.yaml",
        &["shared.yaml".to_string(), repository_uri("common.yaml")],
    );
    let file = fixture.root().join("p.slib.yaml");

    let expected = {
        let mut manager = fixture.manager();
        let handle = manager.new_project(&file, "p", "P", "orders work").unwrap();
        let keys = manager
            .add_unmanaged_project_items(&[orders.clone()], handle)
            .unwrap();
        manager.set_default_item(handle, Some(keys[0])).unwrap();
        manager.save_project(handle, true).unwrap();
        member_names(&manager, handle)
    };
    assert_eq!(expected.len(), 3);

    let mut manager = fixture.manager();
    let load = manager.load_project(&file).unwrap();
    assert_eq!(member_names(&manager, load.project), expected);

    let project = manager.project(load.project).unwrap();
    assert_eq!(project.description(), "orders work");
    let default = manager.summary(project.default_item().unwrap()).unwrap();
    assert_eq!(default.identity.filename, "orders.yaml");

    let managed: Vec<LibraryIdentity> = manager
        .project_items(load.project)
        .unwrap()
        .into_iter()
        .filter(|item| item.state.is_managed())
        .map(|item| item.identity)
        .collect();
    assert_eq!(managed, vec![identity("common.yaml")]);
}

#[test]
fn closing_projects_purges_orphans_but_keeps_shared_items() {
    let fixture = Fixture::new();
    fixture.write_library("common.yaml", &[]);
    let orders = fixture.write_library("orders.yaml", &["common.yaml".to_string()]);
    let billing = fixture.write_library("billing.yaml", &["common.yaml".to_string()]);

    let mut manager = fixture.manager();
    let first = manager
        .new_project(fixture.root().join("a.slib.yaml"), "a", "A", "")
        .unwrap();
    let second = manager
        .new_project(fixture.root().join("b.slib.yaml"), "b", "B", "")
        .unwrap();
    manager.add_unmanaged_project_items(&[orders], first).unwrap();
    manager.add_unmanaged_project_items(&[billing], second).unwrap();
    assert_eq!(manager.registry().len(), 3);

    manager.close_project(first).unwrap();
    assert_eq!(manager.registry().len(), 2);
    assert_eq!(manager.model().len(), 2);
    assert!(manager.registry().orphans().is_empty());
    assert_eq!(
        member_names(&manager, second),
        BTreeSet::from(["billing.yaml".to_string(), "common.yaml".to_string()])
    );

    manager.close_all();
    assert!(manager.projects().is_empty());
    assert!(manager.registry().is_empty());
    assert!(manager.model().is_empty());
}

#[test]
fn removed_items_still_needed_by_the_closure_come_back() {
    let fixture = Fixture::new();
    fixture.write_library("common.yaml", &[]);
    let orders = fixture.write_library("orders.yaml", &["common.yaml".to_string()]);
    let audit = fixture.write_library("audit.yaml", &[]);

    let mut manager = fixture.manager();
    let handle = manager
        .new_project(fixture.root().join("p.slib.yaml"), "p", "P", "")
        .unwrap();
    manager
        .add_unmanaged_project_items(&[orders, audit], handle)
        .unwrap();
    let common = manager
        .find_item(&identity("common.yaml"))
        .expect("common resident");
    let audit = manager.find_item(&identity("audit.yaml")).unwrap();

    manager
        .remove_project_items(&[common, audit], handle)
        .unwrap();

    let names = member_names(&manager, handle);
    assert!(names.contains("common.yaml"));
    assert!(!names.contains("audit.yaml"));
    assert!(manager.find_item(&identity("audit.yaml")).is_none());
}

#[test]
fn builtin_project_cannot_be_closed() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager();
    let builtin = manager.builtin_project();
    assert!(matches!(
        manager.close_project(builtin),
        Err(SchemalibError::Project(_))
    ));
    assert!(manager.project(builtin).unwrap().is_builtin());
}
