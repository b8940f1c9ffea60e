use clap::{Arg, ArgMatches, Command};
use schemalib::{LibraryKey, ManagedItemRef, ProjectManager, PublishError, SchemalibError};

use crate::commands::CommandResult;
use crate::context::{CliSession, OpenProject};
use crate::error::{CliError, ExitStatus, exit_status};
use crate::util::{collect_library_files, parse_managed, required, select_item};

fn project_arg() -> Arg {
    Arg::new("project")
        .required(true)
        .value_name("PROJECT")
        .help("Project descriptor file.")
}

pub fn add_command() -> Command {
    Command::new("add")
        .about("Add library files or repository items to a project")
        .arg(project_arg())
        .arg(
            Arg::new("items")
                .required(true)
                .num_args(1..)
                .value_name("ITEM")
                .help("Library files or directories; with --repository, filename@version entries."),
        )
        .arg(
            Arg::new("repository")
                .long("repository")
                .value_name("ID")
                .requires("ns")
                .help("Add managed items from this repository."),
        )
        .arg(
            Arg::new("ns")
                .long("ns")
                .value_name("NAMESPACE")
                .requires("repository")
                .help("Namespace of the managed items."),
        )
}

pub fn remove_command() -> Command {
    Command::new("remove")
        .about("Remove items from a project")
        .arg(project_arg())
        .arg(
            Arg::new("items")
                .required(true)
                .num_args(1..)
                .value_name("ITEM")
                .help("filename or filename@version of a project item."),
        )
}

pub fn publish_command() -> Command {
    Command::new("publish")
        .about("Publish unmanaged items to a repository as one batch")
        .arg(project_arg())
        .arg(
            Arg::new("repository")
                .long("repository")
                .required(true)
                .value_name("ID"),
        )
        .arg(
            Arg::new("items")
                .required(true)
                .num_args(1..)
                .value_name("ITEM")
                .help("filename or filename@version of an unmanaged project item."),
        )
}

pub fn add(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let mut open = session.open_project(required(matches, "project")?)?;
    let raw: Vec<String> = matches
        .get_many::<String>("items")
        .into_iter()
        .flatten()
        .cloned()
        .collect();

    match matches.get_one::<String>("repository") {
        Some(repository) => {
            let namespace = required(matches, "ns")?;
            let requests = raw
                .iter()
                .map(|spec| {
                    parse_managed(spec, namespace)
                        .map(|identity| ManagedItemRef::new(repository.as_str(), identity))
                })
                .collect::<Result<Vec<_>, _>>()?;
            open.manager.add_managed_project_items(&requests, open.handle)?;
        }
        None => {
            let files = collect_library_files(&raw, &open.path)?;
            if files.is_empty() {
                return Err(CliError::new("no library files found", ExitStatus::Usage));
            }
            open.manager.add_unmanaged_project_items(&files, open.handle)?;
        }
    }
    open.manager.save_project(open.handle, false)?;

    Ok(CommandResult::ItemsAdded {
        project: session.relative(&open.path),
        items: open.manager.project_items(open.handle)?,
        findings: open.findings,
    })
}

pub fn remove(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let mut open = session.open_project(required(matches, "project")?)?;
    let keys = selected(&open, matches)?;
    let removed = keys
        .iter()
        .map(|key| open.manager.summary(*key))
        .collect::<Result<Vec<_>, _>>()?;

    open.manager.remove_project_items(&keys, open.handle)?;
    open.manager.save_project(open.handle, false)?;

    Ok(CommandResult::ItemsRemoved {
        project: session.relative(&open.path),
        removed,
    })
}

pub fn publish(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let repository = required(matches, "repository")?;
    let mut open = session.open_project(required(matches, "project")?)?;
    let keys = selected(&open, matches)?;

    let items = open
        .manager
        .publish(&keys, repository)
        .map_err(|err| publish_error(&open.manager, err))?;
    open.manager.save_project(open.handle, false)?;

    Ok(CommandResult::Published {
        repository: repository.to_string(),
        items,
    })
}

fn selected(open: &OpenProject, matches: &ArgMatches) -> Result<Vec<LibraryKey>, CliError> {
    matches
        .get_many::<String>("items")
        .into_iter()
        .flatten()
        .map(|selector| select_item(&open.manager, open.handle, selector))
        .collect()
}

/// Names the libraries involved when the batch is blocked by unmanaged dependencies.
fn publish_error(manager: &ProjectManager, err: SchemalibError) -> CliError {
    let SchemalibError::Publish(PublishError::UnmanagedDependencies { pending, blocking }) = &err
    else {
        return err.into();
    };
    let names = |keys: &[LibraryKey]| {
        keys.iter()
            .map(|key| match manager.model().library(*key) {
                Ok(library) => library.identity().filename,
                Err(_) => key.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    CliError::new(
        format!(
            "cannot publish {}: depends on unmanaged {}; add them to the batch or publish them first",
            names(pending),
            names(blocking)
        ),
        exit_status(&err),
    )
}
