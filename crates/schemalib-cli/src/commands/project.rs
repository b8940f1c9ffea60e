use clap::{Arg, ArgMatches, Command};

use crate::commands::CommandResult;
use crate::context::{CliSession, resolve_path};
use crate::error::{CliError, ExitStatus};
use crate::util::required;

pub fn command() -> Command {
    Command::new("project")
        .about("Create and inspect project descriptors")
        .subcommand_required(true)
        .subcommand(
            Command::new("new")
                .about("Create an empty project descriptor")
                .arg(Arg::new("file").required(true).value_name("FILE"))
                .arg(
                    Arg::new("id")
                        .long("id")
                        .required(true)
                        .value_name("ID")
                        .help("Project id, unique among open projects."),
                )
                .arg(Arg::new("name").long("name").value_name("NAME"))
                .arg(
                    Arg::new("description")
                        .long("description")
                        .value_name("TEXT"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Load a project and list its items with their lifecycle state")
                .arg(Arg::new("file").required(true).value_name("FILE")),
        )
}

pub fn run(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    match matches.subcommand() {
        Some(("new", sub)) => new_project(session, sub),
        Some(("show", sub)) => show_project(session, sub),
        _ => Err(CliError::new("missing project subcommand", ExitStatus::Usage)),
    }
}

fn new_project(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let file = required(matches, "file")?;
    let project_id = required(matches, "id")?;
    let name = matches
        .get_one::<String>("name")
        .map(String::as_str)
        .unwrap_or(project_id);
    let description = matches
        .get_one::<String>("description")
        .map(String::as_str)
        .unwrap_or_default();

    let path = resolve_path(file)?;
    if path.exists() {
        return Err(CliError::new(
            format!("{} already exists", session.relative(&path)),
            ExitStatus::Usage,
        ));
    }

    let mut manager = session.manager()?;
    let handle = manager.new_project(&path, project_id, name, description)?;
    let project = manager.project(handle)?;
    let path = project.file().unwrap_or(path.as_path());
    Ok(CommandResult::ProjectCreated {
        project_id: project_id.to_string(),
        name: project.name().to_string(),
        path: session.relative(path),
    })
}

fn show_project(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let open = session.open_project(required(matches, "file")?)?;
    let project = open.manager.project(open.handle)?;
    Ok(CommandResult::ProjectShown {
        project_id: project.project_id().unwrap_or_default().to_string(),
        name: project.name().to_string(),
        path: session.relative(&open.path),
        items: open.manager.project_items(open.handle)?,
        findings: open.findings,
    })
}
