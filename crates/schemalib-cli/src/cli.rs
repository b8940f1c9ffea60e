use std::ffi::OsString;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::commands;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::formatter::{OutputFormat, emit_result};
use crate::util::Verbosity;

const NAME: &str = "schemalib";

pub fn run() -> ExitCode {
    init_tracing();
    match run_cli(std::env::args()) {
        Ok(code) => code,
        Err(err) => {
            err.print();
            err.exit_code()
        }
    }
}

/// Parses arguments, resolves the workspace, and dispatches to a command.
/// Returns a `sysexits`-compatible `ExitCode`.
pub fn run_cli<I, S>(args: I) -> Result<ExitCode, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let command = build_cli();
    let matches = command.try_get_matches_from(args)?;

    let verbosity = Verbosity {
        json: matches.get_flag("json"),
        verbose: matches.get_flag("verbose"),
    };
    let output = if verbosity.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let workspace_override = matches.get_one::<String>("workspace").cloned();

    // `init` runs before a workspace exists.
    if let Some(("init", sub)) = matches.subcommand() {
        let result = commands::init::run(workspace_override, sub)?;
        return emit_result(result, output);
    }

    let session = CliSession::bootstrap(workspace_override, verbosity)?;
    if session.verbosity.verbose {
        tracing::info!(
            workspace = %session.workspace_paths.root().display(),
            user = %session.user,
            wip_folder = %session.settings.wip_folder.display(),
            repositories = session.config.repositories.len(),
            "resolved workspace context"
        );
    }

    let result = dispatch(&session, &matches)?;
    emit_result(result, output)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    Command::new(NAME)
        .about("Schema library projects and repository lifecycle")
        .arg(
            Arg::new("workspace")
                .long("workspace")
                .global(true)
                .value_name("PATH")
                .help("Specify the workspace root. Defaults to the nearest ancestor with a .schemalib folder."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit newline-delimited JSON instead of human-readable text."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log the resolved workspace, user, and repositories."),
        )
        .subcommand_required(true)
        .subcommand(commands::init::command())
        .subcommand(commands::project::command())
        .subcommand(commands::items::add_command())
        .subcommand(commands::items::remove_command())
        .subcommand(commands::items::publish_command())
        .subcommands(commands::lifecycle::commands())
}

fn dispatch(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<commands::CommandResult, CliError> {
    match matches.subcommand() {
        Some(("project", sub)) => commands::project::run(session, sub),
        Some(("add", sub)) => commands::items::add(session, sub),
        Some(("remove", sub)) => commands::items::remove(session, sub),
        Some(("publish", sub)) => commands::items::publish(session, sub),
        Some((name, sub)) if commands::lifecycle::handles(name) => {
            commands::lifecycle::run(session, name, sub)
        }
        _ => Err(CliError::new("missing command", ExitStatus::Usage)),
    }
}
