use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::util::{required, select_item};

const ACTIONS: [(&str, &str); 6] = [
    ("lock", "Lock a managed item and open a local WIP copy"),
    ("unlock", "Release the lock, discarding the WIP copy unless --commit is given"),
    ("commit", "Upload the WIP copy and keep the lock"),
    ("revert", "Replace the WIP copy with the last committed content"),
    ("promote", "Mark an unlocked DRAFT item as FINAL"),
    ("demote", "Return an unlocked FINAL item to DRAFT"),
];

pub fn commands() -> Vec<Command> {
    ACTIONS
        .iter()
        .map(|(name, about)| {
            let command = Command::new(*name)
                .about(*about)
                .arg(
                    Arg::new("project")
                        .required(true)
                        .value_name("PROJECT")
                        .help("Project descriptor file."),
                )
                .arg(
                    Arg::new("item")
                        .required(true)
                        .value_name("ITEM")
                        .help("filename or filename@version of a managed project item."),
                );
            if *name == "unlock" {
                command.arg(
                    Arg::new("commit")
                        .long("commit")
                        .action(ArgAction::SetTrue)
                        .help("Commit the WIP copy before releasing the lock."),
                )
            } else {
                command
            }
        })
        .collect()
}

pub fn handles(name: &str) -> bool {
    ACTIONS.iter().any(|(action, _)| *action == name)
}

pub fn run(
    session: &CliSession,
    action: &str,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let mut open = session.open_project(required(matches, "project")?)?;
    let key = select_item(&open.manager, open.handle, required(matches, "item")?)?;

    match action {
        "lock" => open.manager.lock(key)?,
        "unlock" => open.manager.unlock(key, matches.get_flag("commit"))?,
        "commit" => open.manager.commit(key)?,
        "revert" => open.manager.revert(key)?,
        "promote" => open.manager.promote(key)?,
        "demote" => open.manager.demote(key)?,
        other => {
            return Err(CliError::new(
                format!("unknown lifecycle action {other}"),
                ExitStatus::Usage,
            ));
        }
    }
    open.manager.save_project(open.handle, false)?;

    Ok(CommandResult::ItemTransitioned {
        action: action.to_string(),
        item: open.manager.summary(key)?,
    })
}
