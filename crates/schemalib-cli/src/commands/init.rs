use std::env;
use std::path::{Component, Path, PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command};
use schemalib::WorkspaceConfig;
use schemalib::workspace::{DOT_DIR, WorkspacePaths};

use crate::commands::CommandResult;
use crate::error::{CliError, ExitStatus};

pub fn command() -> Command {
    Command::new("init")
        .about("Initialize a schemalib workspace")
        .arg(
            Arg::new("path")
                .value_name("PATH")
                .help("Workspace root to initialize. Defaults to the current directory."),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .value_name("NAME")
                .help("User recorded as the lock holder for repository operations."),
        )
        .arg(
            Arg::new("repository")
                .long("repository")
                .value_name("ID=LOCATION")
                .action(ArgAction::Append)
                .help("Register a repository by id. LOCATION is a directory or an http(s) URL."),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Show the resolved workspace root without writing to disk."),
        )
}

pub fn run(
    workspace_override: Option<String>,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let positional = matches.get_one::<String>("path").cloned();
    let target = workspace_override
        .or(positional)
        .unwrap_or_else(|| ".".to_string());
    let dry_run = matches.get_flag("dry-run");

    let root = absolutize(&target)?;
    let plan = plan_workspace(&root)?;
    let repositories = matches
        .get_many::<String>("repository")
        .into_iter()
        .flatten()
        .map(|raw| parse_repository(raw))
        .collect::<Result<Vec<_>, _>>()?;

    if dry_run {
        return Ok(CommandResult::WorkspaceInitialized {
            root: plan.paths.root().display().to_string(),
            dot_dir: plan.paths.dot_dir().display().to_string(),
            created: !plan.already_initialized,
            dry_run: true,
        });
    }

    let mut config = WorkspaceConfig::load(&plan.paths)?;
    if let Some(user) = matches.get_one::<String>("user") {
        config.user = Some(user.trim().to_string());
    }
    for (id, location) in repositories {
        config.repositories.insert(id, location);
    }
    config.save(&plan.paths)?;

    Ok(CommandResult::WorkspaceInitialized {
        root: plan.paths.root().display().to_string(),
        dot_dir: plan.paths.dot_dir().display().to_string(),
        created: !plan.already_initialized,
        dry_run: false,
    })
}

struct InitPlan {
    paths: WorkspacePaths,
    already_initialized: bool,
}

fn plan_workspace(root: &Path) -> Result<InitPlan, CliError> {
    if root.exists() && !root.is_dir() {
        return Err(CliError::new(
            format!("workspace root {} is not a directory", root.display()),
            ExitStatus::Usage,
        ));
    }

    let dot_dir = root.join(DOT_DIR);
    let already_initialized = dot_dir.is_dir();
    for ancestor in root.ancestors().skip(1) {
        let existing = ancestor.join(DOT_DIR);
        if existing.is_dir() {
            return Err(CliError::new(
                format!(
                    "cannot initialize workspace at {}; ancestor workspace already exists at {}",
                    root.display(),
                    existing.display()
                ),
                ExitStatus::Usage,
            ));
        }
    }

    Ok(InitPlan {
        paths: WorkspacePaths::new(root.to_path_buf(), dot_dir),
        already_initialized,
    })
}

fn parse_repository(raw: &str) -> Result<(String, String), CliError> {
    match raw.split_once('=') {
        Some((id, location)) if !id.trim().is_empty() && !location.trim().is_empty() => {
            Ok((id.trim().to_string(), location.trim().to_string()))
        }
        _ => Err(CliError::new(
            format!("repository '{raw}' must be written as ID=LOCATION"),
            ExitStatus::Usage,
        )),
    }
}

fn absolutize(raw: &str) -> Result<PathBuf, CliError> {
    let candidate = PathBuf::from(raw);
    let base = if candidate.is_absolute() {
        candidate
    } else {
        env::current_dir()?.join(candidate)
    };

    Ok(lexical_normalize(&base))
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // Absolute input, so `..` at the root is dropped.
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_flags_need_an_id_and_location() {
        assert_eq!(
            parse_repository("local = ./repo").unwrap(),
            ("local".to_string(), "./repo".to_string())
        );
        assert!(parse_repository("local").is_err());
        assert!(parse_repository("=./repo").is_err());
    }

    #[test]
    fn parent_components_are_folded() {
        assert_eq!(
            lexical_normalize(Path::new("/work/a/../b/./c")),
            PathBuf::from("/work/b/c")
        );
    }
}
