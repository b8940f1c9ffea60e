use std::path::{Path, PathBuf};

use clap::ArgMatches;
use schemalib::{ItemSummary, LibraryIdentity, LibraryKey, ProjectHandle, ProjectManager};
use walkdir::WalkDir;

use crate::context::resolve_path;
use crate::error::{CliError, ExitStatus};

#[derive(Clone, Copy, Debug, Default)]
pub struct Verbosity {
    pub json: bool,
    pub verbose: bool,
}

pub fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, CliError> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| CliError::new(format!("missing <{name}>"), ExitStatus::Usage))
}

/// Finds a project member by `filename` or `filename@version`.
pub fn select_item(
    manager: &ProjectManager,
    handle: ProjectHandle,
    selector: &str,
) -> Result<LibraryKey, CliError> {
    let (filename, version) = match selector.split_once('@') {
        Some((filename, version)) => (filename, Some(version)),
        None => (selector, None),
    };
    let matches: Vec<ItemSummary> = manager
        .project_items(handle)?
        .into_iter()
        .filter(|item| {
            item.identity.filename == filename
                && version.is_none_or(|version| item.identity.version == version)
        })
        .collect();
    match matches.as_slice() {
        [item] => Ok(item.key),
        [] => Err(CliError::new(
            format!("no project item matches '{selector}'"),
            ExitStatus::Usage,
        )),
        _ => Err(CliError::new(
            format!("'{selector}' matches several items; use filename@version"),
            ExitStatus::Usage,
        )),
    }
}

/// Parses `filename@version` for a managed item in `namespace`.
pub fn parse_managed(spec: &str, namespace: &str) -> Result<LibraryIdentity, CliError> {
    let (filename, version) = spec.split_once('@').ok_or_else(|| {
        CliError::new(
            format!("managed item '{spec}' must be written as filename@version"),
            ExitStatus::Usage,
        )
    })?;
    let identity = LibraryIdentity::new(namespace, filename, version);
    identity
        .validate()
        .map_err(|err| CliError::new(err.to_string(), ExitStatus::Usage))?;
    Ok(identity)
}

/// Expands directories into the library files below them. Dot directories and the
/// project file itself are skipped.
pub fn collect_library_files(raw: &[String], project_file: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut files = Vec::new();
    for value in raw {
        let path = resolve_path(value)?;
        if !path.is_dir() {
            files.push(path);
            continue;
        }
        let walker = WalkDir::new(&path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));
        for entry in walker {
            let entry = entry.map_err(|err| CliError::new(err.to_string(), ExitStatus::Io))?;
            let candidate = entry.path();
            if entry.file_type().is_file() && is_library_file(candidate) && candidate != project_file {
                files.push(candidate.to_path_buf());
            }
        }
    }
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn is_library_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}
