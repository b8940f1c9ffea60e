use std::fmt;
use std::process::ExitCode;

use clap::error::ErrorKind as ClapErrorKind;
use schemalib::{LifecycleError, PublishError, RepositoryError, SchemalibError};

const EX_OK: u8 = 0;
const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_UNAVAILABLE: u8 = 69;
const EX_SOFTWARE: u8 = 70;
const EX_OSERR: u8 = 71;
const EX_NOPERM: u8 = 77;
const EX_CONFIG: u8 = 78;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Ok,
    Usage,
    Data,
    Unavailable,
    Io,
    NoPermission,
    Config,
    Software,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Ok => EX_OK,
            ExitStatus::Usage => EX_USAGE,
            ExitStatus::Data => EX_DATAERR,
            ExitStatus::Unavailable => EX_UNAVAILABLE,
            ExitStatus::Io => EX_OSERR,
            ExitStatus::NoPermission => EX_NOPERM,
            ExitStatus::Config => EX_CONFIG,
            ExitStatus::Software => EX_SOFTWARE,
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    message: String,
    status: ExitStatus,
}

impl CliError {
    pub fn new(message: impl Into<String>, status: ExitStatus) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    pub fn status(&self) -> ExitStatus {
        self.status
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status.code())
    }

    pub fn print(&self) {
        if !self.message.is_empty() {
            eprintln!("{}", self.message);
        }
    }
}

pub fn exit_status(err: &SchemalibError) -> ExitStatus {
    match err {
        SchemalibError::Project(_)
        | SchemalibError::DuplicateProjectId(_)
        | SchemalibError::DuplicateProjectFile(_)
        | SchemalibError::Workspace(_) => ExitStatus::Usage,
        SchemalibError::UnknownRepository(_) => ExitStatus::Config,
        SchemalibError::Load { .. } | SchemalibError::Location(_) => ExitStatus::Data,
        SchemalibError::Lifecycle(err) => match err {
            LifecycleError::IllegalState { .. }
            | LifecycleError::StatusMismatch { .. }
            | LifecycleError::WipInUse { .. } => ExitStatus::Data,
            LifecycleError::LockedByOther { .. } | LifecycleError::LockLost { .. } => {
                ExitStatus::Unavailable
            }
        },
        SchemalibError::Publish(err) => match err {
            PublishError::UnmanagedDependencies { .. } => ExitStatus::Data,
            PublishError::PermissionDenied { .. } => ExitStatus::NoPermission,
            PublishError::Transfer { source, .. } => exit_status(source),
        },
        SchemalibError::Repository(err) => match err {
            RepositoryError::NotFound { .. } | RepositoryError::Conflict { .. } => {
                ExitStatus::Data
            }
            RepositoryError::PermissionDenied { .. } => ExitStatus::NoPermission,
            RepositoryError::Unreachable { .. } | RepositoryError::Transport(_) => {
                ExitStatus::Unavailable
            }
            RepositoryError::Io(_) => ExitStatus::Io,
        },
        SchemalibError::WrongManager
        | SchemalibError::UnknownLibrary(_)
        | SchemalibError::Serialization(_) => ExitStatus::Software,
        SchemalibError::Io(_) => ExitStatus::Io,
    }
}

impl From<SchemalibError> for CliError {
    fn from(err: SchemalibError) -> Self {
        CliError::new(err.to_string(), exit_status(&err))
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> Self {
        let status = match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => ExitStatus::Ok,
            _ => ExitStatus::Usage,
        };
        if status == ExitStatus::Ok {
            let _ = err.print();
            CliError::new(String::new(), status)
        } else {
            CliError::new(err.to_string(), status)
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::new(err.to_string(), ExitStatus::Io)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}
