pub mod backup;
pub mod closure;
pub mod descriptor;
pub mod error;
pub mod integrity;
pub mod library;
pub mod lifecycle;
pub mod manager;
pub mod model;
pub mod project;
pub mod publish;
pub mod registry;
pub mod repository;
pub mod workspace;

pub use backup::{BackupFile, StagingArea, backup_path};
pub use closure::{ClosureReport, ModelNavigator, ReferenceNavigator};
pub use descriptor::{DescriptorItem, ProjectDescriptor};
pub use error::{LifecycleError, PublishError, RepositoryError, SchemalibError};
pub use integrity::{LocationRewriter, ReferenceIntegrity, ReferenceSnapshot};
pub use library::{
    Library, LibraryDocument, LibraryIdentity, LibraryKind, LibraryReferences, LibraryStatus,
    REPOSITORY_SCHEME, ReferenceKind, file_url,
};
pub use manager::{
    Finding, FindingSeverity, ItemSummary, ManagedItemRef, ManagerSettings, ProjectLoad,
    ProjectManager,
};
pub use model::{LibraryKey, LibraryModel, ModelEvent};
pub use project::{Project, ProjectHandle, ProjectId};
pub use registry::{ItemRegistry, ItemState, ProjectItem};
pub use repository::{
    FileRepository, HttpRepository, RepositoryClient, RepositoryItem, RepositoryRegistry,
};
pub use workspace::{
    FilesystemWorkspaceLocator, WorkspaceConfig, WorkspaceLocator, WorkspacePaths,
    discover as discover_workspace,
};
