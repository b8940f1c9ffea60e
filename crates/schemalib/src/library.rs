use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SchemalibError;

/// URI scheme used for content addressed by repository identity.
pub const REPOSITORY_SCHEME: &str = "slib";

/// Release status of a library version.
#[derive(
    Clone,
    Copy,
    Debug,
    Serialize,
    Deserialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LibraryStatus {
    #[default]
    Draft,
    Final,
}

impl LibraryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LibraryStatus::Draft => "DRAFT",
            LibraryStatus::Final => "FINAL",
        }
    }
}

impl fmt::Display for LibraryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distinguishes project-trackable libraries from legacy schemas that only contribute
/// dependencies.
#[derive(
    Clone,
    Copy,
    Debug,
    Serialize,
    Deserialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    #[default]
    Library,
    LegacySchema,
}

/// Structural link between two libraries.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Include,
    Import,
    Extension,
}

/// The `(base namespace, filename, version)` tuple addressing managed content.
#[derive(
    Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct LibraryIdentity {
    pub namespace: String,
    pub filename: String,
    pub version: String,
}

impl LibraryIdentity {
    pub fn new(
        namespace: impl Into<String>,
        filename: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            filename: filename.into(),
            version: version.into(),
        }
    }

    /// Checks the filename and version are addressable inside a repository.
    pub fn validate(&self) -> Result<(), SchemalibError> {
        if self.namespace.trim().is_empty() {
            return Err(SchemalibError::Location(format!(
                "{self}: base namespace must not be empty"
            )));
        }
        ensure_safe_filename(&self.filename)?;
        semver::Version::parse(&self.version).map_err(|err| {
            SchemalibError::Location(format!("{self}: invalid version identifier: {err}"))
        })?;
        Ok(())
    }

    /// Builds `slib://{repository}/{filename}?ns={namespace}&version={version}`.
    pub fn repository_uri(&self, repository: &str) -> Result<Url, SchemalibError> {
        ensure_safe_filename(&self.filename)?;
        let mut url = Url::parse(&format!("{REPOSITORY_SCHEME}://{repository}/")).map_err(
            |err| SchemalibError::Location(format!("invalid repository id {repository}: {err}")),
        )?;
        url.set_path(&format!("/{}", self.filename));
        url.query_pairs_mut()
            .append_pair("ns", &self.namespace)
            .append_pair("version", &self.version);
        Ok(url)
    }

    /// Splits a repository URI into its repository id and identity.
    pub fn from_repository_uri(url: &Url) -> Option<(String, LibraryIdentity)> {
        if url.scheme() != REPOSITORY_SCHEME {
            return None;
        }
        let repository = url.host_str()?.to_string();
        let filename = url.path().trim_start_matches('/').to_string();
        if filename.is_empty() {
            return None;
        }
        let mut namespace = None;
        let mut version = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "ns" => namespace = Some(value.into_owned()),
                "version" => version = Some(value.into_owned()),
                _ => {}
            }
        }
        Some((
            repository,
            LibraryIdentity {
                namespace: namespace?,
                filename,
                version: version?,
            },
        ))
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.filename, self.version, self.namespace)
    }
}

/// Outgoing references of a library, each holding the location of its target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LibraryReferences {
    pub includes: Vec<Url>,
    pub imports: Vec<Url>,
    pub extends: Vec<Url>,
}

impl LibraryReferences {
    pub fn iter(&self) -> impl Iterator<Item = (ReferenceKind, &Url)> {
        self.includes
            .iter()
            .map(|url| (ReferenceKind::Include, url))
            .chain(self.imports.iter().map(|url| (ReferenceKind::Import, url)))
            .chain(self.extends.iter().map(|url| (ReferenceKind::Extension, url)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Url> {
        self.includes
            .iter_mut()
            .chain(self.imports.iter_mut())
            .chain(self.extends.iter_mut())
    }

    pub fn add(&mut self, kind: ReferenceKind, target: Url) -> bool {
        let list = match kind {
            ReferenceKind::Include => &mut self.includes,
            ReferenceKind::Import => &mut self.imports,
            ReferenceKind::Extension => &mut self.extends,
        };
        if list.contains(&target) {
            return false;
        }
        list.push(target);
        true
    }

    pub fn points_at(&self, target: &Url) -> bool {
        self.iter().any(|(_, url)| url == target)
    }
}

/// In-memory content of one library version.
#[derive(Clone, Debug, PartialEq)]
pub struct Library {
    pub name: String,
    pub namespace: String,
    pub filename: String,
    pub version: String,
    pub status: LibraryStatus,
    pub kind: LibraryKind,
    /// Where the content is currently read from and written to.
    pub location: Url,
    /// Set once the library is (or is about to be) addressed through a repository.
    pub repository_uri: Option<Url>,
    pub read_only: bool,
    pub references: LibraryReferences,
    pub content: String,
}

impl Library {
    pub fn identity(&self) -> LibraryIdentity {
        LibraryIdentity::new(&self.namespace, &self.filename, &self.version)
    }

    /// True when `url` addresses this library, either by content location or repository URI.
    pub fn is_addressed_by(&self, url: &Url) -> bool {
        &self.location == url || self.repository_uri.as_ref() == Some(url)
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        if self.location.scheme() == "file" {
            self.location.to_file_path().ok()
        } else {
            None
        }
    }

    /// Parses a library document. Relative references resolve against `base_dir`.
    pub fn parse(
        text: &str,
        location: Url,
        filename: impl Into<String>,
        base_dir: Option<&Path>,
    ) -> Result<Self, SchemalibError> {
        let document: LibraryDocument = serde_yaml::from_str(text)
            .map_err(|err| SchemalibError::load(&location, err))?;
        let resolve = |values: &[String]| -> Result<Vec<Url>, SchemalibError> {
            values
                .iter()
                .map(|value| resolve_reference(value, base_dir))
                .collect()
        };
        let references = LibraryReferences {
            includes: resolve(&document.includes)?,
            imports: resolve(&document.imports)?,
            extends: resolve(&document.extends)?,
        };

        Ok(Self {
            name: document.name,
            namespace: document.namespace,
            filename: filename.into(),
            version: document.version,
            status: document.status,
            kind: document.kind,
            location,
            repository_uri: None,
            read_only: false,
            references,
            content: document.content,
        })
    }

    pub fn load_file(path: &Path) -> Result<Self, SchemalibError> {
        let canonical =
            fs::canonicalize(path).map_err(|err| SchemalibError::load(path.display(), err))?;
        let text = fs::read_to_string(&canonical)
            .map_err(|err| SchemalibError::load(canonical.display(), err))?;
        let filename = canonical
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| SchemalibError::load(canonical.display(), "path has no file name"))?;
        let location = file_url(&canonical)?;
        let mut library = Self::parse(&text, location, filename, canonical.parent())?;
        library.read_only = fs::metadata(&canonical)
            .map(|meta| meta.permissions().readonly())
            .unwrap_or(false);
        Ok(library)
    }

    /// Serializes the library. File references under `base_dir` are written relative to it.
    pub fn to_document_string(&self, base_dir: Option<&Path>) -> Result<String, SchemalibError> {
        let render = |values: &[Url]| -> Vec<String> {
            values
                .iter()
                .map(|url| render_reference(url, base_dir))
                .collect()
        };
        let document = LibraryDocument {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            version: self.version.clone(),
            status: self.status,
            kind: self.kind,
            includes: render(&self.references.includes),
            imports: render(&self.references.imports),
            extends: render(&self.references.extends),
            content: self.content.clone(),
        };
        Ok(serde_yaml::to_string(&document)?)
    }

    pub fn save_file(&self, path: &Path) -> Result<(), SchemalibError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let body = self.to_document_string(path.parent())?;
        fs::write(path, body)?;
        Ok(())
    }
}

/// Minimal on-disk form of a library.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct LibraryDocument {
    pub name: String,
    pub namespace: String,
    pub version: String,
    #[serde(default)]
    pub status: LibraryStatus,
    #[serde(default)]
    pub kind: LibraryKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
    #[serde(default)]
    pub content: String,
}

pub fn file_url(path: &Path) -> Result<Url, SchemalibError> {
    Url::from_file_path(path)
        .map_err(|_| SchemalibError::Location(format!("{} is not absolute", path.display())))
}

fn resolve_reference(value: &str, base_dir: Option<&Path>) -> Result<Url, SchemalibError> {
    if let Ok(url) = Url::parse(value) {
        // Single-letter schemes are drive prefixes, not URLs.
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }
    let path = Path::new(value);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let base = base_dir.ok_or_else(|| {
            SchemalibError::Location(format!(
                "relative reference {value} has no base directory to resolve against"
            ))
        })?;
        normalize_path(&base.join(path))
    };
    file_url(&absolute)
}

fn render_reference(url: &Url, base_dir: Option<&Path>) -> String {
    if let (Some(base), Ok(path)) = (base_dir, url.to_file_path()) {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.to_string_lossy().replace('\\', "/");
        }
    }
    url.to_string()
}

fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn ensure_safe_filename(filename: &str) -> Result<(), SchemalibError> {
    if filename.is_empty() {
        return Err(SchemalibError::Location("filename must not be empty".into()));
    }
    if !filename
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
    {
        return Err(SchemalibError::Location(format!(
            "filename {filename} may only contain ASCII letters, digits, '.', '_' and '-'"
        )));
    }
    Ok(())
}
