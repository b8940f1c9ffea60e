use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// `orders.yaml` -> `orders.bak`.
pub fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("bak")
}

/// A file moved aside until the surrounding operation either succeeds or is undone.
#[derive(Debug)]
#[must_use = "a backup must be restored or discarded"]
pub struct BackupFile {
    original: PathBuf,
    backup: Option<PathBuf>,
}

impl BackupFile {
    /// Moves an existing file at `path` to its `.bak` name, replacing any older backup.
    /// A missing file yields an empty backup whose restore only removes `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            return Ok(Self {
                original: path.to_path_buf(),
                backup: None,
            });
        }
        let backup = backup_path(path);
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(path, &backup)?;
        Ok(Self {
            original: path.to_path_buf(),
            backup: Some(backup),
        })
    }

    pub fn original(&self) -> &Path {
        &self.original
    }

    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Puts the original file back, discarding anything written in its place.
    pub fn restore(self) -> io::Result<()> {
        if self.original.exists() {
            fs::remove_file(&self.original)?;
        }
        if let Some(backup) = &self.backup {
            fs::rename(backup, &self.original)?;
        }
        Ok(())
    }

    pub fn discard(self) -> io::Result<()> {
        if let Some(backup) = &self.backup {
            if backup.exists() {
                fs::remove_file(backup)?;
            }
        }
        Ok(())
    }

    /// Leaves the backup on disk as the recovery copy.
    pub fn keep(self) -> Option<PathBuf> {
        self.backup
    }
}

/// Anonymous staging files for uploads, removed when the area is dropped.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    pub fn stage(&mut self, contents: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes).map_err(|err| io::Error::other(err.to_string()))?;
        let path = self.dir.join(format!("stage-{}.tmp", hex::encode(bytes)));
        self.files.push(path.clone());
        fs::write(&path, contents)?;
        Ok(path)
    }

    fn cleanup(&mut self) {
        for path in self.files.drain(..) {
            if let Err(err) = fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %err, "failed to remove staging file");
                }
            }
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn restore_brings_back_the_previous_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("orders.yaml");
        fs::write(&path, "old").unwrap();

        let backup = BackupFile::create(&path).unwrap();
        assert!(!path.exists());
        assert_eq!(
            fs::read_to_string(temp.path().join("orders.bak")).unwrap(),
            "old"
        );

        fs::write(&path, "new").unwrap();
        backup.restore().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert!(!temp.path().join("orders.bak").exists());
    }

    #[test]
    fn create_replaces_stale_backup_and_discard_removes_it() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("orders.yaml");
        fs::write(&path, "current").unwrap();
        fs::write(temp.path().join("orders.bak"), "stale").unwrap();

        let backup = BackupFile::create(&path).unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("orders.bak")).unwrap(),
            "current"
        );
        backup.discard().unwrap();
        assert!(!temp.path().join("orders.bak").exists());
    }

    #[test]
    fn restore_without_original_removes_new_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("fresh.yaml");

        let backup = BackupFile::create(&path).unwrap();
        fs::write(&path, "partial").unwrap();
        backup.restore().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn staging_files_are_removed_on_drop() {
        let temp = tempdir().unwrap();
        let staged = {
            let mut staging = StagingArea::new(temp.path().join(".staging"));
            let path = staging.stage("payload").unwrap();
            assert_eq!(fs::read_to_string(&path).unwrap(), "payload");
            path
        };
        assert!(!staged.exists());
    }
}
