use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory {path} missing or not writable: {reason}")]
    OutputDir { path: PathBuf, reason: String },
    #[error("export file name {0:?} is not a plain file name")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn output_dir_error(dir: &Path, reason: impl ToString) -> PersistError {
    PersistError::OutputDir {
        path: dir.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Creates `dir` when missing and checks that files can be created in it.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(output_dir_error(dir, "path is not a directory")),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| output_dir_error(dir, e))?;
        }
        Err(err) => return Err(output_dir_error(dir, err)),
    }
    // Anonymous, so nothing is left behind.
    tempfile::tempfile_in(dir).map_err(|e| output_dir_error(dir, e))?;
    Ok(())
}

/// The export files of one archive, staged next to their final names.
///
/// Nothing becomes visible under the final names until [`commit`](Self::commit).
/// Dropping an uncommitted export removes every staged file, so a failed
/// render or write leaves the previous export of that target untouched.
pub struct StagedExport {
    dir: PathBuf,
    staged: Vec<(PathBuf, NamedTempFile)>,
}

impl StagedExport {
    pub fn new(dir: PathBuf) -> Result<Self, PersistError> {
        fs::create_dir_all(&dir).map_err(|e| output_dir_error(&dir, e))?;
        Ok(Self {
            dir,
            staged: Vec::new(),
        })
    }

    pub fn stage(&mut self, file_name: &str, content: &str) -> Result<(), PersistError> {
        let mut components = Path::new(file_name).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(PersistError::InvalidName(file_name.to_string()));
        }

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        self.staged.push((self.dir.join(file_name), tmp));
        Ok(())
    }

    /// Moves every staged file to its final name, in staging order.
    pub fn commit(self) -> Result<Vec<PathBuf>, PersistError> {
        let mut paths = Vec::with_capacity(self.staged.len());
        for (target, tmp) in self.staged {
            tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
            paths.push(target);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn commit_replaces_previous_export() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dialogs");
        for content in ["one", "two"] {
            let mut export = StagedExport::new(out.clone()).unwrap();
            export.stage("Anna.json", content).unwrap();
            export.stage("Anna.html", content).unwrap();
            let paths = export.commit().unwrap();
            assert_eq!(paths, vec![out.join("Anna.json"), out.join("Anna.html")]);
        }

        assert_eq!(fs::read_to_string(out.join("Anna.json")).unwrap(), "two");
        assert_eq!(names(&out), vec!["Anna.html", "Anna.json"]);
    }

    #[test]
    fn abandoned_export_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Anna.json"), "old").unwrap();

        let mut export = StagedExport::new(dir.path().to_path_buf()).unwrap();
        export.stage("Anna.json", "new").unwrap();
        drop(export);

        assert_eq!(names(dir.path()), vec!["Anna.json"]);
        assert_eq!(fs::read_to_string(dir.path().join("Anna.json")).unwrap(), "old");
    }

    #[test]
    fn names_outside_the_directory_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut export = StagedExport::new(dir.path().to_path_buf()).unwrap();
        for name in ["../Anna.json", "sub/Anna.json", "", ".."] {
            assert!(
                matches!(export.stage(name, "x"), Err(PersistError::InvalidName(_))),
                "{name:?}"
            );
        }
        assert!(names(dir.path()).is_empty());
    }

    #[test]
    fn file_in_place_of_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("dialogs");
        fs::write(&blocker, "x").unwrap();
        assert!(matches!(
            ensure_output_dir(&blocker),
            Err(PersistError::OutputDir { .. })
        ));
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("output").join("posts");
        ensure_output_dir(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(names(&nested).is_empty());
    }
}
