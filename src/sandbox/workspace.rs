use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::classifier::SourceUnit;
use crate::error::{EngineError, GroupError};

/// A private directory holding the sources of one request and the classes
/// compiled from them.
///
/// Sources are laid out by package so the compiler's source path resolves
/// them. The directory is removed by [`release`](Self::release), or on drop
/// when the request ends early.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    files: Vec<PathBuf>,
    names: HashMap<String, String>,
}

impl Workspace {
    /// Writes every unit under a fresh directory inside `parent`
    pub fn materialize(parent: &Path, units: &[SourceUnit]) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        for unit in units {
            let fqn = unit.fully_qualified_name();
            if !seen.insert(fqn.clone()) {
                return Err(GroupError::DuplicateFullyQualifiedName(fqn).into());
            }
        }

        fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new().prefix("javanb-").tempdir_in(parent)?;

        let mut files = Vec::with_capacity(units.len());
        let mut names = HashMap::with_capacity(units.len());
        for unit in units {
            let path = dir.path().join(unit.relative_path());
            if let Some(package_dir) = path.parent() {
                fs::create_dir_all(package_dir)?;
            }
            fs::write(&path, &unit.source)?;
            files.push(path);
            names.insert(unit.id.clone(), unit.fully_qualified_name());
        }

        log::debug!(
            "Materialized {} unit(s) into {}",
            units.len(),
            dir.path().display()
        );
        Ok(Self { dir, files, names })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute paths of the written sources, in unit order
    pub fn source_files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Source paths relative to [`root`](Self::root), in unit order
    pub fn relative_source_files(&self) -> impl Iterator<Item = &Path> {
        self.files
            .iter()
            .filter_map(|file| file.strip_prefix(self.dir.path()).ok())
    }

    pub fn fully_qualified_name(&self, unit_id: &str) -> Option<&str> {
        self.names.get(unit_id).map(String::as_str)
    }

    /// Deletes the directory and everything compiled into it
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            log::warn!("Failed to remove workspace {}: {e}", path.display());
        }
    }
}
