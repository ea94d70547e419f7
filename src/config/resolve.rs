//! Resolution of a configured path to an absolute file location.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, StoreError};

/// Directories, relative to each search root, that may hold the config file.
const FILE_SEARCH_DIRS: &[&str] = &[".", "config", "../config", "../../config", "../../../config"];

/// Directories, relative to each search root, that may contain a `config/` folder.
const DIR_SEARCH_DIRS: &[&str] = &[".", "..", "../..", "../../.."];

/// Resolves `path` to an absolute location.
///
/// Absolute paths are returned as is. Relative paths (or plain file names)
/// are first searched for below the working directory and the executable's
/// directory. Failing that, a `config/` folder is located with the same
/// heuristics and the path is joined onto it. The file itself need not exist
/// in that last case.
pub fn resolve_config_path(path: &Path) -> Result<PathBuf> {
    resolve_from(path, &search_roots())
}

fn search_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }
    roots
}

pub(crate) fn resolve_from(path: &Path, roots: &[PathBuf]) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    if let Some(found) = find_config_file(path, roots) {
        debug!(path = ?found, "Found config file");
        return Ok(found);
    }

    if let Some(dir) = find_dir("config", roots) {
        debug!(dir = ?dir, "Anchoring config path at config directory");
        return Ok(dir.join(path));
    }

    Err(StoreError::PathNotFound {
        path: path.to_path_buf(),
    })
}

fn find_config_file(path: &Path, roots: &[PathBuf]) -> Option<PathBuf> {
    roots
        .iter()
        .flat_map(|root| FILE_SEARCH_DIRS.iter().map(move |dir| root.join(dir).join(path)))
        .find(|candidate| candidate.is_file())
        .and_then(|candidate| std::fs::canonicalize(candidate).ok())
}

fn find_dir(name: &str, roots: &[PathBuf]) -> Option<PathBuf> {
    roots
        .iter()
        .flat_map(|root| DIR_SEARCH_DIRS.iter().map(move |dir| root.join(dir).join(name)))
        .find(|candidate| candidate.is_dir())
        .and_then(|candidate| std::fs::canonicalize(candidate).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_untouched() {
        let path = Path::new("/definitely/not/here/config.json");
        assert_eq!(resolve_from(path, &[]).unwrap(), path);
    }

    #[test]
    fn finds_file_in_config_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join("config/app.json"), "{}").unwrap();

        let resolved = resolve_from(Path::new("app.json"), &[dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            resolved,
            std::fs::canonicalize(dir.path().join("config/app.json")).unwrap()
        );
    }

    #[test]
    fn anchors_missing_file_at_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("config")).unwrap();
        let root = dir.path().join("bin");
        std::fs::create_dir(&root).unwrap();

        let resolved = resolve_from(Path::new("new.json"), &[root]).unwrap();
        assert_eq!(
            resolved,
            std::fs::canonicalize(dir.path().join("config")).unwrap().join("new.json")
        );
        assert!(resolved.is_absolute());
    }

    #[test]
    fn fails_without_any_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a/b/c/d/e");
        std::fs::create_dir_all(&root).unwrap();

        let err = resolve_from(Path::new("missing.json"), &[root]).unwrap_err();
        assert!(matches!(err, StoreError::PathNotFound { .. }));
    }
}
