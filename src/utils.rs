//! Small filesystem helpers shared across the engine.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::IsodError;

/// Recursively lists every file under `root`, returned as paths relative to
/// `root` with `/` separators, sorted lexicographically.
pub(crate) fn list_files_relative(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, IsodError> {
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk(root: &Utf8Path, dir: &Utf8Path, out: &mut Vec<Utf8PathBuf>) -> Result<(), IsodError> {
    for entry in std::fs::read_dir(dir).map_err(|e| IsodError::io(dir, e))? {
        let entry = entry.map_err(|e| IsodError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| IsodError::io(dir, e))?;
        let entry_path = entry.path();
        let path = Utf8PathBuf::try_from(entry_path.clone())
            .map_err(|_| IsodError::NonUtf8Path { path: entry_path })?;

        if file_type.is_dir() {
            walk(root, &path, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .expect("walked path is under root")
                .to_path_buf();
            out.push(relative);
        }
    }
    Ok(())
}

/// Removes `dir` if it exists, tolerating the case where it doesn't.
pub(crate) fn remove_dir_if_exists(dir: &Utf8Path) -> Result<(), IsodError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IsodError::io(dir, e)),
    }
}
