//! Assembly phase: overlays every referenced done directory's tree into the
//! final build directory.
//!
//! Only files that actually changed are rewritten, so a rebuild with no
//! effective changes leaves every existing file's modification time intact
//! (tested by the no-op-on-rerun scenario); conversely, any file left over
//! from an output no longer produced is removed.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;

use crate::engine::context::BuildExecutionContext;
use crate::error::IsodError;
use crate::utils::list_files_relative;

pub(crate) fn assemble(context: &BuildExecutionContext) -> Result<(), IsodError> {
    std::fs::create_dir_all(&context.build_dir).map_err(|e| IsodError::io(&context.build_dir, e))?;

    let done_dirs: Vec<_> = {
        let guard = context.signature_to_task.lock().unwrap();
        guard.keys().map(|sig| context.done_dir(sig)).collect()
    };

    // Overlay order is immaterial: the validation phase already guaranteed
    // no two done directories share a relative path.
    let mut desired: BTreeMap<Utf8PathBuf, Utf8PathBuf> = BTreeMap::new();
    for done_dir in &done_dirs {
        for relative in list_files_relative(done_dir)? {
            desired.insert(relative.clone(), done_dir.join(relative));
        }
    }

    for (relative, source) in &desired {
        let target = context.build_dir.join(relative);
        if files_differ(source, &target)? {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| IsodError::io(parent, e))?;
            }
            std::fs::copy(source, &target).map_err(|e| IsodError::io(&target, e))?;
        }
    }

    for relative in list_files_relative(&context.build_dir)? {
        if !desired.contains_key(&relative) {
            let stale = context.build_dir.join(&relative);
            std::fs::remove_file(&stale).map_err(|e| IsodError::io(&stale, e))?;
        }
    }

    Ok(())
}

/// True if `target` is missing or its contents differ from `source`'s.
fn files_differ(source: &camino::Utf8Path, target: &camino::Utf8Path) -> Result<bool, IsodError> {
    let target_bytes = match std::fs::read(target) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(IsodError::io(target, e)),
    };
    let source_bytes = std::fs::read(source).map_err(|e| IsodError::io(source, e))?;
    Ok(target_bytes != source_bytes)
}
