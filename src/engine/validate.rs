//! Validation phase: detects two tasks that published overlapping relative
//! paths into their respective done directories.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;

use crate::engine::context::BuildExecutionContext;
use crate::error::IsodError;
use crate::task::TaskKey;
use crate::utils::list_files_relative;

pub(crate) fn check_for_output_collisions(context: &BuildExecutionContext) -> Result<(), IsodError> {
    // BTreeMap over signatures for a deterministic iteration order, so a
    // given input set produces a reproducible error when one occurs.
    let owners: BTreeMap<String, (TaskKey, String, Utf8PathBuf)> = {
        let guard = context.signature_to_task.lock().unwrap();
        guard
            .iter()
            .map(|(sig, (key, task))| (sig.clone(), (*key, task.name(), context.done_dir(sig))))
            .collect()
    };

    let mut owned_by: BTreeMap<Utf8PathBuf, (TaskKey, String)> = BTreeMap::new();

    for (_signature, (key, task_name, done_dir)) in owners {
        for relative in list_files_relative(&done_dir)? {
            match owned_by.get(&relative) {
                Some((owner_key, owner_name)) if *owner_key != key => {
                    return Err(IsodError::OutputCollision {
                        a: owner_name.clone(),
                        b: task_name,
                        path: relative,
                    });
                }
                Some(_) => {}
                None => {
                    owned_by.insert(relative, (key, task_name.clone()));
                }
            }
        }
    }

    Ok(())
}
