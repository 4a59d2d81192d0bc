//! Per-invocation state for a single [`crate::engine::execute`] call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;

use crate::error::IsodError;
use crate::task::{BuildTask, BuildTaskResult, TaskKey};

/// Owns the three build-relevant directories and the maps the scheduler
/// reads and writes while the graph runs.
pub(crate) struct BuildExecutionContext {
    pub source_dir: Utf8PathBuf,
    pub build_dir: Utf8PathBuf,
    pub done_outputs_dir: Utf8PathBuf,
    pub partial_outputs_dir: Utf8PathBuf,

    /// Written exactly once per task, by the node that executes it.
    pub task_to_result: Mutex<HashMap<TaskKey, Arc<BuildTaskResult>>>,
    /// First-writer-wins signature ownership; detects colliding tasks.
    pub signature_to_task: Mutex<HashMap<String, (TaskKey, Arc<dyn BuildTask>)>>,
}

impl BuildExecutionContext {
    pub fn new(
        source_dir: Utf8PathBuf,
        build_dir: Utf8PathBuf,
        meta_dir: Utf8PathBuf,
    ) -> Result<Self, IsodError> {
        let done_outputs_dir = meta_dir.join(".done");
        let partial_outputs_dir = meta_dir.join(".partial");

        std::fs::create_dir_all(&done_outputs_dir)
            .map_err(|e| IsodError::io(&done_outputs_dir, e))?;
        std::fs::create_dir_all(&partial_outputs_dir)
            .map_err(|e| IsodError::io(&partial_outputs_dir, e))?;

        Ok(Self {
            source_dir,
            build_dir,
            done_outputs_dir,
            partial_outputs_dir,
            task_to_result: Mutex::new(HashMap::new()),
            signature_to_task: Mutex::new(HashMap::new()),
        })
    }

    pub fn done_dir(&self, signature: &str) -> Utf8PathBuf {
        self.done_outputs_dir.join(signature)
    }

    pub fn partial_dir(&self, signature: &str) -> Utf8PathBuf {
        self.partial_outputs_dir.join(signature)
    }
}
