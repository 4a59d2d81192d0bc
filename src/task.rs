//! The [`BuildTask`] capability: a named unit of work that declares its own
//! upstream tasks, derives a cryptographic signature from its inputs, and
//! writes its outputs into a directory handed to it by the engine.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

/// Passed to [`BuildTask::execute`]. The task must place every file it
/// produces under `output_dir`, and must not write outside of it.
pub struct BuildTaskContext<'a> {
    /// A fresh, empty directory the task writes its outputs into.
    pub output_dir: &'a Utf8Path,
    /// The root of the input tree the task reads from.
    pub source_dir: &'a Utf8Path,
}

/// Produced exactly once per task per build, after it has either executed or
/// been skipped as a cache hit. Consumed by downstream tasks' `signature`
/// computation.
#[derive(Clone, Debug)]
pub struct BuildTaskResult {
    pub task_name: String,
    pub signature: String,
    /// The done-store path holding this task's complete output set.
    pub output_dir: Utf8PathBuf,
    pub dependency_results: Vec<Arc<BuildTaskResult>>,
}

/// A named unit of work in the build DAG.
///
/// Task identity for graph memoisation and signature ownership is reference
/// identity (see [`TaskKey`]), not structural equality: two tasks with
/// identical fields are still distinct tasks unless they are the same `Arc`.
pub trait BuildTask: Send + Sync {
    /// A human-readable name, used in error messages and logging. Need not
    /// be unique, though distinct tasks that collide on both name and
    /// signature produce a less useful error message.
    fn name(&self) -> String;

    /// The tasks that must complete before this one can run. Order is
    /// preserved into [`BuildTaskResult::dependency_results`].
    fn dependencies(&self) -> &[Arc<dyn BuildTask>];

    /// Derives this task's signature from its own parameters, its source
    /// inputs, and the already-computed signatures of its dependencies
    /// (available via `dependency_results`).
    ///
    /// `source_dir` is the same absolute input root passed to `execute` via
    /// [`BuildTaskContext`]; a task reads whatever source files it declares
    /// relative to it to fold their bytes into the signature.
    ///
    /// Must be deterministic and stable across processes and hosts for
    /// identical inputs, and must depend on every byte of every source file
    /// consumed, on the signatures of all upstream tasks, and on any
    /// algorithm-identifying constants the task embeds.
    fn signature(
        &self,
        source_dir: &Utf8Path,
        dependency_results: &[Arc<BuildTaskResult>],
    ) -> anyhow::Result<String>;

    /// Writes this task's outputs into `context.output_dir`. Only called
    /// when there is no existing done directory for this task's signature.
    fn execute(&self, context: &BuildTaskContext) -> anyhow::Result<()>;

    /// Lets [`crate::run_build`]'s upfront duplicate-spec check recognize a
    /// glob-to-ext task without a general-purpose downcast facility.
    /// Hand-rolled [`BuildTask`] implementations can ignore this.
    fn as_glob_to_ext(&self) -> Option<&crate::tasks::GlobToExtTask> {
        None
    }
}

/// A hashable, `Eq`-comparable key for `Arc<dyn BuildTask>` reference
/// identity, used by the engine's `taskToGraph` and `signatureToTask` maps.
///
/// Two `TaskKey`s compare equal iff they were built from the same
/// allocation, matching the pointer-identity memoisation strategy described
/// for shared tasks reachable via multiple paths.
#[derive(Clone, Copy, Debug)]
pub struct TaskKey(*const ());

// SAFETY: a `TaskKey` is only ever used as an opaque map key; the raw
// pointer is never dereferenced, only compared for identity. The `Arc` it
// was derived from is kept alive for as long as the key is in use.
unsafe impl Send for TaskKey {}
unsafe impl Sync for TaskKey {}

impl TaskKey {
    pub fn of(task: &Arc<dyn BuildTask>) -> Self {
        TaskKey(Arc::as_ptr(task) as *const ())
    }
}

impl PartialEq for TaskKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for TaskKey {}

impl std::hash::Hash for TaskKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
