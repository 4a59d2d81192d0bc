#![deny(
    // clippy::unwrap_used,
    // clippy::expect_used,
    clippy::panic,
)]

//! Isolated Signed Output Directories: a small incremental build engine.
//!
//! Each [`task::BuildTask`] is keyed by a cryptographic signature of its own
//! parameters, its source inputs, and its upstream tasks' signatures. A
//! task's output lives in its own directory named after that signature:
//! `.done/<signature>` once complete, `.partial/<signature>` while running.
//! Two tasks never contend for the same output location, and a cache hit
//! is just "does `.done/<signature>` already exist".
//!
//! [`engine::execute`] drives one build: it turns a set of requested tasks
//! into a [`graph::TaskGraph`], runs it on a `rayon` worker pool, checks that
//! no two tasks published overlapping output paths, then overlays every
//! referenced done directory into the build directory. [`run_build`] is the
//! higher-level entry point most callers want; [`tasks::build`] is a factory
//! for the common case of transforming a tree of `sourceExt` files into
//! `outputExt` siblings.

pub mod encoding;
pub mod engine;
pub mod error;
pub mod graph;
pub mod hash;
pub mod task;
pub mod tasks;
mod utils;

pub use camino;

use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use tracing::info;

pub use error::IsodError;
pub use task::{BuildTask, BuildTaskContext, BuildTaskResult};
pub use tasks::{GlobToExtContext, build};

/// Drives a build of `tasks` against `base_dir`, writing into
/// `base_dir/build` and caching under `meta_dir` (default
/// `base_dir/.bud`).
///
/// This is the entry point most callers use. See [`run_build_with_dirs`] if
/// the build directory itself also needs to be overridden (the CLI launcher
/// uses it for this reason).
pub fn run_build(
    tasks: &[Arc<dyn BuildTask>],
    stdout: &mut impl Write,
    base_dir: impl Into<Utf8PathBuf>,
    meta_dir: Option<Utf8PathBuf>,
) -> Result<(), IsodError> {
    let base_dir = base_dir.into();
    let build_dir = base_dir.join("build");
    run_build_with_dirs(tasks, stdout, base_dir, build_dir, meta_dir)
}

/// As [`run_build`], but with the build directory also overridable rather
/// than fixed at `base_dir/build`.
///
/// Adds the upfront duplicate-glob-to-ext-spec check ahead of
/// [`engine::execute`], then reports the outcome to `stdout`.
pub fn run_build_with_dirs(
    tasks: &[Arc<dyn BuildTask>],
    stdout: &mut impl Write,
    base_dir: impl Into<Utf8PathBuf>,
    build_dir: impl Into<Utf8PathBuf>,
    meta_dir: Option<Utf8PathBuf>,
) -> Result<(), IsodError> {
    check_for_duplicate_glob_specs(tasks)?;

    let base_dir = base_dir.into();
    let build_dir = build_dir.into();
    let meta_dir = meta_dir.unwrap_or_else(|| base_dir.join(".bud"));

    engine::execute(&base_dir, &build_dir, &meta_dir, tasks)?;

    writeln!(stdout, "build complete: {build_dir}").ok();
    info!(%build_dir, "build complete");
    Ok(())
}

/// The friendlier, earlier-surfacing sibling of the engine's generic
/// signature-collision check: pairwise-compares every glob-to-ext task's
/// `(sourceDir, sourceExt, outputDir, outputExt)` tuple before any task runs,
/// so two tasks with identical parameters are named directly instead of by a
/// raw signature.
fn check_for_duplicate_glob_specs(tasks: &[Arc<dyn BuildTask>]) -> Result<(), IsodError> {
    let glob_tasks: Vec<_> = tasks.iter().filter_map(|t| t.as_glob_to_ext()).collect();

    for i in 0..glob_tasks.len() {
        for j in (i + 1)..glob_tasks.len() {
            if glob_tasks[i].spec_tuple() == glob_tasks[j].spec_tuple() {
                return Err(IsodError::DuplicateTaskSpec {
                    a: glob_tasks[i].name(),
                    b: glob_tasks[j].name(),
                });
            }
        }
    }

    Ok(())
}
