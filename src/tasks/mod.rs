//! High-level, ready-made task builders on top of the core [`crate::task`]
//! API. Currently just the glob-to-ext task; task authors are free to
//! implement [`crate::task::BuildTask`] directly for anything this doesn't
//! cover.

mod glob_to_ext;

pub use glob_to_ext::{GlobToExtContext, GlobToExtTask, build, build_with};
