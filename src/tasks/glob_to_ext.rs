//! The glob-to-ext task: the high-level `Build` factory for the common case
//! of transforming every file under a source tree that carries one extension
//! into a sibling file carrying another.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::hash::Signature;
use crate::task::{BuildTask, BuildTaskContext, BuildTaskResult};

const TASK_CLASS_VERSION: &str = "glob-to-ext/v1";

const GLOB_OPTS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Context handed to a glob-to-ext task's `command`.
pub struct GlobToExtContext<'a> {
    /// The root of the source tree, relative to the build's source directory.
    pub source_dir: &'a Utf8Path,
    /// The fresh directory the command must write its outputs into.
    pub output_dir: &'a Utf8Path,
    /// The extension outputs carry, e.g. `.nospace`.
    pub output_ext: &'a str,
    /// Every matched source file, as paths relative to `source_dir`, sorted.
    pub sources: &'a [Utf8PathBuf],
}

type CommandFn = dyn Fn(&GlobToExtContext) -> anyhow::Result<()> + Send + Sync;

/// A task that maps every `sourceExt` file under `sourceDir` to an
/// `outputExt` file of the same relative path under `outputDir`.
pub struct GlobToExtTask {
    name: String,
    command: Arc<CommandFn>,
    source_dir: Utf8PathBuf,
    source_ext: String,
    output_dir: Utf8PathBuf,
    output_ext: String,
    sources_override: Option<Vec<Utf8PathBuf>>,
    dependencies: Vec<Arc<dyn BuildTask>>,
}

impl GlobToExtTask {
    /// `(sourceDir, sourceExt, outputDir, outputExt)`, used by the upfront
    /// duplicate-spec check to detect two glob-to-ext tasks with identical
    /// parameters before they ever reach the engine.
    pub fn spec_tuple(&self) -> (&Utf8Path, &str, &Utf8Path, &str) {
        (
            &self.source_dir,
            &self.source_ext,
            &self.output_dir,
            &self.output_ext,
        )
    }

    fn resolve_sources(&self, source_dir: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>> {
        if let Some(overridden) = &self.sources_override {
            let mut sorted = overridden.clone();
            sorted.sort_by(|a, b| normalized(a).cmp(&normalized(b)));
            return Ok(sorted);
        }

        let root = join_relative(source_dir, &self.source_dir);
        let pattern = format!("{root}/**/*{}", self.source_ext);

        let mut relative = Vec::new();
        for entry in glob::glob_with(&pattern, GLOB_OPTS)? {
            let absolute = Utf8PathBuf::try_from(entry?)?;
            if !absolute.as_str().ends_with(self.source_ext.as_str()) {
                continue;
            }
            relative.push(
                absolute
                    .strip_prefix(&root)
                    .unwrap_or(&absolute)
                    .to_path_buf(),
            );
        }

        relative.sort_by(|a, b| normalized(a).cmp(&normalized(b)));
        Ok(relative)
    }

    /// The output's path, relative to the task's own `output_dir` (i.e. the
    /// `R-with-extension-replaced-by-outputExt` half of the naming rule).
    fn output_relative_for(&self, source_relative: &Utf8Path) -> Utf8PathBuf {
        let replaced = source_relative
            .as_str()
            .strip_suffix(self.source_ext.as_str())
            .map(|stem| format!("{stem}{}", self.output_ext))
            .unwrap_or_else(|| format!("{source_relative}{}", self.output_ext));
        Utf8PathBuf::from(replaced)
    }
}

fn normalized(path: &Utf8Path) -> String {
    path.as_str().replace('\\', "/")
}

/// Joins `base` with `relative`, collapsing a literal `.` `relative` to
/// `base` itself rather than leaving a trailing `.` component. The `glob`
/// crate matches path components literally, so a pattern built on
/// `base/.` would never match anything on disk.
fn join_relative(base: &Utf8Path, relative: &Utf8Path) -> Utf8PathBuf {
    if relative.as_str() == "." {
        base.to_path_buf()
    } else {
        base.join(relative)
    }
}

impl BuildTask for GlobToExtTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn dependencies(&self) -> &[Arc<dyn BuildTask>] {
        &self.dependencies
    }

    fn signature(
        &self,
        source_dir: &Utf8Path,
        dependency_results: &[Arc<BuildTaskResult>],
    ) -> anyhow::Result<String> {
        let sources = self.resolve_sources(source_dir)?;
        let root = join_relative(source_dir, &self.source_dir);

        let mut signature = Signature::new();
        signature
            .update(TASK_CLASS_VERSION)
            .update(self.source_dir.as_str())
            .update(self.source_ext.as_str())
            .update(self.output_dir.as_str())
            .update(self.output_ext.as_str());

        for dep in dependency_results {
            signature.update(&dep.signature);
        }

        for relative in &sources {
            signature.update(normalized(relative));
            signature.update_file(&root.join(relative))?;
        }

        Ok(signature.finish())
    }

    fn as_glob_to_ext(&self) -> Option<&GlobToExtTask> {
        Some(self)
    }

    fn execute(&self, context: &BuildTaskContext) -> anyhow::Result<()> {
        let sources = self.resolve_sources(context.source_dir)?;
        let source_root = join_relative(context.source_dir, &self.source_dir);
        let output_root = join_relative(context.output_dir, &self.output_dir);

        std::fs::create_dir_all(&output_root)?;

        let task_context = GlobToExtContext {
            source_dir: &source_root,
            output_dir: &output_root,
            output_ext: &self.output_ext,
            sources: &sources,
        };

        (self.command)(&task_context)?;

        for relative in &sources {
            let output = output_root.join(self.output_relative_for(relative));
            if !output.exists() {
                anyhow::bail!(
                    "command for '{}' did not write expected output '{}'",
                    self.name(),
                    output
                );
            }
        }

        Ok(())
    }
}

/// Builds a [`GlobToExtTask`]: transforms every `source_ext` file under
/// `source_dir` into a sibling `output_ext` file under `output_dir`.
///
/// `command` receives a [`GlobToExtContext`] and is responsible for writing
/// one output file per source, per the naming rule described on
/// [`GlobToExtTask`].
pub fn build(
    command: impl Fn(&GlobToExtContext) -> anyhow::Result<()> + Send + Sync + 'static,
    source_dir: impl Into<Utf8PathBuf>,
    source_ext: impl Into<String>,
    output_dir: impl Into<Utf8PathBuf>,
    output_ext: impl Into<String>,
) -> Arc<dyn BuildTask> {
    build_with(
        command,
        source_dir,
        source_ext,
        output_dir,
        output_ext,
        None,
        Vec::new(),
    )
}

/// As [`build`], but with an explicit `sources` list overriding the default
/// glob discovery, and explicit upstream dependencies.
pub fn build_with(
    command: impl Fn(&GlobToExtContext) -> anyhow::Result<()> + Send + Sync + 'static,
    source_dir: impl Into<Utf8PathBuf>,
    source_ext: impl Into<String>,
    output_dir: impl Into<Utf8PathBuf>,
    output_ext: impl Into<String>,
    sources: Option<Vec<Utf8PathBuf>>,
    dependencies: Vec<Arc<dyn BuildTask>>,
) -> Arc<dyn BuildTask> {
    let source_dir = source_dir.into();
    let source_ext = source_ext.into();
    let output_dir = output_dir.into();
    let output_ext = output_ext.into();

    let name = format!(
        "{source_dir}/**/*{source_ext} -> {output_dir}/**/*{output_ext}"
    );

    Arc::new(GlobToExtTask {
        name,
        command: Arc::new(command),
        source_dir,
        source_ext,
        output_dir,
        output_ext,
        sources_override: sources,
        dependencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_replaces_literal_suffix_not_whole_extension() {
        let task = GlobToExtTask {
            name: String::new(),
            command: Arc::new(|_| Ok(())),
            source_dir: Utf8PathBuf::from("src"),
            source_ext: ".txt".to_string(),
            output_dir: Utf8PathBuf::from("out"),
            output_ext: ".txt.nospace".to_string(),
            sources_override: None,
            dependencies: Vec::new(),
        };

        let output = task.output_relative_for(Utf8Path::new("a/b.txt"));
        assert_eq!(output, Utf8PathBuf::from("a/b.txt.nospace"));
    }

    #[test]
    fn display_name_matches_documented_format() {
        let task = build(|_| Ok(()), "src", ".txt", "out", ".nospace");
        assert_eq!(task.name(), "src/**/*.txt -> out/**/*.nospace");
    }
}
