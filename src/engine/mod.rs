//! The ISOD execution engine: owns a build execution context, turns a
//! collection of tasks into a [`crate::graph::TaskGraph`], runs it, and
//! validates and assembles the result.

mod assemble;
mod construct;
pub(crate) mod context;
mod step;
mod validate;

use std::sync::Arc;

use camino::Utf8Path;
use tracing::{Level, info, span};

use crate::error::IsodError;
use crate::task::BuildTask;
use context::BuildExecutionContext;

/// Runs `tasks` to completion against `source_dir`, publishing their outputs
/// under `meta_dir`'s content-addressed cache and overlaying the result into
/// `build_dir`.
///
/// See the crate-level docs for the five phases this drives: context
/// creation, graph construction, execution, validation, and assembly.
pub fn execute(
    source_dir: impl AsRef<Utf8Path>,
    build_dir: impl AsRef<Utf8Path>,
    meta_dir: impl AsRef<Utf8Path>,
    tasks: &[Arc<dyn BuildTask>],
) -> Result<(), IsodError> {
    let root_span = span!(Level::INFO, "execute");
    let _enter = root_span.enter();

    let context = Arc::new(BuildExecutionContext::new(
        source_dir.as_ref().to_path_buf(),
        build_dir.as_ref().to_path_buf(),
        meta_dir.as_ref().to_path_buf(),
    )?);

    let mut graph = crate::graph::TaskGraph::new();
    let root = {
        let _enter = span!(Level::DEBUG, "construct").entered();
        construct::build_graph(&context, &mut graph, tasks)?
    };

    {
        let run_span = span!(Level::INFO, "run");
        #[cfg(feature = "progress")]
        {
            use tracing_indicatif::span_ext::IndicatifSpanExt;
            run_span.pb_set_length(graph.reachable_count(root) as u64);
            run_span.pb_set_style(&progress_style());
            run_span.pb_set_message("running tasks");
        }
        let _enter = run_span.enter();

        if let Err(err) = graph.run_with_progress(root, progress_tick(&run_span)) {
            return Err(match err.downcast::<IsodError>() {
                Ok(isod_err) => isod_err,
                Err(other) => IsodError::TaskExecutionFailed {
                    name: "<task graph>".to_string(),
                    source: other,
                },
            });
        }
    }

    {
        let _enter = span!(Level::DEBUG, "validate").entered();
        validate::check_for_output_collisions(&context)?;
    }

    {
        let _enter = span!(Level::INFO, "assemble").entered();
        assemble::assemble(&context)?;
    }

    info!("build complete");
    Ok(())
}

#[cfg(feature = "progress")]
fn progress_style() -> indicatif::ProgressStyle {
    indicatif::ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} tasks {msg}")
        .unwrap()
        .progress_chars("=>-")
}

/// Advances `span`'s progress bar once per settled graph node. A no-op
/// closure when the `progress` feature is off.
#[cfg(feature = "progress")]
fn progress_tick(span: &tracing::Span) -> impl FnMut(usize, usize) {
    use tracing_indicatif::span_ext::IndicatifSpanExt;
    let span = span.clone();
    move |_settled, _total| span.pb_inc(1)
}

#[cfg(not(feature = "progress"))]
fn progress_tick(_span: &tracing::Span) -> impl FnMut(usize, usize) {
    move |_settled, _total| {}
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;
    use std::time::Duration;

    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    use super::*;
    use crate::task::{BuildTaskContext, BuildTaskResult};
    use crate::tasks;

    fn write_tree(root: &Utf8Path, files: &[(&str, &str)]) {
        for (relative, contents) in files {
            let path = root.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
    }

    fn read_tree(root: &Utf8Path) -> Vec<(Utf8PathBuf, String)> {
        let mut out = crate::utils::list_files_relative(root)
            .unwrap()
            .into_iter()
            .map(|relative| {
                let contents = std::fs::read_to_string(root.join(&relative)).unwrap();
                (relative, contents)
            })
            .collect::<Vec<_>>();
        out.sort();
        out
    }

    fn trim_task(source_dir: &str, output_dir: &str, output_ext: &str) -> Arc<dyn BuildTask> {
        let suffix = output_ext.to_string();
        tasks::build(
            move |ctx| {
                for relative in ctx.sources {
                    let contents = std::fs::read_to_string(ctx.source_dir.join(relative))?;
                    let output_relative = relative
                        .as_str()
                        .strip_suffix(".txt")
                        .map(|stem| format!("{stem}{suffix}"))
                        .unwrap();
                    let output = ctx.output_dir.join(output_relative);
                    std::fs::create_dir_all(output.parent().unwrap())?;
                    std::fs::write(output, contents.trim())?;
                }
                Ok(())
            },
            source_dir,
            ".txt",
            output_dir,
            output_ext,
        )
    }

    struct Fixture {
        _root: TempDir,
        source_dir: Utf8PathBuf,
        build_dir: Utf8PathBuf,
        meta_dir: Utf8PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let base = Utf8PathBuf::try_from(root.path().to_path_buf()).unwrap();
            Fixture {
                source_dir: base.join("src"),
                build_dir: base.join("build"),
                meta_dir: base.join(".bud"),
                _root: root,
            }
        }

        fn run(&self, tasks: &[Arc<dyn BuildTask>]) -> Result<(), IsodError> {
            std::fs::create_dir_all(&self.source_dir).ok();
            execute(&self.source_dir, &self.build_dir, &self.meta_dir, tasks)
        }
    }

    #[test]
    fn trims_whitespace_into_build_dir() {
        let fx = Fixture::new();
        write_tree(
            &fx.source_dir,
            &[("foo.txt", "  foo  "), ("subdir/bar.txt", "  bar  ")],
        );

        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        assert_eq!(
            read_tree(&fx.build_dir),
            vec![
                (Utf8PathBuf::from("foo.nospace"), "foo".to_string()),
                (Utf8PathBuf::from("subdir/bar.nospace"), "bar".to_string()),
            ]
        );
    }

    // Cache hit skips execute entirely, so the output's mtime is untouched.
    #[test]
    fn rerun_with_unchanged_source_does_not_touch_output_mtime() {
        let fx = Fixture::new();
        write_tree(&fx.source_dir, &[("foo.txt", "  foo  ")]);
        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        let output = fx.build_dir.join("foo.nospace");
        let before = std::fs::metadata(&output).unwrap().modified().unwrap();

        sleep(Duration::from_millis(10));
        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        let after = std::fs::metadata(&output).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn source_change_is_reflected_in_rebuild() {
        let fx = Fixture::new();
        write_tree(&fx.source_dir, &[("foo.txt", "  foo  ")]);
        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        write_tree(&fx.source_dir, &[("foo.txt", "  foo2  ")]);
        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        assert_eq!(
            std::fs::read_to_string(fx.build_dir.join("foo.nospace")).unwrap(),
            "foo2"
        );
    }

    #[test]
    fn deleted_source_is_removed_from_output() {
        let fx = Fixture::new();
        write_tree(
            &fx.source_dir,
            &[("foo.txt", "  foo  "), ("subdir/bar.txt", "  bar  ")],
        );
        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        std::fs::remove_file(fx.source_dir.join("foo.txt")).unwrap();
        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        assert!(!fx.build_dir.join("foo.nospace").exists());
        assert!(fx.build_dir.join("subdir/bar.nospace").exists());
    }

    // Reverting a source to a prior value reuses that signature's
    // already-cached done directory rather than re-executing.
    #[test]
    fn reverting_source_reuses_prior_cache_entry() {
        let fx = Fixture::new();
        write_tree(&fx.source_dir, &[("foo.txt", "  foo  ")]);
        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        write_tree(&fx.source_dir, &[("foo.txt", "  foo2  ")]);
        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        write_tree(&fx.source_dir, &[("foo.txt", "  foo  ")]);
        fx.run(&[trim_task(".", ".", ".nospace")]).unwrap();

        assert_eq!(
            std::fs::read_to_string(fx.build_dir.join("foo.nospace")).unwrap(),
            "foo"
        );
    }

    #[test]
    fn disjoint_output_extensions_coexist() {
        let fx = Fixture::new();
        write_tree(&fx.source_dir, &[("foo.txt", "  foo  ")]);

        fx.run(&[trim_task(".", ".", ".nospace1"), trim_task(".", ".", ".nospace2")])
            .unwrap();

        assert!(fx.build_dir.join("foo.nospace1").exists());
        assert!(fx.build_dir.join("foo.nospace2").exists());
    }

    // A hand-rolled task that always writes a single fixed file, used to
    // exercise the output-collision check independently of the glob-to-ext
    // naming rule.
    struct WriteFixedFile {
        name: String,
        contents: &'static str,
    }

    impl BuildTask for WriteFixedFile {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn dependencies(&self) -> &[Arc<dyn BuildTask>] {
            &[]
        }

        fn signature(
            &self,
            _source_dir: &Utf8Path,
            _dependency_results: &[Arc<BuildTaskResult>],
        ) -> anyhow::Result<String> {
            Ok(self.name.clone())
        }

        fn execute(&self, context: &BuildTaskContext) -> anyhow::Result<()> {
            std::fs::write(context.output_dir.join("out.txt"), self.contents)?;
            Ok(())
        }
    }

    // Two distinct tasks that both publish "out.txt" are rejected, even
    // though neither one individually would be.
    #[test]
    fn output_collision_is_rejected() {
        let fx = Fixture::new();

        let a: Arc<dyn BuildTask> = Arc::new(WriteFixedFile {
            name: "task-a".to_string(),
            contents: "a",
        });
        let b: Arc<dyn BuildTask> = Arc::new(WriteFixedFile {
            name: "task-b".to_string(),
            contents: "b",
        });

        let err = fx.run(&[a, b]).unwrap_err();
        assert!(matches!(err, IsodError::OutputCollision { .. }));
    }
}
