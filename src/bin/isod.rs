use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use console::Style;
use isod::{BuildTask, build};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const ANSI_GREEN: Style = Style::new().green();
const ANSI_RED: Style = Style::new().red();

/// Drives a build of the worked-example task set against a source tree.
#[derive(Parser)]
#[clap(version, author)]
struct Opts {
    /// Root of the input tree. Defaults to the current directory.
    #[clap(long)]
    source_dir: Option<Utf8PathBuf>,

    /// Where the assembled output tree is written. Defaults to `<source-dir>/build`.
    #[clap(long)]
    build_dir: Option<Utf8PathBuf>,

    /// Where the content-addressed cache lives. Defaults to `<source-dir>/.bud`.
    #[clap(long)]
    meta_dir: Option<Utf8PathBuf>,

    /// Raise log verbosity to debug.
    #[clap(short, long)]
    verbose: bool,

    /// Lower log verbosity to errors only.
    #[clap(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_tracing(opts: &Opts) {
    let default_level = if opts.verbose {
        "debug"
    } else if opts.quiet {
        "error"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    #[cfg(feature = "progress")]
    {
        let indicatif_layer = tracing_indicatif::IndicatifLayer::new();
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
            .with(indicatif_layer)
            .init();
    }

    #[cfg(not(feature = "progress"))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// A small worked example: trims trailing whitespace from every `.txt` file.
fn example_tasks() -> Vec<Arc<dyn BuildTask>> {
    vec![build(
        |ctx| {
            for relative in ctx.sources {
                let contents = std::fs::read_to_string(ctx.source_dir.join(relative))?;
                let trimmed: String = contents
                    .lines()
                    .map(|line| line.trim_end())
                    .collect::<Vec<_>>()
                    .join("\n");

                let output_relative = relative
                    .as_str()
                    .strip_suffix(".txt")
                    .map(|stem| format!("{stem}.trimmed"))
                    .unwrap_or_else(|| format!("{relative}.trimmed"));
                let output = ctx.output_dir.join(output_relative);
                if let Some(parent) = output.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(output, trimmed)?;
            }
            Ok(())
        },
        ".",
        ".txt",
        ".",
        ".trimmed",
    )]
}

fn main() {
    let opts = Opts::parse();
    init_tracing(&opts);

    let source_dir = opts
        .source_dir
        .unwrap_or_else(|| Utf8PathBuf::try_from(std::env::current_dir().unwrap()).unwrap());
    let build_dir = opts.build_dir.unwrap_or_else(|| source_dir.join("build"));
    let meta_dir = opts.meta_dir;

    let tasks = example_tasks();
    let mut stdout = std::io::stdout();

    match isod::run_build_with_dirs(&tasks, &mut stdout, source_dir, build_dir, meta_dir) {
        Ok(()) => {
            eprintln!("{}", ANSI_GREEN.apply_to("build succeeded"));
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("{}: {err}", ANSI_RED.apply_to("build failed"));
            std::process::exit(1);
        }
    }
}
