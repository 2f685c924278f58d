use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use console::style;

use assetpipe::{Config, Pipeline, pipeline};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Task {
    Css,
    Js,
    Watch,
    Default,
}

impl Task {
    fn name(self) -> &'static str {
        match self {
            Task::Css => pipeline::CSS,
            Task::Js => pipeline::JS,
            Task::Watch => pipeline::WATCH,
            Task::Default => pipeline::DEFAULT,
        }
    }
}

/// Builds the stylesheet and script assets.
#[derive(Parser, Debug, Clone)]
#[command(version)]
struct Args {
    /// Task to run, together with its dependencies.
    #[clap(value_enum, index = 1, default_value = "default")]
    task: Task,

    /// Project root that relative paths are resolved against.
    #[clap(long)]
    root: Option<Utf8PathBuf>,

    /// TOML configuration file.
    #[clap(long)]
    config: Option<Utf8PathBuf>,

    /// Print the task graph as a Mermaid diagram and exit.
    #[clap(long)]
    graph: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    assetpipe::logging::init_logging()?;

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(root) = args.root {
        config.root = root;
    }

    let pipeline = Pipeline::new(config)?;

    if args.graph {
        print!("{}", pipeline.graph());
        return Ok(());
    }

    eprintln!(
        "Running {} task {}.",
        style("assetpipe").red(),
        style(args.task.name()).blue()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("couldn't start the async runtime")?;

    runtime.block_on(run(&pipeline, args.task.name(), tokio::signal::ctrl_c()))
}

/// Runs `task` until it finishes or `shutdown` resolves. An interrupted run
/// counts as a success; a failed one is returned so the process exits non-zero.
async fn run(
    pipeline: &Pipeline,
    task: &str,
    shutdown: impl Future<Output = std::io::Result<()>>,
) -> anyhow::Result<()> {
    tokio::select! {
        biased;

        signal = shutdown => {
            signal.context("couldn't listen for Ctrl-C")?;
            tracing::info!("interrupted");
        }
        result = pipeline.run(task) => {
            let diagnostics = result?;
            tracing::debug!("\n{}", diagnostics.render_mermaid(pipeline.graph()));
        }
    }

    Ok(())
}
