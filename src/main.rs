use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use traceview::cli::output::{OutputMode, Printer};
use traceview::cli::Args;
use traceview::config::{self, Config};
use traceview::filter::FilterTree;
use traceview::reader::loader::TraceFile;
use traceview::reader::source::TraceSource;
use traceview::reader::LineSource;
use traceview::theme::Palette;
use traceview::watcher::{FileEvent, TraceWatcher};

const FOLLOW_POLL_INTERVAL_MS: u64 = 250;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let palette = Palette::standard();
    let config = match load_config(&args, &palette) {
        Ok(config) => config,
        Err(e) => {
            eprint!("{}", e);
            std::process::exit(1);
        }
    };

    match run(&args, &config, &palette) {
        Err(e) if is_broken_pipe(&e) => Ok(()),
        other => other,
    }
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(args: &Args, palette: &Palette) -> Result<Config, config::ConfigError> {
    if let Some(path) = &args.config {
        return config::load_single_file(&config::expand_path(path), palette);
    }

    let (discovery, searched) = config::discover_verbose();
    debug!(
        searched = searched.len(),
        project = ?discovery.project_config,
        global = ?discovery.global_config,
        "config discovery"
    );
    config::load(&discovery, palette)
}

fn build_tree(args: &Args, config: &Config) -> Result<FilterTree> {
    let mut tree = FilterTree::new();
    let root = tree.root();

    for spec in &config.filters {
        spec.install(&mut tree, root)
            .context("failed to install config filter")?;
    }
    if let Some(spec) = args.filter_spec() {
        spec.install(&mut tree, root)
            .context("invalid command-line filter")?;
    }

    debug!(tree = %tree.describe(), "filters");
    Ok(tree)
}

fn run(args: &Args, config: &Config, palette: &Palette) -> Result<()> {
    let mut tree = build_tree(args, config)?;

    let file = TraceFile::new(&args.file, args.loader_options(config));
    file.load_blocking(None)
        .with_context(|| format!("failed to load {}", args.file.display()))?;

    let mut source = file.source();
    if let Some((format, separator)) = args.format(config) {
        source
            .set_format(format, separator)
            .with_context(|| format!("invalid format {:?}", format))?;
    }

    let mode = if args.count {
        OutputMode::Count
    } else if args.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let stdout = io::stdout();
    let mut printer = Printer::new(stdout.lock(), palette, mode);

    let selection = tree.compute(&source);
    printer.print(&source, selection, 0)?;

    if args.follow {
        follow(&file, &mut source, &mut tree, &mut printer)?;
    }
    Ok(())
}

/// Load and print what gets appended until the process is interrupted.
fn follow<W: Write>(
    file: &TraceFile,
    source: &mut TraceSource,
    tree: &mut FilterTree,
    printer: &mut Printer<'_, W>,
) -> Result<()> {
    let watcher = TraceWatcher::new(file.path())?;
    let mut seen = source.line_count();

    loop {
        match watcher.wait(Duration::from_millis(FOLLOW_POLL_INTERVAL_MS)) {
            None => continue,
            Some(FileEvent::Error(e)) => {
                warn!(error = %e, "file watch error");
                continue;
            }
            Some(FileEvent::Modified) => {}
        }

        let summary = file
            .load_blocking(None)
            .with_context(|| format!("failed to reload {}", file.path().display()))?;
        if !source.refresh() {
            continue;
        }
        debug!(lines = summary.lines, total = source.line_count(), "follow");

        let selection = tree.compute(&*source);
        printer.print(source, selection, seen)?;
        seen = source.line_count();
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
}
