//! Turns benchd worker logs into plot-ready metric series.
//!
//! Every input is aggregated on its own task and emitted to stdout as one JSON
//! report per line, in argument order. Logs go to stderr.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

mod config;
mod input;

use std::{
    fs::OpenOptions,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use benchd_telemetry::{Config, Report, cache};
use clap::Parser;
use tokio::{
    runtime::{Builder, Runtime},
    task::JoinSet,
};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

use crate::input::{Analysis, Source};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// path on disk to a YAML configuration file
    #[clap(long)]
    config_path: Option<PathBuf>,

    /// append the bucketed send rates of every raw log to this cache file
    #[clap(long)]
    cache_out: Option<PathBuf>,

    #[clap(flatten)]
    overrides: config::Overrides,

    /// worker logs, or cache files with --use-cache. Reads stdin when empty.
    paths: Vec<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Telemetry(#[from] benchd_telemetry::Error),
    #[error("Failed to deserialize benchd config: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    #[error("Failed to serialize report: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Malformed environment variable {var}={value:?}")]
    Env { var: &'static str, value: String },
    #[error("Analysis task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

async fn analyze_all(sources: Vec<Source>, config: &Config) -> Result<Vec<Analysis>, Error> {
    let mut tasks = JoinSet::new();
    for (position, source) in sources.into_iter().enumerate() {
        let config = config.clone();
        tasks.spawn(async move { (position, input::analyze(source, &config).await) });
    }

    let mut analyses = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let (position, analysis) = joined?;
        match analysis {
            Ok(analysis) => analyses.push((position, analysis)),
            Err(err) => {
                error!("Failed to analyze input {position}: {err}");
                return Err(err);
            }
        }
    }
    analyses.sort_by_key(|(position, _)| *position);
    Ok(analyses.into_iter().map(|(_, analysis)| analysis).collect())
}

async fn run<F, W>(args: Args, lookup: F, mut out: W) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
    W: Write,
{
    let config = config::resolve(args.config_path.as_deref(), args.overrides, lookup)?;

    let sources = if args.paths.is_empty() {
        vec![Source::Stdin]
    } else {
        args.paths.into_iter().map(Source::File).collect()
    };
    let analyses = analyze_all(sources, &config).await?;

    let mut cache_out = match args.cache_out {
        Some(path) if !config.use_cache => {
            debug!("Appending cache records to {}", path.display());
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(BufWriter::new(file))
        }
        Some(_) => {
            info!("Inputs are cache records, not writing a cache");
            None
        }
        None => None,
    };

    for analysis in analyses {
        let report = Report::build(&analysis.series, &config, analysis.first_error_offset);
        if report.is_empty() {
            info!(source = %analysis.source, "No worker events found");
        }
        serde_json::to_writer(&mut out, &report)?;
        writeln!(out)?;
        if let Some(writer) = cache_out.as_mut() {
            cache::dump(&analysis.series, writer).map_err(benchd_telemetry::Error::from)?;
        }
    }
    out.flush()?;
    Ok(())
}

// File and stdin reads run on the blocking pool, no I/O driver is needed.
fn runtime() -> Result<Runtime, Error> {
    Ok(Builder::new_multi_thread().build()?)
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .with_writer(io::stderr)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting benchtool {version} run.");
    let args = Args::parse();

    let runtime = runtime()?;
    let res = runtime.block_on(run(args, |var| std::env::var(var).ok(), io::stdout().lock()));
    info!("Bye. :)");
    res
}
