mod cli;
mod config;
mod console;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use trawler_engine::{CrawlReport, Crawler, FileStore, ReqwestFetcher, StoreSink};
use trawler_logging::{trawl_info, trawl_warn};

use cli::{Cli, Command, CrawlArgs, StoredArgs};
use config::Config;
use console::{utc_clock, ConsoleSink};

/// Both catalogs crawled to the end.
const EXIT_COMPLETE: i32 = 0;
/// A catalog failed or the run was interrupted.
const EXIT_INCOMPLETE: i32 = 1;
/// Bad configuration or an internal error.
const EXIT_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    trawler_logging::initialize(cli.log_to, cli.log_level.into(), cli.log_file.as_deref());

    let exit_code = match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            EXIT_ERROR
        }
    };
    std::process::exit(exit_code);
}

async fn run(command: Command) -> Result<i32> {
    match command {
        Command::Crawl(args) => crawl(args).await,
        Command::Stored(args) => stored(args),
    }
}

async fn crawl(args: CrawlArgs) -> Result<i32> {
    let config = Config::resolve(&args)?;
    let settings = config.crawl_settings()?;
    let fetcher = ReqwestFetcher::new(config.fetch_settings()).context("building HTTP client")?;

    let store = match &config.output_dir {
        Some(dir) => Some(StoreSink::new(
            FileStore::open(dir, utc_clock())
                .with_context(|| format!("opening output directory {}", dir.display()))?,
        )),
        None => None,
    };
    let sink = ConsoleSink::new(!args.quiet, store);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trawl_warn!("interrupt received, cancelling crawl");
            interrupt.cancel();
        }
    });

    let report = Crawler::new(settings, Arc::new(fetcher))
        .run(&sink, cancel)
        .await;
    sink.finish().await;
    print_summary(&report, sink.write_failures());

    Ok(if report.is_complete() {
        EXIT_COMPLETE
    } else {
        EXIT_INCOMPLETE
    })
}

fn print_summary(report: &CrawlReport, write_failures: u64) {
    let summary = &report.summary;
    eprintln!(
        "projects: {} ({:?}), users: {} ({:?}), pairs: {}, duplicates ignored: {}",
        summary.projects_seen,
        summary.projects,
        summary.users_seen,
        summary.users,
        summary.pairs_emitted,
        summary.duplicates_ignored
    );
    for failure in &report.failures {
        eprintln!("failed: {failure}");
    }
    if report.was_cancelled() {
        eprintln!("crawl was cancelled before both catalogs finished");
    }
    if write_failures > 0 {
        eprintln!("{write_failures} records could not be stored, see the log");
    }
}

fn stored(args: StoredArgs) -> Result<i32> {
    if !args.output_dir.is_dir() {
        bail!("{} is not a directory", args.output_dir.display());
    }
    let store = FileStore::open(&args.output_dir, utc_clock())?;
    let mut out = io::stdout().lock();

    match args.catalog.catalog() {
        Some(tag) => {
            let ids = store.ids(tag)?;
            trawl_info!("{} stored {} ids", tag, ids.len());
            for id in ids {
                writeln!(out, "{id}")?;
            }
        }
        None => {
            for pair in store.pairs()? {
                writeln!(out, "{}", serde_json::to_string(&pair)?)?;
            }
        }
    }
    Ok(EXIT_COMPLETE)
}
