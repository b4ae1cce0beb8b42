use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use trawler_core::CatalogTag;
use trawler_logging::LogDestination;

#[derive(Parser, Debug)]
#[command(
    name = "trawler",
    version,
    about = "Crawls the projects and users catalogs and streams every (project, user) pair"
)]
pub struct Cli {
    /// Where log output goes: terminal, file or both.
    #[arg(long, global = true, default_value = "terminal")]
    pub log_to: LogDestination,

    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log file used with `--log-to file|both`.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl both catalogs and print each pair as a JSON line.
    Crawl(CrawlArgs),
    /// List what an earlier crawl stored in an output directory.
    Stored(StoredArgs),
}

/// Flags override values from the configuration file.
#[derive(Args, Debug, Default, Clone)]
pub struct CrawlArgs {
    /// RON configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// API root shared by both catalogs.
    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long)]
    pub projects_url: Option<String>,

    #[arg(long)]
    pub users_url: Option<String>,

    /// Page size for both catalogs.
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Concurrent HTTP requests.
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Attempts per catalog before it is reported as failed.
    #[arg(long)]
    pub attempts: Option<u32>,

    #[arg(long)]
    pub fetch_timeout_secs: Option<u64>,

    /// Persist items and pairs under this directory.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Do not print pairs to stdout.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct StoredArgs {
    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = StoredKind::Pairs)]
    pub catalog: StoredKind,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredKind {
    Projects,
    Users,
    Pairs,
}

impl StoredKind {
    pub fn catalog(self) -> Option<CatalogTag> {
        match self {
            StoredKind::Projects => Some(CatalogTag::Projects),
            StoredKind::Users => Some(CatalogTag::Users),
            StoredKind::Pairs => None,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn crawl_flags_are_parsed() {
        let cli = Cli::try_parse_from([
            "trawler",
            "--log-level",
            "debug",
            "crawl",
            "--workers",
            "8",
            "--page-size",
            "50",
            "--quiet",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_to, LogDestination::Terminal);
        let Command::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };
        assert_eq!(args.workers, Some(8));
        assert_eq!(args.page_size, Some(50));
        assert!(args.quiet);
        assert!(args.config.is_none());
    }

    #[test]
    fn stored_defaults_to_pairs() {
        let cli = Cli::try_parse_from(["trawler", "stored", "--output-dir", "out"]).unwrap();
        let Command::Stored(args) = cli.command else {
            panic!("expected stored");
        };
        assert_eq!(args.catalog, StoredKind::Pairs);
        assert_eq!(args.catalog.catalog(), None);
    }

    #[test]
    fn unknown_log_destination_is_rejected() {
        assert!(Cli::try_parse_from(["trawler", "--log-to", "syslog", "crawl"]).is_err());
    }
}
