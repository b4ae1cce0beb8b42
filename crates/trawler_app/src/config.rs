//! RON configuration for `trawler crawl`.
//!
//! Every field is optional in the file; missing fields take the defaults
//! below, and command-line flags override both.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trawler_core::CatalogTag;
use trawler_engine::{CatalogSource, CrawlSettings, FetchSettings, PoolSettings, RetryPolicy};
use url::Url;

use crate::cli::CrawlArgs;

pub const DEFAULT_BASE_URL: &str = "https://www.zooniverse.org/api";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("`{field}` must be a positive integer")]
    NotPositive { field: &'static str },
    #[error("`{field}` is not a valid URL ({url}): {message}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        message: String,
    },
    #[error("`retry.sleep_scale` must be at least 1.0, got {0}")]
    InvalidScale(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub base_url: String,
    pub projects_base_url: Option<String>,
    pub users_base_url: Option<String>,
    pub projects_page_size: u32,
    pub users_page_size: u32,
    pub workers: usize,
    pub queue_capacity: usize,
    pub channel_capacity: usize,
    pub fetch_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_page_bytes: u64,
    pub retry: RetryConfig,
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            projects_base_url: None,
            users_base_url: None,
            projects_page_size: 200,
            users_page_size: 200,
            workers: 4,
            queue_capacity: 16,
            channel_capacity: 256,
            fetch_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_page_bytes: 8 * 1024 * 1024,
            retry: RetryConfig::default(),
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub attempts: u32,
    pub sleep_ms: u64,
    pub sleep_scale: f64,
    pub max_sleep_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            sleep_ms: 500,
            sleep_scale: 1.5,
            max_sleep_ms: 300_000,
            jitter_ms: 0,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Loads `args.config` if given, applies the flags and validates.
    pub fn resolve(args: &CrawlArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, args: &CrawlArgs) {
        if let Some(base_url) = &args.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(url) = &args.projects_url {
            self.projects_base_url = Some(url.clone());
        }
        if let Some(url) = &args.users_url {
            self.users_base_url = Some(url.clone());
        }
        if let Some(page_size) = args.page_size {
            self.projects_page_size = page_size;
            self.users_page_size = page_size;
        }
        if let Some(workers) = args.workers {
            self.workers = workers;
        }
        if let Some(queue_capacity) = args.queue_capacity {
            self.queue_capacity = queue_capacity;
        }
        if let Some(attempts) = args.attempts {
            self.retry.attempts = attempts;
        }
        if let Some(secs) = args.fetch_timeout_secs {
            self.fetch_timeout_secs = secs;
        }
        if let Some(dir) = &args.output_dir {
            self.output_dir = Some(dir.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("projects_page_size", u64::from(self.projects_page_size)),
            ("users_page_size", u64::from(self.users_page_size)),
            ("workers", self.workers as u64),
            ("queue_capacity", self.queue_capacity as u64),
            ("channel_capacity", self.channel_capacity as u64),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("max_page_bytes", self.max_page_bytes),
            ("retry.attempts", u64::from(self.retry.attempts)),
        ];
        if let Some((field, _)) = counts.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::NotPositive { field: *field });
        }
        if self.retry.sleep_scale.is_nan() || self.retry.sleep_scale < 1.0 {
            return Err(ConfigError::InvalidScale(self.retry.sleep_scale));
        }

        check_url("base_url", &self.base_url)?;
        if let Some(url) = &self.projects_base_url {
            check_url("projects_base_url", url)?;
        }
        if let Some(url) = &self.users_base_url {
            check_url("users_base_url", url)?;
        }
        Ok(())
    }

    pub fn base_url_for(&self, tag: CatalogTag) -> &str {
        let specific = match tag {
            CatalogTag::Projects => &self.projects_base_url,
            CatalogTag::Users => &self.users_base_url,
        };
        specific.as_deref().unwrap_or(&self.base_url)
    }

    pub fn crawl_settings(&self) -> Result<CrawlSettings, ConfigError> {
        let source = |tag: CatalogTag, field: &'static str, page_size: u32| {
            let url = self.base_url_for(tag);
            CatalogSource::new(tag, url, page_size).map_err(|err| ConfigError::InvalidUrl {
                field,
                url: url.to_string(),
                message: err.to_string(),
            })
        };
        let projects = source(CatalogTag::Projects, "projects_base_url", self.projects_page_size)?;
        let users = source(CatalogTag::Users, "users_base_url", self.users_page_size)?;

        Ok(CrawlSettings {
            projects,
            users,
            pool: PoolSettings {
                workers: self.workers,
                queue_capacity: self.queue_capacity,
                fetch_timeout: Some(Duration::from_secs(self.fetch_timeout_secs)),
            },
            retry: RetryPolicy {
                attempts: self.retry.attempts,
                sleep: Duration::from_millis(self.retry.sleep_ms),
                sleep_scale: self.retry.sleep_scale,
                max_sleep: Duration::from_millis(self.retry.max_sleep_ms),
                jitter: Duration::from_millis(self.retry.jitter_ms),
            },
            channel_capacity: self.channel_capacity,
        })
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_bytes: self.max_page_bytes,
            ..FetchSettings::default()
        }
    }
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidUrl {
        field,
        url: url.to_string(),
        message,
    };
    let parsed = Url::parse(url).map_err(|err| invalid(err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", parsed.scheme())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        let settings = config.crawl_settings().unwrap();
        assert_eq!(
            settings.projects.first_page_url().as_str(),
            "https://www.zooniverse.org/api/projects?page_size=200"
        );
        assert_eq!(settings.pool.workers, 4);
        assert_eq!(settings.retry.attempts, 5);
        assert_eq!(settings.channel_capacity, 256);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"(
                users_base_url: Some("http://localhost:9000/v2"),
                workers: 2,
                retry: (attempts: 1),
            )"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.retry.attempts, 1);
        assert_eq!(config.retry.sleep_ms, 500);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.base_url_for(CatalogTag::Users), "http://localhost:9000/v2");
        assert_eq!(config.base_url_for(CatalogTag::Projects), DEFAULT_BASE_URL);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = write_config("(worker_count: 3)");
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn flags_override_file_values() {
        let file = write_config("(workers: 2, projects_page_size: 10)");
        let args = CrawlArgs {
            config: Some(file.path().to_path_buf()),
            workers: Some(6),
            page_size: Some(25),
            output_dir: Some(PathBuf::from("out")),
            ..CrawlArgs::default()
        };
        let config = Config::resolve(&args).unwrap();
        assert_eq!(config.workers, 6);
        assert_eq!(config.projects_page_size, 25);
        assert_eq!(config.users_page_size, 25);
        assert_eq!(config.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn zero_counts_are_rejected() {
        let config = Config {
            queue_capacity: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive {
                field: "queue_capacity"
            })
        ));
    }

    #[test]
    fn bad_urls_are_rejected() {
        let config = Config {
            base_url: "ftp://catalog.example".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl {
                field: "base_url",
                ..
            })
        ));

        let config = Config {
            projects_base_url: Some("::".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
