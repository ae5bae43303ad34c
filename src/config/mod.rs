//! Process-level configuration.
//!
//! Everything here comes from environment variables with development defaults,
//! so the binary can run without a config file. Run-scoped settings (URL list,
//! profile, skip flags) live in [`crate::pipeline::RunRequest`] instead. This
//! module only covers knobs that are stable across runs on one machine.

use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Environment variable names. Public so tests and the binary can refer to
/// them without typo-prone string duplication.
pub const ENV_DATA_DIR: &str = "PRESSPORT_DATA_DIR";
pub const ENV_PUBLIC_BASE: &str = "PRESSPORT_PUBLIC_BASE";
pub const ENV_FETCH_CONCURRENCY: &str = "PRESSPORT_FETCH_CONCURRENCY";
pub const ENV_FETCH_RETRIES: &str = "PRESSPORT_FETCH_RETRIES";
pub const ENV_BACKOFF_MS: &str = "PRESSPORT_BACKOFF_MS";
pub const ENV_SANITIZE_WORKERS: &str = "PRESSPORT_SANITIZE_WORKERS";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_PUBLIC_BASE: &str = "/wp-content/uploads";
const DEFAULT_FETCH_CONCURRENCY: usize = 1;
const DEFAULT_FETCH_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 500;
const DEFAULT_SANITIZE_WORKERS: usize = 4;

/// Application runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    data_dir: PathBuf,
    public_base: String,
    fetch_concurrency: usize,
    fetch_retries: u32,
    backoff_ms: u64,
    sanitize_workers: usize,
}

impl Config {
    /// Load from environment variables, falling back to development defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = env::var(ENV_DATA_DIR).unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
        let public_base =
            env::var(ENV_PUBLIC_BASE).unwrap_or_else(|_| DEFAULT_PUBLIC_BASE.to_string());
        let fetch_concurrency =
            parse_env(ENV_FETCH_CONCURRENCY, DEFAULT_FETCH_CONCURRENCY)?.max(1);
        let fetch_retries = parse_env(ENV_FETCH_RETRIES, DEFAULT_FETCH_RETRIES)?;
        let backoff_ms = parse_env(ENV_BACKOFF_MS, DEFAULT_BACKOFF_MS)?;
        let sanitize_workers = parse_env(ENV_SANITIZE_WORKERS, DEFAULT_SANITIZE_WORKERS)?.max(1);

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            public_base,
            fetch_concurrency,
            fetch_retries,
            backoff_ms,
            sanitize_workers,
        })
    }

    /// Override the artifact root. Used when embedding the pipeline with a
    /// caller-managed directory instead of the environment default.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_public_base(mut self, public_base: impl Into<String>) -> Self {
        self.public_base = public_base.into();
        self
    }

    pub fn with_fetch_concurrency(mut self, fetch_concurrency: usize) -> Self {
        self.fetch_concurrency = fetch_concurrency.max(1);
        self
    }

    pub fn with_fetch_retries(mut self, fetch_retries: u32) -> Self {
        self.fetch_retries = fetch_retries;
        self
    }

    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    /// Root directory for all durable run artifacts.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }
    /// Public URL prefix downloaded images will be served from after import.
    pub fn public_base(&self) -> &str {
        &self.public_base
    }
    /// Parallel page fetches. Defaults to 1 to respect target-site rate limits.
    pub fn fetch_concurrency(&self) -> usize {
        self.fetch_concurrency
    }
    /// Retries per page fetch before recording a permanent failure.
    pub fn fetch_retries(&self) -> u32 {
        self.fetch_retries
    }
    /// Base delay for exponential retry backoff.
    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }
    /// Parallel sanitizer workers.
    pub fn sanitize_workers(&self) -> usize {
        self.sanitize_workers
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            public_base: DEFAULT_PUBLIC_BASE.to_string(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            fetch_retries: DEFAULT_FETCH_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
            sanitize_workers: DEFAULT_SANITIZE_WORKERS,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            field: key,
            reason: format!("could not parse '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}

/// Errors that can occur while building a configuration.
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl Error for ConfigError {}
