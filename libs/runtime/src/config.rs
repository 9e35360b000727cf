//! Runtime configuration.
//!
//! Loaded from `EMBER_*` environment variables or a TOML document; every
//! field has a default so both sources may be partial.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// =============================================================================
// Pluggable components
// =============================================================================

/// How the scheduler picks a worker queue for an enqueued executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    #[default]
    Random,
    RoundRobin,
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "round-robin" => Ok(Self::RoundRobin),
            other => Err(format!("unknown placement '{other}'")),
        }
    }
}

/// Where actor state is persisted between activations and restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreKind {
    /// No persistence; state lives only in the executor.
    None,
    #[default]
    Memory,
    /// One JSON document per actor under `dir`.
    File { dir: PathBuf },
}

impl FromStr for StoreKind {
    type Err = String;

    /// Accepts `none`, `memory` or `file:<dir>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("file", dir)) if !dir.is_empty() => Ok(Self::File { dir: dir.into() }),
            None if s == "none" => Ok(Self::None),
            None if s == "memory" => Ok(Self::Memory),
            _ => Err(format!("unknown store '{s}'")),
        }
    }
}

/// Mailbox transport used for every actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MailboxKind {
    #[default]
    Unbounded,
    /// `send` waits while `capacity` messages are queued.
    Bounded { capacity: usize },
    /// Messages are encoded with the configured serializer while queued.
    Serialized,
}

impl FromStr for MailboxKind {
    type Err = String;

    /// Accepts `unbounded`, `serialized` or `bounded:<capacity>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("bounded", capacity)) => capacity
                .parse()
                .map(|capacity| Self::Bounded { capacity })
                .map_err(|e| format!("bad capacity '{capacity}': {e}")),
            None if s == "unbounded" => Ok(Self::Unbounded),
            None if s == "serialized" => Ok(Self::Serialized),
            _ => Err(format!("unknown mailbox '{s}'")),
        }
    }
}

/// Serializer for queued messages and stored state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializerKind {
    #[default]
    Json,
}

impl FromStr for SerializerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            other => Err(format!("unknown serializer '{other}'")),
        }
    }
}

// =============================================================================
// Config
// =============================================================================

/// Actor system configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reduction budget per activation.
    pub max_reductions: u32,

    /// Number of scheduler workers.
    pub workers: usize,

    /// Replace one worker with a dedicated steal sweeper (only above four workers).
    pub steal_sweeper: bool,

    /// Handler time above which extra reductions are charged.
    pub process_time_threshold_ms: u64,

    /// Extra reductions charged per threshold interval of overage.
    pub time_penalty_factor: u32,

    /// Longest a worker sleeps when no work is available.
    pub idle_wait_ms: u64,

    pub placement: Placement,

    /// Default timeout for `ask`.
    pub ask_timeout_ms: u64,

    pub serializer: SerializerKind,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub store: StoreKind,

    pub mailbox: MailboxKind,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_reductions: 50,
            workers: default_workers(),
            steal_sweeper: false,
            process_time_threshold_ms: 10,
            time_penalty_factor: 2,
            idle_wait_ms: 10,
            placement: Placement::Random,
            ask_timeout_ms: 5_000,
            serializer: SerializerKind::Json,
            log_level: "info".to_string(),
            store: StoreKind::Memory,
            mailbox: MailboxKind::Unbounded,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, using `EMBER_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            max_reductions: parse_var(&lookup, "EMBER_MAX_REDUCTIONS", defaults.max_reductions)?,
            workers: parse_var(&lookup, "EMBER_WORKERS", defaults.workers)?,
            steal_sweeper: parse_var(&lookup, "EMBER_STEAL_SWEEPER", defaults.steal_sweeper)?,
            process_time_threshold_ms: parse_var(
                &lookup,
                "EMBER_PROCESS_TIME_THRESHOLD_MS",
                defaults.process_time_threshold_ms,
            )?,
            time_penalty_factor: parse_var(
                &lookup,
                "EMBER_TIME_PENALTY_FACTOR",
                defaults.time_penalty_factor,
            )?,
            idle_wait_ms: parse_var(&lookup, "EMBER_IDLE_WAIT_MS", defaults.idle_wait_ms)?,
            placement: parse_var(&lookup, "EMBER_PLACEMENT", defaults.placement)?,
            ask_timeout_ms: parse_var(&lookup, "EMBER_ASK_TIMEOUT_MS", defaults.ask_timeout_ms)?,
            serializer: parse_var(&lookup, "EMBER_SERIALIZER", defaults.serializer)?,
            log_level: lookup("EMBER_LOG_LEVEL").unwrap_or(defaults.log_level),
            store: parse_var(&lookup, "EMBER_STORE", defaults.store)?,
            mailbox: parse_var(&lookup, "EMBER_MAILBOX", defaults.mailbox)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Small, fast settings for tests.
    pub fn for_testing() -> Self {
        Self {
            workers: 2,
            idle_wait_ms: 1,
            ask_timeout_ms: 2_000,
            ..Self::default()
        }
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_reductions == 0 {
            return Err(ConfigError::Invalid("max_reductions must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if let MailboxKind::Bounded { capacity: 0 } = self.mailbox {
            return Err(ConfigError::Invalid("bounded mailbox capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn process_time_threshold(&self) -> Duration {
        Duration::from_millis(self.process_time_threshold_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn ask_timeout(&self) -> Duration {
        Duration::from_millis(self.ask_timeout_ms)
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================
