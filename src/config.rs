//! Configuration management for FleetWatch
//!
//! This module defines the main `Config` struct and its sub-structs. Settings
//! are layered with `figment`: built-in defaults, an optional TOML file, the
//! plain environment variables used by existing deployments, variables
//! prefixed with `FLEETWATCH_`, and finally command-line flags.

use crate::cli::{insert_nested, Cli};
use crate::queue::RetryPolicy;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Map, Uncased, Value},
    Figment, Metadata, Profile, Provider,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "fleetwatch.toml";

const ENV_PREFIX: &str = "FLEETWATCH_";

/// Unprefixed variables taken verbatim as strings, and the keys they feed.
const LEGACY_STRING_ENV: &[(&str, &str)] = &[
    ("QUEUE_HOST", "queue.host"),
    ("QUEUE_USER", "queue.username"),
    ("QUEUE_PASS", "queue.password"),
    ("SMTP_HOST", "smtp.host"),
    ("SMTP_USERNAME", "smtp.username"),
    ("SMTP_PASSWORD", "smtp.password"),
    ("TARGET_EMAIL", "smtp.recipient"),
];

/// Unprefixed variables holding numbers.
const LEGACY_NUMERIC_ENV: &[(&str, &str)] = &[
    ("SMTP_PORT", "smtp.port"),
    ("CONCURRENCY_LIMIT", "dispatch.concurrency_limit"),
];

/// Prefixed credentials, kept out of figment's value parsing so that a
/// password such as `123456` or `true` stays a string.
const PREFIXED_STRING_ENV: &[(&str, &str)] = &[
    ("FLEETWATCH_QUEUE__USERNAME", "queue.username"),
    ("FLEETWATCH_QUEUE__PASSWORD", "queue.password"),
    ("FLEETWATCH_SMTP__USERNAME", "smtp.username"),
    ("FLEETWATCH_SMTP__PASSWORD", "smtp.password"),
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("configuration file not found: {0}")]
    MissingFile(PathBuf),

    #[error("invalid value for `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: &'static str,
    },
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level, overridden by `RUST_LOG` when set.
    pub log_level: String,
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub dispatch: DispatchConfig,
    pub smtp: SmtpConfig,
    pub metrics: MetricsConfig,
}

/// Configuration for the HTTP ingress server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
}

/// Configuration for the AMQP broker connection.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Name of the single durable queue.
    pub queue_name: String,
    /// Connection attempts before startup is abandoned.
    pub connect_attempts: u32,
    /// Fixed wait between connection attempts.
    pub retry_interval_ms: u64,
}

impl QueueConfig {
    /// Builds the AMQP URI for this broker.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.connect_attempts,
            interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

/// Configuration for the dispatch worker pool.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatchConfig {
    /// Maximum number of messages processed at the same time.
    pub concurrency_limit: usize,
}

/// TLS behaviour for the SMTP connection.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plain connection.
    None,
    /// Upgrade with STARTTLS when the server offers it.
    #[default]
    Opportunistic,
    /// Refuse to send unless STARTTLS succeeds.
    Required,
}

/// Configuration for the email alert transport.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Authentication is only attempted when this is set and non-empty.
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    /// The single address every alert is sent to.
    pub recipient: String,
    #[serde(default)]
    pub tls: SmtpTls,
}

/// Configuration for the Prometheus metrics endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

impl Config {
    /// Loads and validates the configuration for the given command line.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(path) = &cli.config {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.clone()));
            }
        }

        let config: Config = Self::figment(cli).extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the layered provider stack without extracting it.
    pub fn figment(cli: &Cli) -> Figment {
        let file = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let verbatim: Vec<&str> = PREFIXED_STRING_ENV
            .iter()
            .filter_map(|(name, _)| name.strip_prefix(ENV_PREFIX))
            .collect();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(legacy_numeric_env())
            .merge(VerbatimEnv::new(LEGACY_STRING_ENV))
            // e.g. FLEETWATCH_QUEUE__HOST=rabbitmq
            .merge(Env::prefixed(ENV_PREFIX).ignore(&verbatim).split("__"))
            .merge(VerbatimEnv::new(PREFIXED_STRING_ENV))
            .merge(cli.clone())
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.concurrency_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "dispatch.concurrency_limit",
                message: "must be greater than zero",
            });
        }
        if self.queue.connect_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "queue.connect_attempts",
                message: "must be greater than zero",
            });
        }
        if self.smtp.recipient.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "smtp.recipient",
                message: "an alert recipient address is required",
            });
        }
        Ok(())
    }
}

fn legacy_numeric_env() -> Env {
    let names: Vec<&str> = LEGACY_NUMERIC_ENV.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        LEGACY_NUMERIC_ENV
            .iter()
            .find(|(name, _)| key == *name)
            .map(|(_, path)| Uncased::from(*path))
            .unwrap_or_else(|| Uncased::from(key.as_str().to_owned()))
    })
}

/// Reads a fixed set of environment variables as plain strings.
///
/// `figment::providers::Env` parses values, turning `123456` into an integer
/// and `true` into a bool, which then fail to land in `String` fields.
struct VerbatimEnv {
    vars: &'static [(&'static str, &'static str)],
}

impl VerbatimEnv {
    fn new(vars: &'static [(&'static str, &'static str)]) -> Self {
        Self { vars }
    }
}

impl Provider for VerbatimEnv {
    fn metadata(&self) -> Metadata {
        Metadata::named("environment variable(s)")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        let mut dict = Dict::new();
        for (name, path) in self.vars {
            let Ok(value) = std::env::var(name) else {
                continue;
            };
            if let Some((section, key)) = path.split_once('.') {
                insert_nested(&mut dict, section, key, Value::from(value));
            }
        }
        Ok(Profile::Default.collect(dict))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig {
                listen_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            },
            queue: QueueConfig {
                host: "localhost".to_string(),
                port: 5672,
                username: "guest".to_string(),
                password: "guest".to_string(),
                vhost: "/".to_string(),
                queue_name: "event_queue".to_string(),
                connect_attempts: 5,
                retry_interval_ms: 5000,
            },
            dispatch: DispatchConfig {
                concurrency_limit: 10,
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 25,
                username: None,
                password: None,
                from: "alerts@fleetwatch.local".to_string(),
                recipient: String::new(),
                tls: SmtpTls::Opportunistic,
            },
            metrics: MetricsConfig {
                enabled: false,
                listen_address: SocketAddr::from(([0, 0, 0, 0], 9090)),
            },
        }
    }
}
