//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using
//! `clap`. The parsed arguments act as the highest-precedence `figment`
//! provider when the configuration is layered together.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Accepts vehicle telemetry events and emails an alert for emergencies.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address the HTTP ingress server binds to.
    #[arg(long, value_name = "ADDR")]
    pub listen_address: Option<SocketAddr>,

    /// Maximum number of queued events processed at once.
    #[arg(long, value_name = "N")]
    pub concurrency_limit: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Expose Prometheus metrics.
    #[arg(long)]
    pub metrics: bool,
}

/// Inserts `value` under `section.key`, creating the section if needed.
pub(crate) fn insert_nested(dict: &mut Dict, section: &str, key: &str, value: Value) {
    let entry = dict
        .entry(section.to_string())
        .or_insert_with(|| Value::from(Dict::new()));
    if let Value::Dict(_, inner) = entry {
        inner.insert(key.to_string(), value);
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(addr) = self.listen_address {
            insert_nested(&mut dict, "server", "listen_address", Value::from(addr.to_string()));
        }

        if let Some(limit) = self.concurrency_limit {
            insert_nested(&mut dict, "dispatch", "concurrency_limit", Value::from(limit));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        // Only an explicit flag turns metrics on; its absence leaves lower layers alone.
        if self.metrics {
            insert_nested(&mut dict, "metrics", "enabled", Value::from(true));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
