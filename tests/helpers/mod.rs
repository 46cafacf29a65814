#![allow(dead_code)]
pub mod memory_queue;

use fleetwatch::config::Config;
use std::net::SocketAddr;

/// A configuration that binds to an ephemeral local port and needs no broker.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.listen_address = SocketAddr::from(([127, 0, 0, 1], 0));
    config.smtp.recipient = "fleet-ops@example.com".to_string();
    config.dispatch.concurrency_limit = 4;
    config
}
