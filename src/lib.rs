//! FleetWatch - vehicle telemetry ingestion and emergency alerting
//!
//! Events are accepted over HTTP, published to a durable AMQP queue and
//! consumed by a bounded worker pool that emails an alert for every
//! emergency event.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod formatting;
pub mod ingress;
pub mod internal_metrics;
pub mod notification;
pub mod queue;
pub mod task_manager;

// Re-export core types for convenience
pub use crate::core::*;
