//! Broker connection establishment with fixed-interval retry.

use crate::config::QueueConfig;
use crate::queue::{QueueError, QueueSession};
use lapin::{options::QueueDeclareOptions, types::FieldTable, Connection, ConnectionProperties};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(5),
        }
    }
}

/// Runs `op` until it succeeds or `policy.attempts` tries have failed.
///
/// Each failure is logged with its cause. The wait happens between attempts
/// only, so exhausting the budget costs `attempts - 1` intervals. On
/// exhaustion the error of the final attempt is returned.
pub async fn retry_fixed<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                warn!(attempt, attempts, error = %e, "Attempt failed, giving up");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    attempt,
                    attempts,
                    error = %e,
                    retry_in_ms = policy.interval.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(policy.interval).await;
                attempt += 1;
            }
        }
    }
}

/// Opens the broker session the rest of the application shares.
pub struct QueueConnector {
    config: QueueConfig,
}

impl QueueConnector {
    pub fn new(config: QueueConfig) -> Self {
        Self { config }
    }

    /// Connects and declares the durable queue, retrying per the configured
    /// policy. An attempt only counts as successful when both steps succeed.
    #[instrument(skip(self), fields(host = %self.config.host, queue = %self.config.queue_name))]
    pub async fn connect(&self) -> Result<QueueSession, QueueError> {
        let policy = self.config.retry_policy();
        let uri = self.config.uri();

        let session = retry_fixed(policy, |_attempt| self.try_connect(&uri))
            .await
            .map_err(|e| QueueError::ConnectExhausted {
                attempts: policy.attempts,
                last: e.to_string(),
            })?;

        info!("Connected to message broker and declared durable queue.");
        Ok(session)
    }

    async fn try_connect(&self, uri: &str) -> Result<QueueSession, QueueError> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .queue_declare(
                &self.config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        Ok(QueueSession::new(
            connection,
            channel,
            self.config.queue_name.clone(),
        ))
    }
}
