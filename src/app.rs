//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::{AlertNotifier, EventPublisher},
    dispatch::Dispatcher,
    ingress::{self, IngressServer},
    internal_metrics::MetricsBuilder,
    notification::EmailNotifier,
    queue::{DeliveryStream, QueueConnector, QueueSession},
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::{net::SocketAddr, num::NonZeroUsize, sync::Arc};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    http_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    session: Option<QueueSession>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the ingress server is bound to.
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Waits for the shutdown signal and then stops all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        if let Some(session) = &self.session {
            session.close().await;
        }

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// The overrides replace the broker and mail transport so the pipeline can be
/// run in tests without external services.
pub struct AppBuilder {
    config: Config,
    publisher_override: Option<Arc<dyn EventPublisher>>,
    deliveries_override: Option<DeliveryStream>,
    notifier_override: Option<Arc<dyn AlertNotifier>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            publisher_override: None,
            deliveries_override: None,
            notifier_override: None,
        }
    }

    /// Overrides the queue publisher used by the ingress endpoint.
    pub fn publisher_override(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher_override = Some(publisher);
        self
    }

    /// Overrides the stream of consumed queue messages.
    pub fn deliveries_override(mut self, deliveries: DeliveryStream) -> Self {
        self.deliveries_override = Some(deliveries);
        self
    }

    /// Overrides the alert notifier.
    pub fn notifier_override(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier_override = Some(notifier);
        self
    }

    /// Builds and starts all components, returning a runnable `App`.
    ///
    /// The broker connection is established before the HTTP listener is
    /// bound, so no traffic is accepted unless the queue is reachable.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);

        let concurrency_limit = NonZeroUsize::new(config.dispatch.concurrency_limit)
            .context("dispatch.concurrency_limit must be greater than zero")?;

        // =========================================================================
        // 1. Initialize Metrics
        // =========================================================================
        let (metrics, metrics_server) = MetricsBuilder::new(config.metrics.clone())
            .build(task_manager.get_shutdown_rx())
            .await?;
        let metrics_addr = match metrics_server {
            Some((server, addr)) => {
                task_manager.spawn("MetricsServer", server.run());
                info!(%addr, "Metrics server listening");
                Some(addr)
            }
            None => None,
        };

        // =========================================================================
        // 2. Alert Notifier
        // =========================================================================
        let notifier = match self.notifier_override {
            Some(notifier) => notifier,
            None => {
                debug!(host = %config.smtp.host, port = config.smtp.port, "Initializing email notifier");
                Arc::new(EmailNotifier::from_config(&config.smtp)?) as Arc<dyn AlertNotifier>
            }
        };

        // =========================================================================
        // 3. Broker Session
        // =========================================================================
        let (publisher, deliveries, session) =
            match (self.publisher_override, self.deliveries_override) {
                (Some(publisher), Some(deliveries)) => (publisher, deliveries, None),
                (publisher, deliveries) => {
                    let session = QueueConnector::new(config.queue.clone()).connect().await?;
                    let publisher = match publisher {
                        Some(publisher) => publisher,
                        None => Arc::new(session.publisher()) as Arc<dyn EventPublisher>,
                    };
                    let deliveries = match deliveries {
                        Some(deliveries) => deliveries,
                        None => session
                            .consume()
                            .await
                            .context("Failed to start consuming the event queue")?,
                    };
                    (publisher, deliveries, Some(session))
                }
            };

        // =========================================================================
        // 4. Dispatch Worker Pool
        // =========================================================================
        info!(
            concurrency_limit = concurrency_limit.get(),
            "Starting dispatcher"
        );
        let dispatcher = Dispatcher::new(concurrency_limit, notifier, metrics.clone());
        let dispatcher_shutdown_rx = task_manager.get_shutdown_rx();
        task_manager.spawn("Dispatcher", async move {
            dispatcher.run(deliveries, dispatcher_shutdown_rx).await;
        });

        // =========================================================================
        // 5. Ingress Server
        // =========================================================================
        let listener = TcpListener::bind(config.server.listen_address)
            .await
            .with_context(|| {
                format!(
                    "Failed to bind ingress server to {}",
                    config.server.listen_address
                )
            })?;
        let http_addr = listener.local_addr()?;
        let server = IngressServer::new(
            listener,
            ingress::router(publisher, metrics),
            task_manager.get_shutdown_rx(),
        );
        task_manager.spawn("IngressServer", server.run());

        info!("FleetWatch initialized successfully. Accepting events...");

        Ok(App {
            task_manager,
            http_addr,
            metrics_addr,
            session,
        })
    }
}
