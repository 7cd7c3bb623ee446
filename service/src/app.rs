//! Process wiring.
//!
//! [`ReservationApp`] connects to Postgres, applies migrations and builds every
//! component. [`ReservationApp::run`] then drives three tasks until Ctrl-C:
//!
//! - the HTTP server,
//! - the payment-update consumer, rebuilt after a delay whenever it stops on
//!   an error,
//! - the expiry sweeper ticker (unless disabled).

use crate::admission::AdmissionController;
use crate::config::{Config, RedpandaConfig};
use crate::confirmation::ConfirmationHandler;
use crate::http_transport::HttpPaymentTransport;
use crate::payment_verifier::PaymentVerifier;
use crate::server::{AppState, build_router};
use crate::sweeper::ExpirySweeper;
use anyhow::Context;
use axum::Router;
use room_reservation_core::environment::{Clock, SystemClock};
use room_reservation_core::{MessageHandler, PaymentTransport, ReservationStore};
use room_reservation_postgres::PostgresReservationStore;
use room_reservation_redpanda::{ConsumerError, PaymentUpdateConsumer};
use room_reservation_runtime::metrics::PrometheusMetrics;
use room_reservation_runtime::retry::RetryPolicy;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The assembled service.
pub struct ReservationApp {
    config: Config,
    state: AppState,
    confirmation: Arc<ConfirmationHandler>,
    sweeper: Arc<ExpirySweeper>,
}

impl ReservationApp {
    /// Connect to Postgres, migrate the schema and build all components.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable, a migration fails or
    /// the payment client cannot be built.
    pub async fn new(config: Config, metrics: PrometheusMetrics) -> anyhow::Result<Self> {
        tracing::info!(max_connections = config.postgres.max_connections, "Connecting to PostgreSQL");
        let postgres = PostgresReservationStore::connect(&config.postgres.url, config.postgres.max_connections)
            .await
            .context("Failed to connect to PostgreSQL")?;
        postgres.migrate().await.context("Failed to migrate schema")?;
        let store: Arc<dyn ReservationStore> = Arc::new(postgres);

        let transport = HttpPaymentTransport::from_config(&config.payment)
            .context("Failed to build payment authority client")?;
        tracing::info!(endpoint = %transport.endpoint(), "Payment authority client ready");

        Ok(Self::assemble(config, store, Arc::new(transport), metrics))
    }

    /// Build components around an existing store and transport.
    #[must_use]
    pub fn assemble(
        config: Config,
        store: Arc<dyn ReservationStore>,
        transport: Arc<dyn PaymentTransport>,
        metrics: PrometheusMetrics,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let verifier = Arc::new(PaymentVerifier::from_config(transport, &config.payment));
        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&store),
            verifier,
            Arc::clone(&clock),
        ));
        let confirmation = Arc::new(ConfirmationHandler::new(Arc::clone(&store), Arc::clone(&clock)));
        let sweeper = Arc::new(ExpirySweeper::new(
            Arc::clone(&store),
            clock,
            config.sweeper.grace_days,
        ));
        let state = AppState::new(admission, store, Arc::new(metrics));

        Self {
            config,
            state,
            confirmation,
            sweeper,
        }
    }

    /// HTTP router over this application's state.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until Ctrl-C, then stop the consumer and the sweeper.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let consumer = tokio::spawn(run_consumer(
            self.config.redpanda.clone(),
            Arc::<ConfirmationHandler>::clone(&self.confirmation),
            shutdown_tx.subscribe(),
        ));

        let sweeper = if self.config.sweeper.enabled {
            tracing::info!(
                interval_secs = self.config.sweeper.interval.as_secs(),
                grace_days = self.config.sweeper.grace_days,
                "Expiry sweeper scheduled"
            );
            Some(Arc::clone(&self.sweeper).spawn(self.config.sweeper.interval, shutdown_tx.subscribe()))
        } else {
            tracing::info!("Expiry sweeper disabled");
            None
        };

        let address = self.config.server.bind_address();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;
        tracing::info!(%address, "HTTP server listening");

        let signal_tx = shutdown_tx.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
                tracing::info!("Shutdown requested");
                let _ = signal_tx.send(());
            })
            .await
            .context("HTTP server failed")?;

        // The server may also stop on its own; make sure the workers follow.
        let _ = shutdown_tx.send(());
        if let Err(e) = consumer.await {
            tracing::error!(error = %e, "Consumer task panicked");
        }
        if let Some(sweeper) = sweeper {
            if let Err(e) = sweeper.await {
                tracing::error!(error = %e, "Sweeper task panicked");
            }
        }

        tracing::info!("Shutdown complete");
        Ok(())
    }
}

fn build_consumer(config: &RedpandaConfig) -> Result<PaymentUpdateConsumer, ConsumerError> {
    let redelivery = RetryPolicy::builder()
        .max_attempts(config.redelivery_attempts)
        .initial_delay(config.redelivery_backoff)
        .build();

    let mut builder = PaymentUpdateConsumer::builder()
        .brokers(&config.brokers)
        .consumer_group(&config.consumer_group)
        .topic(&config.payment_update_topic)
        .auto_offset_reset(&config.auto_offset_reset)
        .redelivery(redelivery);
    if let Some(topic) = &config.dead_letter_topic {
        builder = builder.dead_letter_topic(topic);
    }
    builder.build()
}

/// Consume payment updates until `shutdown` fires, rebuilding the consumer
/// after `reconnect_delay` whenever it stops on an error. A consumer stopped by
/// a failed dead-letter publish resumes from its last committed offset.
pub async fn run_consumer(
    config: RedpandaConfig,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let result = match build_consumer(&config) {
            Ok(consumer) => consumer.run(handler.as_ref(), &mut shutdown).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => return,
            Err(e) => tracing::error!(
                error = %e,
                retry_in_secs = config.reconnect_delay.as_secs(),
                "Payment update consumer stopped, restarting"
            ),
        }

        tokio::select! {
            _ = shutdown.recv() => return,
            () = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }
}
