//! Room reservation server.
//!
//! Serves the reservation API, consumes bank-transfer payment updates and runs
//! the expiry sweeper.
//!
//! # Usage
//!
//! ```bash
//! # Start Postgres and Redpanda, then
//! cargo run --bin server
//! ```
//!
//! Configuration comes from the environment (see `Config::from_env`); a `.env`
//! file in the working directory is loaded first.

use anyhow::Context;
use room_reservation_runtime::metrics::PrometheusMetrics;
use room_reservation_service::metrics::register_business_metrics;
use room_reservation_service::{Config, ReservationApp};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,room_reservation_service=debug,sqlx=warn,rdkafka=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting room reservation service");

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(
        redpanda = %config.redpanda.brokers,
        topic = %config.redpanda.payment_update_topic,
        payment_service = %config.payment.base_url,
        "Configuration loaded"
    );

    let mut metrics = PrometheusMetrics::new();
    metrics.install().context("Failed to install metrics recorder")?;
    register_business_metrics();

    let app = ReservationApp::new(config, metrics).await?;
    app.run().await
}
