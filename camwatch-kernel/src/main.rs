/**
 * CAMWATCH KERNEL - Point d'entrée du daemon de supervision
 *
 * RÔLE : Orchestration des modules : config, bridge MQTT, agrégateur, HTTP.
 * Bootstrap avec stores partagés injectés explicitement dans chaque composant.
 *
 * ARCHITECTURE : télémétrie MQTT (push) + sondes TCP à la demande (pull)
 * + snapshot JSON pour le dashboard.
 */

mod aggregator;
mod config;
mod devices;
mod discovery;
mod health;
mod history;
mod http;
mod logging;
mod models;
mod mqtt;
mod netinfo;
mod probe;
mod resolver;
mod snapshot;
mod streams;

use crate::aggregator::StatusAggregator;
use crate::config::{BrokerSource, ConfigStore, PortsSource, Settings};
use crate::devices::DeviceStateStore;
use crate::health::ChannelStatus;
use crate::history::{MessageLog, MotionLog};
use crate::http::AppState;
use crate::mqtt::{TelemetryBridge, TelemetryHandler, TELEMETRY_NAMESPACE};
use crate::resolver::AddressResolver;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let settings = Settings::from_env();
    let config = ConfigStore::new(&settings.options_file);
    let ports = PortsSource::new(&settings.ports_file);
    let broker = BrokerSource::new(&settings.mqtt_file);

    // log_level des options = filtre par défaut quand RUST_LOG est absent
    let log_level = config.read().map(|o| o.log_level().to_string()).ok();
    let message_log = MessageLog::new();
    logging::init(message_log.clone(), log_level.as_deref().unwrap_or("info"));

    // stores partagés
    let states = DeviceStateStore::new();
    let motion_log = MotionLog::new();
    let channel = ChannelStatus::new();

    // MQTT remplit les states + motion log
    let handler = TelemetryHandler::new(TELEMETRY_NAMESPACE, states.clone(), motion_log.clone());
    let bridge = TelemetryBridge::start(broker.load(), config.clone(), handler, channel.clone());

    let port = settings.http_port.unwrap_or_else(|| ports.load().dashboard);
    let aggregator = StatusAggregator::new(
        config,
        AddressResolver::new(&settings.ip_map_file),
        ports,
        broker,
        states,
        channel,
    )
    .with_dashboard_port(port);

    let app = http::build_router(AppState {
        aggregator: Arc::new(aggregator),
        motion_log,
        message_log,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[kernel] dashboard API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("[kernel] shutting down");
    if let Some(bridge) = bridge {
        bridge.shutdown().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("[kernel] failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("[kernel] failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
