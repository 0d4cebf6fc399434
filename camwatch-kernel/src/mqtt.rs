/**
 * BRIDGE MQTT - Télémétrie des caméras vers l'état dérivé
 *
 * RÔLE :
 * Maintient la connexion au broker, s'abonne aux topics motion / batterie,
 * republie la discovery à chaque connexion et convertit les messages
 * entrants en mutations du DeviceStateStore et du MotionLog.
 *
 * FONCTIONNEMENT :
 * - Task transport : poll de l'eventloop rumqttc, états
 *   Connecting -> Connected -> Disconnected (retry auto toutes les 5s)
 * - Sur ConnAck : subscribe + discovery dans une task séparée
 *   (l'eventloop doit continuer à être pollée pendant ce temps)
 * - Messages entrants -> canal mpsc -> task consommatrice unique,
 *   traitement strictement dans l'ordre d'arrivée
 * - Pas de config broker = bridge jamais démarré (mode dégradé supporté)
 */

use futures::future::BoxFuture;
use rumqttc::{
    AsyncClient, Event, EventLoop, Incoming, MqttOptions, NetworkOptions, Outgoing, QoS, Transport,
};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, MqttConf};
use crate::devices::DeviceStateStore;
use crate::discovery::{announcements, battery_topic, motion_topic};
use crate::health::ChannelStatus;
use crate::history::{MotionEvent, MotionLog};
use crate::models::{parse_battery_level, MotionState};

pub const TELEMETRY_NAMESPACE: &str = "neolink";
const CLIENT_ID: &str = "camwatch-kernel";
const KEEP_ALIVE: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 256;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

// ============ PARSING DES TOPICS ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Telemetry {
    Motion { identity: String, state: MotionState },
    Battery { identity: String, level: Option<u8> },
}

/// Identité entre `<namespace>/` et `suffix`. Un segment vide ou contenant
/// un `/` n'est pas une correspondance.
fn identity_in<'a>(namespace: &str, topic: &'a str, suffix: &str) -> Option<&'a str> {
    let identity = topic
        .strip_prefix(namespace)?
        .strip_prefix('/')?
        .strip_suffix(suffix)?;
    if identity.is_empty() || identity.contains('/') {
        return None;
    }
    Some(identity)
}

pub fn parse_telemetry(namespace: &str, topic: &str, payload: &[u8]) -> Option<Telemetry> {
    let payload = String::from_utf8_lossy(payload);
    if let Some(identity) = identity_in(namespace, topic, "/status/motion") {
        return Some(Telemetry::Motion {
            identity: identity.to_string(),
            state: MotionState::from_payload(&payload),
        });
    }
    if let Some(identity) = identity_in(namespace, topic, "/status/battery_level") {
        return Some(Telemetry::Battery {
            identity: identity.to_string(),
            level: parse_battery_level(&payload),
        });
    }
    None
}

pub fn subscription_filters(namespace: &str) -> [String; 2] {
    [motion_topic(namespace, "+"), battery_topic(namespace, "+")]
}

// ============ HANDLER ============

/// Applique un message entrant aux stores. Seul écrivain du DeviceStateStore.
#[derive(Clone)]
pub struct TelemetryHandler {
    namespace: String,
    states: DeviceStateStore,
    motion_log: MotionLog,
}

impl TelemetryHandler {
    pub fn new(namespace: impl Into<String>, states: DeviceStateStore, motion_log: MotionLog) -> Self {
        Self {
            namespace: namespace.into(),
            states,
            motion_log,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn handle(&self, topic: &str, payload: &[u8]) {
        let Some(telemetry) = parse_telemetry(&self.namespace, topic, payload) else {
            return;
        };
        let now = OffsetDateTime::now_utc();
        match telemetry {
            Telemetry::Motion { identity, state } => {
                self.states.record_motion(&identity, state, now);
                // seuls les passages à "on" sont historisés
                if state == MotionState::On {
                    info!("[mqtt] motion ON: {identity}");
                    self.motion_log.push(MotionEvent::on(identity, now));
                }
            }
            Telemetry::Battery { identity, level } => {
                if level.is_none() {
                    debug!("[mqtt] unreadable battery level for {identity}");
                }
                self.states.record_battery(&identity, level, now);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Consommateur unique : un message à la fois, dans l'ordre du canal.
pub fn spawn_telemetry_consumer(
    handler: TelemetryHandler,
    mut inbound: mpsc::Receiver<InboundMessage>,
) -> JoinHandle<()> {
    task::spawn(async move {
        while let Some(msg) = inbound.recv().await {
            handler.handle(&msg.topic, &msg.payload);
        }
        debug!("[mqtt] telemetry consumer stopped");
    })
}

// ============ CLIENT BROKER ============

/// Opérations broker utilisées à la connexion (abonnements + discovery).
pub trait BrokerClient: Send + Sync {
    fn subscribe<'a>(&'a self, filter: &'a str) -> BoxFuture<'a, Result<(), BridgeError>>;
    fn publish_retained<'a>(&'a self, topic: &'a str, payload: String) -> BoxFuture<'a, Result<(), BridgeError>>;
}

impl BrokerClient for AsyncClient {
    fn subscribe<'a>(&'a self, filter: &'a str) -> BoxFuture<'a, Result<(), BridgeError>> {
        Box::pin(async move {
            AsyncClient::subscribe(self, filter, QoS::AtLeastOnce).await?;
            Ok(())
        })
    }

    fn publish_retained<'a>(&'a self, topic: &'a str, payload: String) -> BoxFuture<'a, Result<(), BridgeError>> {
        Box::pin(async move {
            AsyncClient::publish(self, topic, QoS::AtLeastOnce, true, payload).await?;
            Ok(())
        })
    }
}

/// Séquence d'entrée dans l'état Connected. Recharge la config à chaque fois;
/// retourne le nombre d'annonces publiées.
pub async fn on_connected<C: BrokerClient + ?Sized>(client: &C, namespace: &str, config: &ConfigStore) -> usize {
    for filter in subscription_filters(namespace) {
        if let Err(e) = client.subscribe(&filter).await {
            warn!("[mqtt] subscribe {filter} failed: {e}");
        }
    }

    let options = config.load();
    let mut published = 0;
    for announcement in announcements(namespace, &options.cameras) {
        match client.publish_retained(&announcement.topic, announcement.payload).await {
            Ok(()) => published += 1,
            Err(e) => warn!("[mqtt] discovery publish {} failed: {e}", announcement.topic),
        }
    }
    published
}

fn mqtt_options(conf: &MqttConf) -> MqttOptions {
    let mut opts = MqttOptions::new(CLIENT_ID, &conf.host, conf.port);
    opts.set_keep_alive(KEEP_ALIVE);
    if let Some(username) = conf.username.as_deref().filter(|u| !u.is_empty()) {
        opts.set_credentials(username, conf.password.clone().unwrap_or_default());
    }
    if conf.ssl {
        opts.set_transport(Transport::tls_with_default_config());
    }
    opts
}

// ============ BRIDGE ============

pub struct TelemetryBridge {
    client: AsyncClient,
    status: ChannelStatus,
    event_loop: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl TelemetryBridge {
    /// Démarre le bridge si un broker est configuré, sinon `None` et
    /// le statut reste `Disabled`.
    pub fn start(
        conf: Option<MqttConf>,
        config: ConfigStore,
        handler: TelemetryHandler,
        status: ChannelStatus,
    ) -> Option<Self> {
        let Some(conf) = conf else {
            info!("[mqtt] MQTT not available, motion/battery disabled");
            return None;
        };

        let scheme = if conf.ssl { "mqtts" } else { "mqtt" };
        let endpoint = format!("{}:{}", conf.host, conf.port);
        info!("[mqtt] connecting to {scheme}://{endpoint}");

        let (client, mut eventloop) = AsyncClient::new(mqtt_options(&conf), REQUEST_CAPACITY);
        let mut network = NetworkOptions::new();
        network.set_connection_timeout(CONNECT_TIMEOUT.as_secs());
        eventloop.set_network_options(network);

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let namespace = handler.namespace().to_string();
        let consumer = spawn_telemetry_consumer(handler, rx);

        status.mark_connecting();
        let event_loop = task::spawn(run_event_loop(
            eventloop,
            client.clone(),
            namespace,
            config,
            tx,
            status.clone(),
            endpoint,
        ));

        Some(Self {
            client,
            status,
            event_loop,
            consumer,
        })
    }

    /// Arrêt borné : même broker injoignable ou canal de requêtes plein,
    /// rend la main après au plus quelques `SHUTDOWN_GRACE`.
    pub async fn shutdown(mut self) {
        match tokio::time::timeout(SHUTDOWN_GRACE, self.client.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[mqtt] disconnect failed: {e}"),
            Err(_) => warn!("[mqtt] disconnect request timed out"),
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.event_loop).await.is_err() {
            debug!("[mqtt] event loop still running after disconnect, aborting");
            self.event_loop.abort();
        }
        self.status.mark_closed();
        // l'eventloop terminée lâche le Sender : le consommateur finit le canal
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.consumer).await.is_err() {
            debug!("[mqtt] consumer still running after disconnect, aborting");
            self.consumer.abort();
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    namespace: String,
    config: ConfigStore,
    inbound: mpsc::Sender<InboundMessage>,
    status: ChannelStatus,
    endpoint: String,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                status.mark_connected();
                info!("[mqtt] connected to {endpoint}");
                let client = client.clone();
                let namespace = namespace.clone();
                let config = config.clone();
                task::spawn(async move {
                    let published = on_connected(&client, &namespace, &config).await;
                    debug!("[mqtt] published {published} discovery announcements");
                });
            }
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                let msg = InboundMessage {
                    topic: p.topic,
                    payload: p.payload.to_vec(),
                };
                if inbound.send(msg).await.is_err() {
                    warn!("[mqtt] telemetry consumer gone, stopping bridge");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("[mqtt] disconnecting from {endpoint}");
                status.mark_closed();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("[mqtt] MQTT error: {e}");
                status.mark_disconnected();
                tokio::time::sleep(RECONNECT_DELAY).await;
                status.mark_connecting();
            }
        }
    }
}
