use serde::Serialize;
use time::OffsetDateTime;

use crate::config::{IpMode, OnvifCredentials};
use crate::health::ConnectionState;
use crate::models::MotionState;
use crate::probe::ProbeOutcome;
use crate::resolver::ResolvedAddress;

/// Vue composite immuable produite par un appel à `StatusAggregator::snapshot`.
///
/// Chaque champ est cohérent avec lui-même, mais l'ensemble n'est pas une
/// lecture atomique : sondes, état MQTT et état des caméras peuvent refléter
/// des instants légèrement différents.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub host_ip: String,
    pub services: Services,
    pub devices: Vec<DeviceRow>,
    pub onvif_credentials: OnvifCredentials,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Services {
    pub mqtt: MqttService,
    pub neolink: PortService,
    pub go2rtc: Go2rtcService,
    pub onvif: OnvifService,
    pub dashboard: PortService,
}

#[derive(Debug, Clone, Serialize)]
pub struct MqttService {
    pub running: bool,
    pub state: ConnectionState,
    pub reconnects: u32,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ssl: bool,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortService {
    pub running: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct Go2rtcService {
    pub running: bool,
    pub port: u16,
    pub api_port: u16,
    pub api_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnvifService {
    pub running: bool,
    pub port: u16,
    pub probe: ProbeOutcome,
}

/// URLs RTSP d'une caméra : relais go2rtc et sortie directe de neolink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamUrls {
    pub high: String,
    pub low: String,
    pub neolink_high: String,
    pub neolink_low: String,
}

impl StreamUrls {
    pub fn new(host_ip: &str, go2rtc_port: u16, neolink_port: u16, identity: &str) -> Self {
        Self {
            high: format!("rtsp://{host_ip}:{go2rtc_port}/{identity}"),
            low: format!("rtsp://{host_ip}:{go2rtc_port}/{identity}_sub"),
            neolink_high: format!("rtsp://{host_ip}:{neolink_port}/{identity}/main"),
            neolink_low: format!("rtsp://{host_ip}:{neolink_port}/{identity}/sub"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEntry {
    pub name: String,
    #[serde(flatten)]
    pub urls: StreamUrls,
}

/// Vue de la configuration déclarée, mot de passe RTSP de neolink masqué.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub host_interface: String,
    pub neolink_port: u16,
    pub go2rtc_port: u16,
    pub log_level: String,
    pub onvif_username: String,
    pub onvif_password: String,
    pub neolink_rtsp_password: &'static str,
    pub cameras: Vec<DeviceConfigRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceConfigRow {
    pub name: String,
    pub address: Option<String>,
    pub uid: Option<String>,
    pub ip_mode: IpMode,
    pub onvif_ip: Option<String>,
    pub onvif_mac: Option<String>,
    pub onvif_port: u16,
    /// Résumé lisible, ex. `2560x1440 @25fps 6144kbps`
    pub stream_high: String,
    pub stream_low: String,
    pub is_battery: bool,
    pub enable_motion: bool,
    pub enable_battery: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceRow {
    pub name: String,
    pub address: Option<String>,
    pub ip_mode: IpMode,
    /// Adresse de gestion effective (table d'indirection ou statique)
    pub onvif_ip: ResolvedAddress,
    pub is_battery: bool,
    pub enable_motion: bool,
    pub enable_battery: bool,
    pub battery: Option<u8>,
    pub motion: MotionState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    pub streaming: bool,
    pub onvif_port: u16,
    pub onvif_url: Option<String>,
    pub streams: StreamUrls,
}
