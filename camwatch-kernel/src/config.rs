/**
 * CONFIGURATION - Sources déclaratives relues à chaque appel
 *
 * RÔLE :
 * Charge le document d'options (liste des caméras), le fichier des ports
 * effectifs des services et la configuration du broker MQTT.
 *
 * FONCTIONNEMENT :
 * - Pas de cache, pas de file-watch : chaque `load()` relit le fichier
 * - `read()` explicite et faillible, `load()` retombe sur un défaut sûr
 * - JSON par défaut, YAML si l'extension est .yaml / .yml
 */

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LoadError {
    pub fn is_missing(&self) -> bool {
        matches!(self, LoadError::Io(e) if e.kind() == ErrorKind::NotFound)
    }
}

/// Lecture one-shot d'un document, format choisi selon l'extension.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let txt = std::fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&txt)?),
        _ => Ok(serde_json::from_str(&txt)?),
    }
}

/// Fichiers écrits par d'autres process : absence = cas normal (debug),
/// contenu illisible = warning.
fn load_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    match read_document(path) {
        Ok(value) => value,
        Err(e) if e.is_missing() => {
            debug!("[config] no {what} at {}, using defaults", path.display());
            T::default()
        }
        Err(e) => {
            warn!("[config] failed to read {what} {}: {e}", path.display());
            T::default()
        }
    }
}

// ============ OPTIONS (caméras) ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpMode {
    #[default]
    Static,
    #[serde(alias = "dhcp")]
    Dynamic,
}

/// Caméra déclarée. L'identité (`name`) est aussi la clé de la table d'adresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    /// Adresse réseau de la caméra elle-même
    #[serde(default)]
    pub address: Option<String>,
    /// UID P2P Reolink, utilisé quand la caméra n'a pas d'adresse fixe
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub ip_mode: IpMode,
    /// Adresse de gestion (interface ONVIF émulée) configurée statiquement
    #[serde(default)]
    pub onvif_ip: Option<String>,
    #[serde(default)]
    pub onvif_mac: Option<String>,
    #[serde(default)]
    pub is_battery_camera: bool,
    #[serde(default)]
    pub enable_motion: bool,
    #[serde(default)]
    pub enable_battery: bool,
    #[serde(default)]
    pub stream_high_width: Option<u32>,
    #[serde(default)]
    pub stream_high_height: Option<u32>,
    #[serde(default)]
    pub stream_high_fps: Option<u32>,
    #[serde(default)]
    pub stream_high_bitrate: Option<u32>,
    #[serde(default)]
    pub stream_low_width: Option<u32>,
    #[serde(default)]
    pub stream_low_height: Option<u32>,
    #[serde(default)]
    pub stream_low_fps: Option<u32>,
    #[serde(default)]
    pub stream_low_bitrate: Option<u32>,
}

/// Paramètres d'encodage d'un flux, chaque valeur pouvant être absente.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamProfile {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub bitrate: Option<u32>,
}

impl fmt::Display for StreamProfile {
    /// `1920x1080 @25fps 4096kbps`, un `–` pour chaque valeur absente.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = |x: Option<u32>| x.map_or_else(|| "–".to_string(), |x| x.to_string());
        write!(
            f,
            "{}x{} @{}fps {}kbps",
            v(self.width),
            v(self.height),
            v(self.fps),
            v(self.bitrate)
        )
    }
}

impl Device {
    /// Adresse de gestion déclarée. Ignorée en mode dynamique : seule une
    /// adresse réellement attribuée (table d'indirection) fait foi.
    pub fn declared_management_address(&self) -> Option<&str> {
        match self.ip_mode {
            IpMode::Dynamic => None,
            IpMode::Static => non_empty(&self.onvif_ip),
        }
    }

    pub fn address(&self) -> Option<&str> {
        non_empty(&self.address)
    }

    pub fn uid(&self) -> Option<&str> {
        non_empty(&self.uid)
    }

    pub fn onvif_mac(&self) -> Option<&str> {
        non_empty(&self.onvif_mac)
    }

    pub fn high_profile(&self) -> StreamProfile {
        StreamProfile {
            width: self.stream_high_width,
            height: self.stream_high_height,
            fps: self.stream_high_fps,
            bitrate: self.stream_high_bitrate,
        }
    }

    pub fn low_profile(&self) -> StreamProfile {
        StreamProfile {
            width: self.stream_low_width,
            height: self.stream_low_height,
            fps: self.stream_low_fps,
            bitrate: self.stream_low_bitrate,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ONVIF_CREDENTIAL: &str = "admin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub cameras: Vec<Device>,
    pub host_interface: String,
    pub log_level: Option<String>,
    pub onvif_username: Option<String>,
    #[serde(skip_serializing)]
    pub onvif_password: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            host_interface: "eth0".into(),
            log_level: None,
            onvif_username: None,
            onvif_password: None,
        }
    }
}

/// Identifiants de l'interface ONVIF émulée, `admin`/`admin` à défaut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnvifCredentials {
    pub username: String,
    pub password: String,
}

impl Options {
    pub fn log_level(&self) -> &str {
        non_empty(&self.log_level).unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn onvif_credentials(&self) -> OnvifCredentials {
        OnvifCredentials {
            username: non_empty(&self.onvif_username)
                .unwrap_or(DEFAULT_ONVIF_CREDENTIAL)
                .to_string(),
            password: non_empty(&self.onvif_password)
                .unwrap_or(DEFAULT_ONVIF_CREDENTIAL)
                .to_string(),
        }
    }
}

/// Source unique de vérité pour les caméras déclarées.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Result<Options, LoadError> {
        read_document(&self.path)
    }

    /// Relit le document; toute erreur donne une config vide (aucune caméra).
    pub fn load(&self) -> Options {
        self.read().unwrap_or_else(|e| {
            warn!("[config] failed to read options {}: {e}", self.path.display());
            Options::default()
        })
    }
}

// ============ PORTS DES SERVICES ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicePorts {
    pub neolink: u16,
    pub go2rtc_rtsp: u16,
    pub go2rtc_api: u16,
    pub onvif_base: u16,
    pub dashboard: u16,
}

impl Default for ServicePorts {
    fn default() -> Self {
        Self {
            neolink: 8554,
            go2rtc_rtsp: 18554,
            go2rtc_api: 1984,
            onvif_base: 8001,
            dashboard: 8099,
        }
    }
}

/// Ports effectifs, écrits par le script de démarrage des services.
#[derive(Debug, Clone)]
pub struct PortsSource {
    path: PathBuf,
}

impl PortsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> ServicePorts {
        load_or_default(&self.path, "service ports")
    }
}

// ============ BROKER MQTT ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConf {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_available() -> bool {
    true
}

/// Paramètres du broker. Absents ou `available: false` = mode dégradé
/// supporté (bridge jamais démarré), pas une erreur.
#[derive(Debug, Clone)]
pub struct BrokerSource {
    path: PathBuf,
}

impl BrokerSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Option<MqttConf> {
        match read_document::<MqttConf>(&self.path) {
            Ok(conf) if conf.available => Some(conf),
            Ok(_) => None,
            Err(e) if e.is_missing() => None,
            Err(e) => {
                warn!("[config] failed to read MQTT config {}: {e}", self.path.display());
                None
            }
        }
    }
}

// ============ SETTINGS PROCESS ============

/// Emplacements des fichiers et port HTTP, depuis l'environnement (.env inclus).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub options_file: PathBuf,
    pub ports_file: PathBuf,
    pub ip_map_file: PathBuf,
    pub mqtt_file: PathBuf,
    pub http_port: Option<u16>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()))
        };
        Self {
            options_file: path("CAMWATCH_OPTIONS_FILE", "/data/options.json"),
            ports_file: path("CAMWATCH_PORTS_FILE", "/tmp/actual-ports.json"),
            ip_map_file: path("CAMWATCH_IP_MAP_FILE", "/tmp/camera-ips.json"),
            mqtt_file: path("CAMWATCH_MQTT_FILE", "/tmp/mqtt.json"),
            http_port: lookup("CAMWATCH_HTTP_PORT").and_then(|p| p.trim().parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{LogLevel, MessageLog};
    use crate::logging::MessageLogLayer;
    use std::collections::HashMap;
    use tracing_subscriber::layer::SubscriberExt;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_options_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "options.json", r#"{
            "host_interface": "end0",
            "cameras": [
                {"name": "front", "address": "192.168.1.20", "onvif_ip": "192.168.1.120",
                 "enable_motion": true, "uid": "95270001ABCDEF", "onvif_mac": "02:00:00:00:00:01",
                 "stream_high_width": 2560, "stream_high_height": 1440, "stream_high_fps": 25, "stream_high_bitrate": 6144,
                 "stream_low_width": 640, "stream_low_fps": 15},
                {"name": "garden", "ip_mode": "dhcp", "is_battery_camera": true, "enable_battery": true}
            ]
        }"#);

        let options = ConfigStore::new(&path).load();
        assert_eq!(options.host_interface, "end0");
        assert_eq!(options.cameras.len(), 2);
        assert_eq!(options.cameras[0].declared_management_address(), Some("192.168.1.120"));
        assert!(options.cameras[0].enable_motion);
        assert_eq!(options.cameras[1].ip_mode, IpMode::Dynamic);
        assert!(options.cameras[1].enable_battery);

        let front = &options.cameras[0];
        assert_eq!(front.uid(), Some("95270001ABCDEF"));
        assert_eq!(front.onvif_mac(), Some("02:00:00:00:00:01"));
        assert_eq!(front.high_profile().to_string(), "2560x1440 @25fps 6144kbps");
        assert_eq!(front.low_profile().to_string(), "640x– @15fps –kbps");
        assert_eq!(options.cameras[1].high_profile(), StreamProfile::default());
    }

    #[test]
    fn test_global_options_defaults() {
        let defaults = Options::default();
        assert_eq!(defaults.log_level(), "info");
        assert_eq!(
            defaults.onvif_credentials(),
            OnvifCredentials { username: "admin".into(), password: "admin".into() }
        );

        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "options.json", r#"{
            "log_level": "debug", "onvif_username": "unifi", "onvif_password": "",
            "cameras": []
        }"#);
        let options = ConfigStore::new(&path).load();
        assert_eq!(options.log_level(), "debug");
        let creds = options.onvif_credentials();
        assert_eq!(creds.username, "unifi");
        assert_eq!(creds.password, "admin");
    }

    #[test]
    fn test_load_options_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "options.yaml", "cameras:\n  - name: door\n    enable_motion: true\n");
        let options = ConfigStore::new(&path).load();
        assert_eq!(options.host_interface, "eth0");
        assert_eq!(options.cameras[0].name, "door");
    }

    #[test]
    fn test_dynamic_device_ignores_static_address() {
        let device = Device {
            name: "garden".into(),
            ip_mode: IpMode::Dynamic,
            onvif_ip: Some("10.0.0.9".into()),
            ..Device::default()
        };
        assert_eq!(device.declared_management_address(), None);
    }

    #[test]
    fn test_missing_options_degrade_and_warn() {
        let log = MessageLog::new();
        let subscriber = tracing_subscriber::registry().with(MessageLogLayer::sink(log.clone()));
        let store = ConfigStore::new("/nonexistent/options.json");

        assert!(store.read().is_err());
        let options = tracing::subscriber::with_default(subscriber, || store.load());

        assert!(options.cameras.is_empty());
        let lines = log.recent_entries(10);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].level, LogLevel::Warn);
        assert!(lines[0].msg.contains("options"));
    }

    #[test]
    fn test_malformed_options_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "options.json", "{ not json");
        let store = ConfigStore::new(&path);
        assert!(matches!(store.read(), Err(LoadError::Json(_))));
        assert_eq!(store.load(), Options::default());
    }

    #[test]
    fn test_service_ports_partial_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "ports.json", r#"{"neolink": 9554, "onvif_base": 8101}"#);
        let ports = PortsSource::new(&path).load();
        assert_eq!(ports.neolink, 9554);
        assert_eq!(ports.onvif_base, 8101);
        assert_eq!(ports.go2rtc_api, 1984);

        let missing = PortsSource::new(dir.path().join("absent.json")).load();
        assert_eq!(missing, ServicePorts::default());
    }

    #[test]
    fn test_broker_source() {
        let dir = tempfile::tempdir().unwrap();
        let ok = write(&dir, "mqtt.json", r#"{"host": "core-mosquitto", "username": "u", "password": "p"}"#);
        let conf = BrokerSource::new(&ok).load().unwrap();
        assert_eq!(conf.host, "core-mosquitto");
        assert_eq!(conf.port, 1883);
        assert!(!conf.ssl);

        let off = write(&dir, "off.json", r#"{"host": "x", "available": false}"#);
        assert_eq!(BrokerSource::new(&off).load(), None);
        assert_eq!(BrokerSource::new(dir.path().join("absent.json")).load(), None);
    }

    #[test]
    fn test_settings_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CAMWATCH_OPTIONS_FILE", "/etc/camwatch/options.yaml"),
            ("CAMWATCH_HTTP_PORT", "9000"),
        ]);
        let settings = Settings::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.options_file, PathBuf::from("/etc/camwatch/options.yaml"));
        assert_eq!(settings.ports_file, PathBuf::from("/tmp/actual-ports.json"));
        assert_eq!(settings.http_port, Some(9000));

        let defaults = Settings::from_lookup(|_| None);
        assert_eq!(defaults.mqtt_file, PathBuf::from("/tmp/mqtt.json"));
        assert_eq!(defaults.http_port, None);
    }
}
