/**
 * STATUS AGGREGATOR - Assemblage du snapshot de statut
 *
 * RÔLE :
 * Point d'entrée unique des handlers HTTP : compose services, MQTT et
 * caméras en un Snapshot immuable.
 *
 * FONCTIONNEMENT :
 * 1. Relit options, table d'adresses, ports et config broker
 * 2. Sondes TCP concurrentes (neolink, go2rtc, API go2rtc, ONVIF) +
 *    introspection des flux, jointure quand tout a répondu ou expiré
 * 3. Lit l'état MQTT maintenu par le bridge (pas de sonde)
 * 4. Une ligne par caméra : adresse résolue, état dérivé, streaming
 *
 * Ne peut pas échouer : chaque collaborateur en erreur dégrade son champ
 * (false / null / vide).
 */

use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

use crate::config::{BrokerSource, ConfigStore, PortsSource};
use crate::devices::DeviceStateStore;
use crate::health::ChannelStatus;
use crate::netinfo::detect_host_ip;
use crate::probe::{LivenessProbe, ProbeOutcome, ProbeTarget, TcpProber, DEFAULT_PROBE_TIMEOUT};
use crate::resolver::AddressResolver;
use crate::snapshot::{
    ConfigView, DeviceConfigRow, DeviceRow, Go2rtcService, MqttService, OnvifService, PortService, Services,
    Snapshot, StreamEntry, StreamUrls,
};
use crate::streams::{Go2rtcStreams, StreamIntrospector};

const LOCAL_HOST: &str = "127.0.0.1";
const MASKED: &str = "***";

/// Port ONVIF émulé de la caméra d'index `index` : `onvif_base + index`.
fn onvif_port(base: u16, index: usize) -> u16 {
    base.saturating_add(u16::try_from(index).unwrap_or(u16::MAX))
}

pub struct StatusAggregator {
    config: ConfigStore,
    resolver: AddressResolver,
    ports: PortsSource,
    broker: BrokerSource,
    states: DeviceStateStore,
    channel: ChannelStatus,
    prober: Arc<dyn LivenessProbe>,
    streams: Arc<dyn StreamIntrospector>,
    probe_timeout: Duration,
    /// Port réellement écouté, s'il diffère de celui du fichier des ports
    dashboard_port: Option<u16>,
}

impl StatusAggregator {
    pub fn new(
        config: ConfigStore,
        resolver: AddressResolver,
        ports: PortsSource,
        broker: BrokerSource,
        states: DeviceStateStore,
        channel: ChannelStatus,
    ) -> Self {
        Self {
            config,
            resolver,
            ports,
            broker,
            states,
            channel,
            prober: Arc::new(TcpProber),
            streams: Arc::new(Go2rtcStreams::new(LOCAL_HOST)),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            dashboard_port: None,
        }
    }

    pub fn with_dashboard_port(mut self, port: u16) -> Self {
        self.dashboard_port = Some(port);
        self
    }

    #[cfg(test)]
    pub fn with_prober(mut self, prober: Arc<dyn LivenessProbe>) -> Self {
        self.prober = prober;
        self
    }

    #[cfg(test)]
    pub fn with_streams(mut self, streams: Arc<dyn StreamIntrospector>) -> Self {
        self.streams = streams;
        self
    }

    #[cfg(test)]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub async fn snapshot(&self) -> Snapshot {
        let options = self.config.load();
        let table = self.resolver.load_table();
        let ports = self.ports.load();
        let broker = self.broker.load();
        let host_ip = detect_host_ip(&options.host_interface);

        let neolink = ProbeTarget::new(LOCAL_HOST, ports.neolink);
        let go2rtc = ProbeTarget::new(LOCAL_HOST, ports.go2rtc_rtsp);
        let go2rtc_api = ProbeTarget::new(LOCAL_HOST, ports.go2rtc_api);
        // Heuristique : la première caméra joignable sert de proxy pour le
        // serveur ONVIF entier. Pas de caméra ou pas d'adresse = rien à sonder.
        let onvif = options.cameras.first().and_then(|device| {
            table
                .resolve(&device.name, device.declared_management_address())
                .as_known()
                .map(|host| ProbeTarget::new(host, ports.onvif_base))
        });

        let timeout = self.probe_timeout;
        let onvif_probe = async {
            match &onvif {
                Some(target) => ProbeOutcome::from(self.prober.probe(target, timeout).await),
                None => ProbeOutcome::Skipped,
            }
        };
        let (neolink_up, go2rtc_up, go2rtc_api_up, onvif_outcome, activity) = tokio::join!(
            self.prober.probe(&neolink, timeout),
            self.prober.probe(&go2rtc, timeout),
            self.prober.probe(&go2rtc_api, timeout),
            onvif_probe,
            self.streams.activity(ports.go2rtc_api),
        );

        let devices = options
            .cameras
            .iter()
            .enumerate()
            .map(|(index, device)| {
                let onvif_ip = table.resolve(&device.name, device.declared_management_address());
                let state = self.states.state_or_default(&device.name);
                let onvif_port = onvif_port(ports.onvif_base, index);
                let onvif_url = onvif_ip.as_known().map(|ip| format!("http://{ip}:{onvif_port}"));
                DeviceRow {
                    name: device.name.clone(),
                    address: device.address().map(str::to_string),
                    ip_mode: device.ip_mode,
                    onvif_ip,
                    is_battery: device.is_battery_camera,
                    enable_motion: device.enable_motion,
                    enable_battery: device.enable_battery,
                    battery: state.battery,
                    motion: state.motion,
                    last_seen: state.last_seen,
                    streaming: activity.is_streaming(&device.name),
                    onvif_port,
                    onvif_url,
                    streams: StreamUrls::new(&host_ip, ports.go2rtc_rtsp, ports.neolink, &device.name),
                }
            })
            .collect();

        let services = Services {
            mqtt: MqttService {
                running: self.channel.is_connected(),
                state: self.channel.state(),
                reconnects: self.channel.reconnects(),
                host: broker.as_ref().map(|b| b.host.clone()),
                port: broker.as_ref().map(|b| b.port),
                ssl: broker.as_ref().is_some_and(|b| b.ssl),
                available: broker.is_some(),
            },
            neolink: PortService {
                running: neolink_up,
                port: ports.neolink,
            },
            go2rtc: Go2rtcService {
                running: go2rtc_up,
                port: ports.go2rtc_rtsp,
                api_port: ports.go2rtc_api,
                api_running: go2rtc_api_up,
            },
            onvif: OnvifService {
                running: onvif_outcome.is_up(),
                port: ports.onvif_base,
                probe: onvif_outcome,
            },
            dashboard: PortService {
                running: true,
                port: self.dashboard_port.unwrap_or(ports.dashboard),
            },
        };

        Snapshot {
            host_ip,
            services,
            devices,
            onvif_credentials: options.onvif_credentials(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// URLs RTSP de chaque caméra déclarée. Sans sonde ni réseau.
    pub fn stream_entries(&self) -> Vec<StreamEntry> {
        let options = self.config.load();
        let ports = self.ports.load();
        let host_ip = detect_host_ip(&options.host_interface);
        options
            .cameras
            .iter()
            .map(|device| StreamEntry {
                name: device.name.clone(),
                urls: StreamUrls::new(&host_ip, ports.go2rtc_rtsp, ports.neolink, &device.name),
            })
            .collect()
    }

    pub fn config_view(&self) -> ConfigView {
        let options = self.config.load();
        let ports = self.ports.load();
        let credentials = options.onvif_credentials();
        let cameras = options
            .cameras
            .iter()
            .enumerate()
            .map(|(index, device)| DeviceConfigRow {
                name: device.name.clone(),
                address: device.address().map(str::to_string),
                uid: device.uid().map(str::to_string),
                ip_mode: device.ip_mode,
                onvif_ip: device.onvif_ip.clone().filter(|ip| !ip.trim().is_empty()),
                onvif_mac: device.onvif_mac().map(str::to_string),
                onvif_port: onvif_port(ports.onvif_base, index),
                stream_high: device.high_profile().to_string(),
                stream_low: device.low_profile().to_string(),
                is_battery: device.is_battery_camera,
                enable_motion: device.enable_motion,
                enable_battery: device.enable_battery,
            })
            .collect();

        ConfigView {
            host_interface: options.host_interface.clone(),
            neolink_port: ports.neolink,
            go2rtc_port: ports.go2rtc_rtsp,
            log_level: options.log_level().to_string(),
            onvif_username: credentials.username,
            onvif_password: credentials.password,
            neolink_rtsp_password: MASKED,
            cameras,
        }
    }
}
