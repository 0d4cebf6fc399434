/**
 * DISCOVERY - Annonces Home Assistant pour les capteurs des caméras
 *
 * RÔLE :
 * Construit les messages retained publiés à chaque (re)connexion au broker
 * pour que le frontal découvre les capteurs motion / batterie.
 *
 * FONCTIONNEMENT :
 * - Une annonce binary_sensor par caméra avec `enable_motion`
 * - Une annonce sensor par caméra avec `enable_battery`
 * - Contenu déterministe : republier à l'identique est sans effet
 */

use serde::Serialize;
use tracing::warn;

use crate::config::Device;

pub const DISCOVERY_PREFIX: &str = "homeassistant";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Serialize)]
struct DiscoveryDevice {
    identifiers: Vec<String>,
    name: String,
    manufacturer: &'static str,
    model: &'static str,
}

#[derive(Debug, Serialize)]
struct MotionSensorConfig {
    name: String,
    state_topic: String,
    payload_on: &'static str,
    payload_off: &'static str,
    device_class: &'static str,
    unique_id: String,
    device: DiscoveryDevice,
}

#[derive(Debug, Serialize)]
struct BatterySensorConfig {
    name: String,
    state_topic: String,
    unit_of_measurement: &'static str,
    device_class: &'static str,
    unique_id: String,
    device: DiscoveryDevice,
}

fn discovery_device(name: &str) -> DiscoveryDevice {
    DiscoveryDevice {
        identifiers: vec![format!("reolink_{name}")],
        name: format!("Reolink {name}"),
        manufacturer: "Reolink",
        model: "IP Camera",
    }
}

pub fn motion_topic(namespace: &str, identity: &str) -> String {
    format!("{namespace}/{identity}/status/motion")
}

pub fn battery_topic(namespace: &str, identity: &str) -> String {
    format!("{namespace}/{identity}/status/battery_level")
}

/// Annonces pour toutes les capacités activées, dans l'ordre des caméras.
pub fn announcements(namespace: &str, devices: &[Device]) -> Vec<Announcement> {
    let mut out = Vec::new();
    for device in devices {
        let name = &device.name;
        if device.enable_motion {
            let config = MotionSensorConfig {
                name: format!("{name} Motion"),
                state_topic: motion_topic(namespace, name),
                payload_on: "on",
                payload_off: "off",
                device_class: "motion",
                unique_id: format!("reolink_{name}_motion"),
                device: discovery_device(name),
            };
            push(&mut out, format!("{DISCOVERY_PREFIX}/binary_sensor/{name}_motion/config"), &config);
        }
        if device.enable_battery {
            let config = BatterySensorConfig {
                name: format!("{name} Battery"),
                state_topic: battery_topic(namespace, name),
                unit_of_measurement: "%",
                device_class: "battery",
                unique_id: format!("reolink_{name}_battery"),
                device: discovery_device(name),
            };
            push(&mut out, format!("{DISCOVERY_PREFIX}/sensor/{name}_battery/config"), &config);
        }
    }
    out
}

fn push<T: Serialize>(out: &mut Vec<Announcement>, topic: String, config: &T) {
    match serde_json::to_string(config) {
        Ok(payload) => out.push(Announcement { topic, payload }),
        Err(e) => warn!("[discovery] failed to serialize {topic}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, motion: bool, battery: bool) -> Device {
        Device {
            name: name.into(),
            is_battery_camera: battery,
            enable_motion: motion,
            enable_battery: battery,
            ..Device::default()
        }
    }

    #[test]
    fn test_announces_enabled_capabilities_only() {
        let devices = vec![device("front", true, false), device("garden", true, true), device("shed", false, false)];
        let msgs = announcements("neolink", &devices);
        let topics: Vec<&str> = msgs.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(
            topics,
            vec![
                "homeassistant/binary_sensor/front_motion/config",
                "homeassistant/binary_sensor/garden_motion/config",
                "homeassistant/sensor/garden_battery/config",
            ]
        );
    }

    #[test]
    fn test_motion_payload_shape() {
        let msgs = announcements("neolink", &[device("front", true, false)]);
        let json: serde_json::Value = serde_json::from_str(&msgs[0].payload).unwrap();
        assert_eq!(json["state_topic"], "neolink/front/status/motion");
        assert_eq!(json["payload_on"], "on");
        assert_eq!(json["device_class"], "motion");
        assert_eq!(json["unique_id"], "reolink_front_motion");
        assert_eq!(json["device"]["identifiers"][0], "reolink_front");
    }

    #[test]
    fn test_battery_payload_shape() {
        let msgs = announcements("neolink", &[device("garden", false, true)]);
        let json: serde_json::Value = serde_json::from_str(&msgs[0].payload).unwrap();
        assert_eq!(json["state_topic"], "neolink/garden/status/battery_level");
        assert_eq!(json["unit_of_measurement"], "%");
        assert_eq!(json["device_class"], "battery");
    }

    #[test]
    fn test_rediscovery_is_identical() {
        let devices = vec![device("front", true, true)];
        assert_eq!(announcements("neolink", &devices), announcements("neolink", &devices));
    }
}
