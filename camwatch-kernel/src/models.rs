use serde::Serialize;
use std::collections::HashMap;
use time::OffsetDateTime;

/// État de mouvement dérivé de la télémétrie d'une caméra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    On,
    Off,
    #[default]
    Unknown,
}

impl MotionState {
    /// Seul le littéral `on` vaut mouvement, tout le reste vaut `off`.
    pub fn from_payload(payload: &str) -> Self {
        if payload == "on" {
            MotionState::On
        } else {
            MotionState::Off
        }
    }
}

/// Dernier état connu d'une caméra (une entrée par identité).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeviceState {
    pub battery: Option<u8>,
    pub motion: MotionState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
}

pub type DeviceStateMap = HashMap<String, DeviceState>;

/// Niveau de batterie en base 10, `None` si illisible ou hors 0..=100.
pub fn parse_battery_level(payload: &str) -> Option<u8> {
    payload
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|level| (0..=100).contains(level))
        .and_then(|level| u8::try_from(level).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_payload() {
        assert_eq!(MotionState::from_payload("on"), MotionState::On);
        assert_eq!(MotionState::from_payload("off"), MotionState::Off);
        assert_eq!(MotionState::from_payload("ON"), MotionState::Off);
        assert_eq!(MotionState::from_payload(""), MotionState::Off);
    }

    #[test]
    fn test_battery_payload() {
        assert_eq!(parse_battery_level("87"), Some(87));
        assert_eq!(parse_battery_level(" 100\n"), Some(100));
        assert_eq!(parse_battery_level("0"), Some(0));
        assert_eq!(parse_battery_level("abc"), None);
        assert_eq!(parse_battery_level("12.5"), None);
        assert_eq!(parse_battery_level("101"), None);
        assert_eq!(parse_battery_level("-3"), None);
    }

    #[test]
    fn test_default_state_serializes_nulls() {
        let json = serde_json::to_value(DeviceState::default()).unwrap();
        assert_eq!(json["battery"], serde_json::Value::Null);
        assert_eq!(json["motion"], "unknown");
        assert_eq!(json["last_seen"], serde_json::Value::Null);
    }
}
