use parking_lot::Mutex;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::models::{DeviceState, DeviceStateMap, MotionState};

/// État dérivé par caméra. Écrit uniquement par le handler de télémétrie,
/// lu par l'agrégateur. Les entrées ne sont jamais supprimées.
#[derive(Debug, Clone, Default)]
pub struct DeviceStateStore {
    states: Arc<Mutex<DeviceStateMap>>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_motion(&self, identity: &str, motion: MotionState, at: OffsetDateTime) {
        let mut states = self.states.lock();
        let state = states.entry(identity.to_string()).or_default();
        state.motion = motion;
        state.last_seen = Some(at);
    }

    /// Un payload illisible efface le niveau mais prouve que la caméra vit.
    pub fn record_battery(&self, identity: &str, level: Option<u8>, at: OffsetDateTime) {
        let mut states = self.states.lock();
        let state = states.entry(identity.to_string()).or_default();
        state.battery = level;
        state.last_seen = Some(at);
    }

    pub fn get(&self, identity: &str) -> Option<DeviceState> {
        self.states.lock().get(identity).cloned()
    }

    /// Lecture sans effet de bord : une caméra jamais vue donne l'état par défaut.
    pub fn state_or_default(&self, identity: &str) -> DeviceState {
        self.get(identity).unwrap_or_default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_entries_created_lazily() {
        let store = DeviceStateStore::new();
        assert!(store.is_empty());
        assert_eq!(store.state_or_default("front"), DeviceState::default());
        assert!(store.is_empty());

        let at = datetime!(2026-10-19 08:00 UTC);
        store.record_motion("front", MotionState::On, at);
        let state = store.get("front").unwrap();
        assert_eq!(state.motion, MotionState::On);
        assert_eq!(state.battery, None);
        assert_eq!(state.last_seen, Some(at));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_battery_failure_still_updates_last_seen() {
        let store = DeviceStateStore::new();
        let t1 = datetime!(2026-10-19 08:00 UTC);
        let t2 = datetime!(2026-10-19 08:05 UTC);
        store.record_battery("garden", Some(64), t1);
        store.record_battery("garden", None, t2);

        let state = store.get("garden").unwrap();
        assert_eq!(state.battery, None);
        assert_eq!(state.last_seen, Some(t2));
        assert_eq!(state.motion, MotionState::Unknown);
    }
}
