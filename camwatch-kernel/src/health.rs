use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// État de la connexion au broker, maintenu en continu par le bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Aucun broker configuré : le bridge ne démarre jamais
    Disabled,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Clone)]
pub struct ChannelStatus {
    state: Arc<parking_lot::Mutex<ConnectionState>>,
    reconnects: Arc<AtomicU32>,
}

impl ChannelStatus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(parking_lot::Mutex::new(ConnectionState::Disabled)),
            reconnects: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn mark_connecting(&self) {
        *self.state.lock() = ConnectionState::Connecting;
    }

    pub fn mark_connected(&self) {
        *self.state.lock() = ConnectionState::Connected;
    }

    /// Chaque perte de connexion compte comme une tentative de reconnexion à venir.
    pub fn mark_disconnected(&self) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Disconnected {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
        *state = ConnectionState::Disconnected;
    }

    /// Déconnexion volontaire (arrêt du daemon) : pas de reconnexion à compter.
    pub fn mark_closed(&self) {
        *self.state.lock() = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        let status = ChannelStatus::new();
        assert_eq!(status.state(), ConnectionState::Disabled);
        assert!(!status.is_connected());

        status.mark_connecting();
        status.mark_connected();
        assert!(status.is_connected());

        status.mark_disconnected();
        status.mark_disconnected();
        assert_eq!(status.reconnects(), 1);
        assert!(!status.is_connected());

        status.mark_connecting();
        status.mark_connected();
        status.mark_disconnected();
        assert_eq!(status.reconnects(), 2);

        status.mark_connecting();
        status.mark_connected();
        status.mark_closed();
        assert_eq!(status.state(), ConnectionState::Disconnected);
        assert_eq!(status.reconnects(), 2);
    }
}
