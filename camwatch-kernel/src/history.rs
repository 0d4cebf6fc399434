/**
 * HISTORIQUES BORNÉS - Événements motion et lignes de log récents
 *
 * RÔLE :
 * Deux buffers circulaires indépendants, partagés entre le bridge MQTT,
 * le sink de logs et l'API HTTP.
 *
 * FONCTIONNEMENT :
 * - Insertion en tête, éviction FIFO de l'entrée la plus ancienne
 * - Lecture = copie des N plus récentes, de la plus récente à la plus ancienne
 * - Un Mutex par buffer, jamais tenu pendant un await
 */

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::models::MotionState;

pub const MOTION_LOG_CAPACITY: usize = 50;
pub const MESSAGE_LOG_CAPACITY: usize = 200;

/// Buffer circulaire borné, clonable à bas coût (Arc interne).
#[derive(Debug)]
pub struct BoundedLog<T> {
    entries: Arc<Mutex<VecDeque<T>>>,
    capacity: usize,
}

impl<T> Clone for BoundedLog<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone> BoundedLog<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, entry: T) {
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Les `limit` entrées les plus récentes, la plus récente en premier.
    pub fn recent_entries(&self, limit: usize) -> Vec<T> {
        self.entries.lock().iter().take(limit).cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MotionEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub camera: String,
    pub state: MotionState,
}

impl MotionEvent {
    pub fn on(camera: impl Into<String>, time: OffsetDateTime) -> Self {
        Self {
            time,
            camera: camera.into(),
            state: MotionState::On,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub level: LogLevel,
    pub msg: String,
}

impl LogLine {
    pub fn now(level: LogLevel, msg: impl Into<String>) -> Self {
        Self {
            time: OffsetDateTime::now_utc(),
            level,
            msg: msg.into(),
        }
    }
}

pub type MotionLog = BoundedLog<MotionEvent>;
pub type MessageLog = BoundedLog<LogLine>;

impl BoundedLog<MotionEvent> {
    pub fn new() -> Self {
        Self::with_capacity(MOTION_LOG_CAPACITY)
    }
}

impl BoundedLog<LogLine> {
    pub fn new() -> Self {
        Self::with_capacity(MESSAGE_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_most_recent_newest_first() {
        let log: BoundedLog<u32> = BoundedLog::with_capacity(5);
        for i in 0..12 {
            log.push(i);
            assert!(log.len() <= 5);
        }
        assert_eq!(log.recent_entries(5), vec![11, 10, 9, 8, 7]);
        assert_eq!(log.recent_entries(2), vec![11, 10]);
        assert_eq!(log.recent_entries(100).len(), 5);
    }

    #[test]
    fn test_motion_log_capacity() {
        let log = MotionLog::new();
        let t0 = OffsetDateTime::UNIX_EPOCH;
        for i in 0..(MOTION_LOG_CAPACITY + 7) {
            log.push(MotionEvent::on(format!("cam{i}"), t0));
        }
        let entries = log.recent_entries(MOTION_LOG_CAPACITY);
        assert_eq!(entries.len(), MOTION_LOG_CAPACITY);
        assert_eq!(entries[0].camera, format!("cam{}", MOTION_LOG_CAPACITY + 6));
        assert_eq!(entries[MOTION_LOG_CAPACITY - 1].camera, "cam7");
    }

    #[test]
    fn test_message_log_capacity() {
        let log = MessageLog::new();
        assert_eq!(log.capacity(), MESSAGE_LOG_CAPACITY);
        for i in 0..(MESSAGE_LOG_CAPACITY * 2) {
            log.push(LogLine::now(LogLevel::Info, i.to_string()));
        }
        assert_eq!(log.len(), MESSAGE_LOG_CAPACITY);
        let entries = log.recent_entries(MESSAGE_LOG_CAPACITY);
        assert_eq!(entries[0].msg, (MESSAGE_LOG_CAPACITY * 2 - 1).to_string());
        assert_eq!(entries.last().unwrap().msg, MESSAGE_LOG_CAPACITY.to_string());
    }

    #[test]
    fn test_concurrent_writers() {
        let log: BoundedLog<usize> = BoundedLog::with_capacity(64);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        log.push(t * 1000 + i);
                        let _ = log.recent_entries(10);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 64);
    }
}
