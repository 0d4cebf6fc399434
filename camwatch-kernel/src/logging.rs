/**
 * LOGGING - Sortie console + miroir dans le MessageLog
 *
 * RÔLE :
 * Tout événement `tracing` de niveau INFO ou plus est recopié dans le buffer
 * borné des logs, pour l'introspection à distance via GET /api/logs.
 *
 * FONCTIONNEMENT :
 * - Registry tracing-subscriber avec deux layers
 * - fmt (stderr, filtré par RUST_LOG, défaut = log_level des options)
 * - MessageLogLayer (sink vers le buffer circulaire), filtré à INFO par layer
 *   pour que DEBUG/TRACE ne remontent jamais le niveau max global
 */

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{Filtered, LevelFilter};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::history::{LogLevel, LogLine, MessageLog};

/// Sink tracing qui alimente le MessageLog.
pub struct MessageLogLayer {
    log: MessageLog,
}

impl MessageLogLayer {
    pub fn new(log: MessageLog) -> Self {
        Self { log }
    }

    /// Le sink tel qu'installé : INFO et au-dessus uniquement.
    pub fn sink<S: Subscriber>(log: MessageLog) -> Filtered<Self, LevelFilter, S> {
        Self::new(log).with_filter(LevelFilter::INFO)
    }
}

impl<S: Subscriber> Layer<S> for MessageLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.log.push(LogLine::now(log_level(level), visitor.finish()));
    }
}

fn log_level(level: Level) -> LogLevel {
    match level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        format!("{} {}", self.message, self.fields.join(" "))
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Installe le subscriber global. À appeler une seule fois, au démarrage.
pub fn init(message_log: MessageLog, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(MessageLogLayer::sink(message_log))
        .init();
}
