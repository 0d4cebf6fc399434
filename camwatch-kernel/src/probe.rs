use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

/// Résultat d'une sonde. `Skipped` = rien à sonder, à ne pas confondre avec `Down`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Up,
    Down,
    Skipped,
}

impl ProbeOutcome {
    pub fn is_up(self) -> bool {
        self == ProbeOutcome::Up
    }
}

impl From<bool> for ProbeOutcome {
    fn from(up: bool) -> Self {
        if up {
            ProbeOutcome::Up
        } else {
            ProbeOutcome::Down
        }
    }
}

/// Vérification de joignabilité bornée par un timeout. Ne remonte jamais
/// d'erreur : refus, timeout ou DNS en échec valent `false`.
pub trait LivenessProbe: Send + Sync {
    fn probe<'a>(&'a self, target: &'a ProbeTarget, timeout: Duration) -> BoxFuture<'a, bool>;
}

/// Sonde TCP : vrai dès que la connexion est établie.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

impl TcpProber {
    pub async fn check(host: &str, port: u16, timeout: Duration) -> bool {
        bounded_attempt(host, port, timeout, TcpStream::connect((host, port))).await
    }
}

/// Le stream (ou la tentative en cours) est droppé sur chaque branche.
async fn bounded_attempt<T>(
    host: &str,
    port: u16,
    timeout: Duration,
    attempt: impl Future<Output = io::Result<T>>,
) -> bool {
    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!("[probe] {host}:{port} unreachable: {e}");
            false
        }
        Err(_) => {
            debug!("[probe] {host}:{port} timed out after {timeout:?}");
            false
        }
    }
}

impl LivenessProbe for TcpProber {
    fn probe<'a>(&'a self, target: &'a ProbeTarget, timeout: Duration) -> BoxFuture<'a, bool> {
        Box::pin(Self::check(&target.host, target.port, timeout))
    }
}
