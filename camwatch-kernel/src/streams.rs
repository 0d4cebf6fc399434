use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

const STREAM_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Ensemble des flux ayant au moins un consommateur, à un instant donné.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamActivity {
    active: HashSet<String>,
}

impl StreamActivity {
    /// Corps de `GET /api/streams` de go2rtc : `{ "<nom>": { "consumers": [...] } }`.
    pub fn from_json(body: &Value) -> Self {
        let active = body
            .as_object()
            .map(|streams| {
                streams
                    .iter()
                    .filter(|(_, info)| has_consumers(info))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        Self { active }
    }

    pub fn is_streaming(&self, identity: &str) -> bool {
        self.active.contains(identity)
    }
}

fn has_consumers(info: &Value) -> bool {
    ["consumers", "clients"].iter().any(|key| {
        info.get(key)
            .and_then(Value::as_array)
            .is_some_and(|list| !list.is_empty())
    })
}

/// Collaborateur externe best-effort : tout échec donne une activité vide.
pub trait StreamIntrospector: Send + Sync {
    fn activity(&self, api_port: u16) -> BoxFuture<'_, StreamActivity>;
}

/// Interroge l'API HTTP locale de go2rtc.
pub struct Go2rtcStreams {
    http: reqwest::Client,
    host: String,
}

impl Go2rtcStreams {
    pub fn new(host: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(STREAM_QUERY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            host: host.into(),
        }
    }

    async fn fetch(&self, api_port: u16) -> Result<Value, reqwest::Error> {
        let url = format!("http://{}:{}/api/streams", self.host, api_port);
        self.http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    }
}

impl StreamIntrospector for Go2rtcStreams {
    fn activity(&self, api_port: u16) -> BoxFuture<'_, StreamActivity> {
        Box::pin(async move {
            match self.fetch(api_port).await {
                Ok(body) => StreamActivity::from_json(&body),
                Err(e) => {
                    debug!("[streams] go2rtc query on port {api_port} failed: {e}");
                    StreamActivity::default()
                }
            }
        })
    }
}
