use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flyermap::geo::{GeoTransport, TransportReply};
use flyermap::models::PolygonFeature;
use flyermap::store::{MemoryBackend, NewTeamMember, NewZone, Store};

/// Opens a store over a fresh in-memory backend. The backend handle is
/// returned too so tests can count writes and inspect the saved
/// document.
pub async fn memory_store() -> (Store<MemoryBackend>, MemoryBackend) {
    let backend = MemoryBackend::new();
    let store = Store::open(backend.clone())
        .await
        .expect("Failed to open test store");
    (store, backend)
}

/// A small square near Paris, exterior ring closed.
pub fn square_feature() -> PolygonFeature {
    PolygonFeature::polygon(vec![
        [2.0, 48.0],
        [2.01, 48.0],
        [2.01, 48.01],
        [2.0, 48.01],
        [2.0, 48.0],
    ])
}

pub fn make_member(name: &str) -> NewTeamMember {
    NewTeamMember {
        name: name.to_string(),
        address: "1 Rue de la Paix, 75002 Paris".to_string(),
        phone: None,
        lat: 48.8687,
        lng: 2.3316,
        geocode_score: 0.92,
    }
}

pub fn make_zone(name: &str) -> NewZone {
    NewZone {
        name: name.to_string(),
        geojson: square_feature(),
        assigned_members: Vec::new(),
        notes: None,
    }
}

/// An `out count;` reply with the total carried as a string tag, the
/// shape current Overpass servers produce.
pub fn count_reply(total: u64) -> String {
    format!(r#"{{"elements":[{{"type":"count","id":0,"tags":{{"total":"{total}"}}}}]}}"#)
}

/// An `out tags;` reply listing named ways.
pub fn streets_reply(names: &[&str]) -> String {
    let elements: Vec<String> = names
        .iter()
        .map(|name| format!(r#"{{"type":"way","tags":{{"name":"{name}"}}}}"#))
        .collect();
    format!(r#"{{"elements":[{}]}}"#, elements.join(","))
}

/// A single-feature address search reply.
pub fn geocode_reply(lat: f64, lng: f64, label: &str, score: f64) -> String {
    format!(
        r#"{{"features":[{{"geometry":{{"coordinates":[{lng},{lat}]}},"properties":{{"label":"{label}","score":{score}}}}}]}}"#
    )
}

#[derive(Debug, Clone)]
pub enum MockOutcome {
    Reply { status: u16, body: String },
    Failure(String),
}

#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub delay: Option<Duration>,
    pub outcome: MockOutcome,
}

/// One request the mock transport saw, in arrival order.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct MockState {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

/// Transport that answers from a scripted reply queue and records every
/// request. Cloning shares the queue and the call log.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, status: u16, body: &str) {
        self.push(ScriptedReply {
            delay: None,
            outcome: MockOutcome::Reply {
                status,
                body: body.to_string(),
            },
        });
    }

    /// Script a reply that settles only after the given delay.
    pub fn push_reply_after(&self, delay: Duration, status: u16, body: &str) {
        self.push(ScriptedReply {
            delay: Some(delay),
            outcome: MockOutcome::Reply {
                status,
                body: body.to_string(),
            },
        });
    }

    pub fn push_failure(&self, message: &str) {
        self.push(ScriptedReply {
            delay: None,
            outcome: MockOutcome::Failure(message.to_string()),
        });
    }

    fn push(&self, reply: ScriptedReply) {
        self.state
            .replies
            .lock()
            .expect("mock reply queue mutex poisoned")
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state
            .calls
            .lock()
            .expect("mock call log mutex poisoned")
            .clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.url == url).count()
    }

    fn take_next(
        &self,
        method: &'static str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Option<ScriptedReply> {
        self.state
            .calls
            .lock()
            .expect("mock call log mutex poisoned")
            .push(RecordedCall {
                method,
                url: url.to_string(),
                params: params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
        self.state
            .replies
            .lock()
            .expect("mock reply queue mutex poisoned")
            .pop_front()
    }

    async fn respond(
        &self,
        method: &'static str,
        url: &str,
        params: &[(&str, &str)],
    ) -> anyhow::Result<TransportReply> {
        let scripted = self
            .take_next(method, url, params)
            .unwrap_or_else(|| panic!("no scripted reply left for {method} {url}"));
        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }
        match scripted.outcome {
            MockOutcome::Reply { status, body } => Ok(TransportReply { status, body }),
            MockOutcome::Failure(message) => Err(anyhow::anyhow!(message)),
        }
    }
}

impl GeoTransport for MockTransport {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<TransportReply> {
        self.respond("GET", url, query).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> anyhow::Result<TransportReply> {
        self.respond("POST", url, form).await
    }
}
