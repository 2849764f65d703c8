//! Webhook delivery subsystem: matching, simulated delivery, logs.

mod dispatcher;

pub use dispatcher::WebhookDispatcher;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;

/// Outbound signature headers.
pub const EVENT_ID_HEADER: &str = "X-Mock-Event-Id";
pub const SIGNATURE_VERSION_HEADER: &str = "X-Mock-Signature-Version";
pub const SIGNATURE_HEADER: &str = "X-Mock-Signature";
/// Legacy header carrying the same digest, kept for older consumers.
pub const LEGACY_SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Dispatcher tuning. All of it is injected; nothing is hard-coded at the
/// delivery sites.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    /// Probability in [0, 1] that a delivery is deliberately poisoned.
    pub poison_probability: f64,
    pub send_timeout: Duration,
    /// Signing secret for registrations without their own.
    pub default_secret: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            jitter_min_ms: 50,
            jitter_max_ms: 250,
            poison_probability: 0.0,
            send_timeout: Duration::from_secs(3),
            default_secret: "mock-webhook-secret".to_string(),
        }
    }
}

/// Digest over `secret + rawBody`, hex encoded. Documented, deliberately
/// simple; consumers verify by recomputing.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
    Poisoned,
}

/// One line of the append-only delivery log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub id: String,
    pub event_id: String,
    pub event_type: String,
    pub registration_id: String,
    pub url: String,
    pub outcome: DeliveryOutcome,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// One line of the structured attempt log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttempt {
    pub delivery_id: String,
    pub registration_id: String,
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Append-only delivery and attempt logs, inspectable via the operator
/// router.
#[derive(Default)]
pub struct DeliveryLog {
    deliveries: Mutex<Vec<DeliveryRecord>>,
    attempts: Mutex<Vec<DeliveryAttempt>>,
}

impl DeliveryLog {
    pub fn record(&self, record: DeliveryRecord, attempt: Option<DeliveryAttempt>) {
        self.deliveries.lock().push(record);
        if let Some(attempt) = attempt {
            self.attempts.lock().push(attempt);
        }
    }

    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.deliveries.lock().clone()
    }

    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        self.attempts.lock().clone()
    }

    /// Delivered/failed/poisoned counts per event type, for operator info.
    pub fn counts_by_event_type(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for record in self.deliveries.lock().iter() {
            *counts.entry(record.event_type.clone()).or_insert(0) += 1;
        }
        counts
    }
}
