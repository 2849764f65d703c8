//! Asynchronous webhook delivery with jitter and induced failures.
//!
//! Each registration gets its own FIFO lane (an unbounded channel consumed
//! by one worker task), so deliveries for a single registration are never
//! reordered relative to emission order. Lanes run independently of each
//! other and of the request path; a slow or poisoned target never slows the
//! triggering request.

use super::{
    sign, DeliveryAttempt, DeliveryLog, DeliveryOutcome, DeliveryRecord, DispatcherConfig,
    EVENT_ID_HEADER, LEGACY_SIGNATURE_HEADER, SIGNATURE_HEADER, SIGNATURE_VERSION_HEADER,
};
use crate::store::events::{EventSink, HookTarget, StoreEvent};
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared client for outbound deliveries; timeouts are applied per request.
static HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn http_client() -> &'static reqwest::Client {
    HTTP_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .expect("Failed to create webhook client")
    })
}

#[derive(Debug)]
struct DeliveryJob {
    event_id: String,
    event_type: String,
    registration_id: String,
    url: String,
    secret: String,
    body: Vec<u8>,
}

/// Matches store events against registrations and hands deliveries to
/// per-registration worker lanes.
pub struct WebhookDispatcher {
    config: DispatcherConfig,
    lanes: Mutex<HashMap<String, mpsc::UnboundedSender<DeliveryJob>>>,
    log: Arc<DeliveryLog>,
}

impl WebhookDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        WebhookDispatcher {
            config,
            lanes: Mutex::new(HashMap::new()),
            log: Arc::new(DeliveryLog::default()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn log(&self) -> &DeliveryLog {
        &self.log
    }

    /// Queue one delivery job on the registration's lane, spawning the lane
    /// worker on first use.
    fn enqueue(&self, job: DeliveryJob) {
        let mut lanes = self.lanes.lock();
        let sender = lanes.entry(job.registration_id.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let config = self.config.clone();
            let log = Arc::clone(&self.log);
            tokio::spawn(run_lane(config, log, rx));
            tx
        });
        // A closed lane means the runtime is shutting down; deliveries are
        // best-effort abandoned at that point.
        if sender.send(job).is_err() {
            warn!("delivery lane closed, dropping job");
        }
    }
}

impl EventSink for WebhookDispatcher {
    fn emit(&self, event: StoreEvent, targets: Vec<HookTarget>) {
        let body = serde_json::to_vec(&event.payload).unwrap_or_default();
        for target in targets {
            if !target.matches(&event) {
                continue;
            }
            debug!(
                event = %event.event_type,
                registration = %target.registration.id,
                "webhook matched"
            );
            self.enqueue(DeliveryJob {
                event_id: event.id.clone(),
                event_type: event.event_type.clone(),
                registration_id: target.registration.id.clone(),
                url: target.registration.url.clone(),
                secret: target
                    .registration
                    .secret
                    .clone()
                    .unwrap_or_else(|| self.config.default_secret.clone()),
                body: body.clone(),
            });
        }
    }
}

/// One lane: deliver jobs strictly in order for a single registration.
async fn run_lane(
    config: DispatcherConfig,
    log: Arc<DeliveryLog>,
    mut rx: mpsc::UnboundedReceiver<DeliveryJob>,
) {
    while let Some(job) = rx.recv().await {
        deliver(&config, &log, job).await;
    }
}

#[derive(Debug, Clone, Copy)]
enum PoisonMode {
    Drop,
    Corrupt,
}

async fn deliver(config: &DispatcherConfig, log: &DeliveryLog, job: DeliveryJob) {
    // Decide jitter and poison up front; the rng must not live across await.
    let (jitter_ms, poison) = {
        let mut rng = rand::thread_rng();
        let jitter = if config.jitter_max_ms > config.jitter_min_ms {
            rng.gen_range(config.jitter_min_ms..=config.jitter_max_ms)
        } else {
            config.jitter_min_ms
        };
        let poison = if rng.gen::<f64>() < config.poison_probability {
            Some(if rng.gen_bool(0.5) {
                PoisonMode::Drop
            } else {
                PoisonMode::Corrupt
            })
        } else {
            None
        };
        (jitter, poison)
    };

    tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

    let delivery_id = Uuid::new_v4().to_string();

    if let Some(PoisonMode::Drop) = poison {
        debug!(url = %job.url, "poisoned delivery dropped");
        log.record(
            record(&delivery_id, &job, DeliveryOutcome::Poisoned),
            Some(DeliveryAttempt {
                delivery_id: delivery_id.clone(),
                registration_id: job.registration_id.clone(),
                url: job.url.clone(),
                status: None,
                error: Some("poisoned: request dropped".to_string()),
                latency_ms: 0,
                timestamp: Utc::now(),
            }),
        );
        return;
    }

    let body = match poison {
        Some(PoisonMode::Corrupt) => corrupt(&job.body),
        _ => job.body.clone(),
    };
    // The signature always covers the bytes actually sent, so a corrupted
    // body still carries a self-consistent signature and only the payload
    // shape trips the consumer.
    let signature = sign(&job.secret, &body);

    let started = Instant::now();
    let result = http_client()
        .post(&job.url)
        .timeout(config.send_timeout)
        .header("Content-Type", "application/json")
        .header(EVENT_ID_HEADER, &job.event_id)
        .header(SIGNATURE_VERSION_HEADER, "v2")
        .header(SIGNATURE_HEADER, format!("sha256={signature}"))
        .header(LEGACY_SIGNATURE_HEADER, format!("sha256={signature}"))
        .body(body)
        .send()
        .await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let (outcome, status, error) = match result {
        Ok(response) if response.status().is_success() => {
            (DeliveryOutcome::Delivered, Some(response.status().as_u16()), None)
        }
        Ok(response) => (
            DeliveryOutcome::Failed,
            Some(response.status().as_u16()),
            Some(format!("target responded {}", response.status())),
        ),
        Err(e) => (DeliveryOutcome::Failed, None, Some(e.to_string())),
    };
    let outcome = if poison.is_some() {
        DeliveryOutcome::Poisoned
    } else {
        outcome
    };

    if outcome != DeliveryOutcome::Delivered {
        debug!(url = %job.url, ?outcome, "webhook delivery did not succeed");
    }

    log.record(
        record(&delivery_id, &job, outcome),
        Some(DeliveryAttempt {
            delivery_id,
            registration_id: job.registration_id,
            url: job.url,
            status,
            error,
            latency_ms,
            timestamp: Utc::now(),
        }),
    );
}

fn record(delivery_id: &str, job: &DeliveryJob, outcome: DeliveryOutcome) -> DeliveryRecord {
    DeliveryRecord {
        id: delivery_id.to_string(),
        event_id: job.event_id.clone(),
        event_type: job.event_type.clone(),
        registration_id: job.registration_id.clone(),
        url: job.url.clone(),
        outcome,
        timestamp: Utc::now(),
    }
}

/// Truncate and mangle the payload so consumers see a parse failure.
fn corrupt(body: &[u8]) -> Vec<u8> {
    let mut corrupted = body[..body.len() / 2].to_vec();
    corrupted.extend_from_slice(b"\x00poisoned");
    corrupted
}
