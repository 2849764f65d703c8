//! Store-emitted events and the sink the dispatcher implements.

use super::entities::{WebhookRegistration, WorkItem};
use crate::query::QueryPlan;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

/// Event types a webhook registration can subscribe to.
pub const EVENT_TYPES: [&str; 2] = ["item_created", "item_updated"];

/// A state-change notification, captured before the triggering response is
/// built.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// Flattened fields the dispatcher matches filter plans against.
    pub fields: HashMap<String, Vec<String>>,
}

impl StoreEvent {
    /// Build an item lifecycle event with its flattened match fields.
    pub fn for_item(event_type: &str, item: &WorkItem, status_name: &str) -> Self {
        let mut fields = HashMap::new();
        fields.insert("key".to_string(), vec![item.key.clone()]);
        fields.insert("project".to_string(), vec![item.project_key.clone()]);
        fields.insert("status".to_string(), vec![status_name.to_string()]);
        fields.insert("type".to_string(), vec![item.issue_type_id.clone()]);
        fields.insert("reporter".to_string(), vec![item.reporter_id.clone()]);
        if let Some(assignee) = &item.assignee_id {
            fields.insert("assignee".to_string(), vec![assignee.clone()]);
        }
        if !item.labels.is_empty() {
            fields.insert("labels".to_string(), item.labels.clone());
        }

        let timestamp = Utc::now();
        StoreEvent {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            timestamp,
            payload: json!({
                "webhookEvent": event_type,
                "timestamp": timestamp,
                "item": item,
            }),
            fields,
        }
    }
}

/// A registration paired with its pre-parsed filter plan.
#[derive(Debug, Clone)]
pub struct HookTarget {
    pub registration: WebhookRegistration,
    pub plan: Option<QueryPlan>,
}

impl HookTarget {
    /// Event-type subscription plus optional filter match.
    pub fn matches(&self, event: &StoreEvent) -> bool {
        if !self.registration.events.iter().any(|e| e == &event.event_type) {
            return false;
        }
        match &self.plan {
            Some(plan) => plan.matches_flat(&event.fields),
            None => true,
        }
    }
}

/// Receiver for store events. The dispatcher implements this; tests use
/// [`NullSink`] or a recording stand-in.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StoreEvent, targets: Vec<HookTarget>);
}

/// Sink that drops everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: StoreEvent, _targets: Vec<HookTarget>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query;
    use chrono::Utc;

    fn registration(events: &[&str], filter: Option<&str>) -> HookTarget {
        HookTarget {
            registration: WebhookRegistration {
                id: "hook-1".to_string(),
                url: "http://localhost:9/hook".to_string(),
                events: events.iter().map(|e| e.to_string()).collect(),
                filter: filter.map(|f| f.to_string()),
                secret: None,
                created: Utc::now(),
            },
            plan: filter.map(|f| query::parse(f).unwrap()),
        }
    }

    fn sample_event(project: &str) -> StoreEvent {
        let mut fields = HashMap::new();
        fields.insert("project".to_string(), vec![project.to_string()]);
        StoreEvent {
            id: "e-1".to_string(),
            event_type: "item_created".to_string(),
            timestamp: Utc::now(),
            payload: json!({}),
            fields,
        }
    }

    #[test]
    fn test_event_type_subscription() {
        let target = registration(&["item_updated"], None);
        assert!(!target.matches(&sample_event("DEV")));

        let target = registration(&["item_created", "item_updated"], None);
        assert!(target.matches(&sample_event("DEV")));
    }

    #[test]
    fn test_filter_narrows_matching() {
        let target = registration(&["item_created"], Some("project = DEV"));
        assert!(target.matches(&sample_event("DEV")));
        assert!(!target.matches(&sample_event("SUP")));
    }

    #[test]
    fn test_absent_filter_matches_unconditionally() {
        let target = registration(&["item_created"], None);
        assert!(target.matches(&sample_event("SUP")));
    }
}
