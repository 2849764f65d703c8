//! Webhook registration admin operations.

use super::entities::WebhookRegistration;
use super::events::EVENT_TYPES;
use super::Store;
use crate::error::ApiError;
use crate::query;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWebhook {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    pub filter: Option<String>,
    pub secret: Option<String>,
}

impl Store {
    /// Register a webhook. The filter expression is parsed strictly here so
    /// malformed filters are rejected up front instead of silently matching
    /// nothing at dispatch time.
    pub fn register_webhook(&self, req: RegisterWebhook) -> Result<WebhookRegistration, ApiError> {
        if !req.url.starts_with("http://") && !req.url.starts_with("https://") {
            return Err(ApiError::field("url", "url must be an http(s) URL"));
        }
        if req.events.is_empty() {
            return Err(ApiError::field("events", "at least one event type is required"));
        }
        for event in &req.events {
            if !EVENT_TYPES.contains(&event.as_str()) {
                return Err(ApiError::field(
                    "events",
                    format!("unknown event type '{event}', expected one of {EVENT_TYPES:?}"),
                ));
            }
        }
        let plan = match &req.filter {
            Some(filter) => {
                Some(query::parse(filter).map_err(|e| ApiError::field("filter", e.to_string()))?)
            }
            None => None,
        };

        let registration = WebhookRegistration {
            id: Uuid::new_v4().to_string(),
            url: req.url,
            events: req.events,
            filter: req.filter,
            secret: req.secret,
            created: Utc::now(),
        };

        let mut state = self.state.write();
        if let Some(plan) = plan {
            state
                .webhook_plans
                .insert(registration.id.clone(), plan);
        }
        state
            .webhooks
            .insert(registration.id.clone(), registration.clone());
        info!(id = %registration.id, url = %registration.url, "webhook registered");
        Ok(registration)
    }

    pub fn list_webhooks(&self) -> Vec<WebhookRegistration> {
        let state = self.state.read();
        let mut hooks: Vec<WebhookRegistration> = state.webhooks.values().cloned().collect();
        hooks.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        hooks
    }

    pub fn get_webhook(&self, id: &str) -> Result<WebhookRegistration, ApiError> {
        self.state
            .read()
            .webhooks
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Webhook {id} does not exist")))
    }

    pub fn delete_webhook(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.state.write();
        state
            .webhooks
            .remove(id)
            .ok_or_else(|| ApiError::not_found(format!("Webhook {id} does not exist")))?;
        state.webhook_plans.remove(id);
        info!(id, "webhook deleted");
        Ok(())
    }
}
