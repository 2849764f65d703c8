//! Entity store engine: the single owner of all mutable domain state.
//!
//! Callers only ever go through method-level access; no caller holds a
//! reference into the internal maps. Mutations happen under one store-wide
//! write lock, reads under a shared lock, so key generation and lookups stay
//! consistent across concurrent requests.

pub mod entities;
pub mod events;
mod seed;

mod agile;
mod desk;
mod hooks;
mod items;

pub use items::{CreateWorkItem, WorkItemPatch};
pub use agile::{CreateSprint, SprintPatch};
pub use desk::CreateRequest;
pub use hooks::RegisterWebhook;
pub use seed::{empty_state, sample_state};

use crate::error::ApiError;
use crate::query::QueryPlan;
use entities::{
    Board, FieldMeta, IssueType, Project, ServiceRequest, Sprint, Status, StatusCategory,
    TokenInfo, Transition, User, WebhookRegistration, WorkItem,
};
use events::{EventSink, HookTarget, StoreEvent};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// The whole mutable state, serializable as the export/import snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    pub users: HashMap<String, User>,
    pub projects: HashMap<String, Project>,
    pub issue_types: HashMap<String, IssueType>,
    pub status_categories: Vec<StatusCategory>,
    pub statuses: HashMap<String, Status>,
    pub transitions: Vec<Transition>,
    pub items: HashMap<String, WorkItem>,
    /// Per-project monotonic key counters (`DEV` -> 3 means `DEV-3` was the
    /// last key handed out).
    pub item_counters: HashMap<String, u64>,
    pub boards: HashMap<u64, Board>,
    pub sprints: HashMap<u64, Sprint>,
    /// Service requests keyed by their linked work-item key.
    pub requests: HashMap<String, ServiceRequest>,
    pub webhooks: HashMap<String, WebhookRegistration>,
    pub tokens: HashMap<String, TokenInfo>,
    pub next_item_id: u64,
    pub next_comment_id: u64,
    pub next_sprint_id: u64,
    pub next_request_id: u64,
    pub next_approval_id: u64,
    /// Parsed webhook filter plans, rebuilt on import rather than serialized.
    #[serde(skip)]
    pub(crate) webhook_plans: HashMap<String, QueryPlan>,
}

impl StoreState {
    /// Re-parse every registration filter. Fails without partial effects, so
    /// import can validate before swapping state in.
    pub(crate) fn rebuild_webhook_plans(&mut self) -> Result<(), ApiError> {
        let mut plans = HashMap::new();
        for hook in self.webhooks.values() {
            if let Some(filter) = &hook.filter {
                let plan = crate::query::parse(filter).map_err(|e| {
                    ApiError::field("filter", format!("webhook {}: {e}", hook.id))
                })?;
                plans.insert(hook.id.clone(), plan);
            }
        }
        self.webhook_plans = plans;
        Ok(())
    }

    fn status_name(&self, status_id: &str) -> String {
        self.statuses
            .get(status_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| status_id.to_string())
    }

    /// Snapshot of all registrations with their plans, for event fan-out.
    fn hook_targets(&self) -> Vec<HookTarget> {
        self.webhooks
            .values()
            .map(|registration| HookTarget {
                plan: self.webhook_plans.get(&registration.id).cloned(),
                registration: registration.clone(),
            })
            .collect()
    }
}

/// Shared handle to the engine.
pub struct Store {
    state: RwLock<StoreState>,
    /// State to return to on `reset()` - whatever the process booted with.
    baseline: StoreState,
    sink: Arc<dyn EventSink>,
}

impl Store {
    pub fn new(mut initial: StoreState, sink: Arc<dyn EventSink>) -> Self {
        // Seed data is trusted; a filter that fails to parse here is a bug.
        if initial.rebuild_webhook_plans().is_err() {
            initial.webhooks.clear();
            initial.webhook_plans.clear();
        }
        Store {
            baseline: initial.clone(),
            state: RwLock::new(initial),
            sink,
        }
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn lookup_token(&self, token: &str) -> Option<TokenInfo> {
        self.state.read().tokens.get(token).cloned()
    }

    pub fn get_user(&self, account_id: &str) -> Result<User, ApiError> {
        self.state
            .read()
            .users
            .get(account_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("User {account_id} does not exist")))
    }

    pub fn list_projects(&self) -> Vec<Project> {
        let state = self.state.read();
        let mut projects: Vec<Project> = state.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.key.cmp(&b.key));
        projects
    }

    pub fn get_project(&self, key: &str) -> Result<Project, ApiError> {
        self.state
            .read()
            .projects
            .get(key)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Project {key} does not exist")))
    }

    pub fn list_statuses(&self) -> Vec<Status> {
        let state = self.state.read();
        let mut statuses: Vec<Status> = state.statuses.values().cloned().collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    pub fn list_issue_types(&self) -> Vec<IssueType> {
        let state = self.state.read();
        let mut types: Vec<IssueType> = state.issue_types.values().cloned().collect();
        types.sort_by(|a, b| a.id.cmp(&b.id));
        types
    }

    pub fn list_fields(&self) -> Vec<FieldMeta> {
        seed::field_catalog()
    }

    /// Entity counts for the operator info endpoint.
    pub fn counts(&self) -> HashMap<String, usize> {
        let state = self.state.read();
        let mut counts = HashMap::new();
        counts.insert("users".to_string(), state.users.len());
        counts.insert("projects".to_string(), state.projects.len());
        counts.insert("items".to_string(), state.items.len());
        counts.insert("boards".to_string(), state.boards.len());
        counts.insert("sprints".to_string(), state.sprints.len());
        counts.insert("requests".to_string(), state.requests.len());
        counts.insert("webhooks".to_string(), state.webhooks.len());
        counts
    }

    // ------------------------------------------------------------------
    // Snapshot operations
    // ------------------------------------------------------------------

    /// Owned copy of the entire state, counters included.
    pub fn export_state(&self) -> StoreState {
        self.state.read().clone()
    }

    /// Atomic whole-store replace. The snapshot is validated first; on any
    /// failure the current state is untouched.
    pub fn import_state(&self, mut snapshot: StoreState) -> Result<(), ApiError> {
        snapshot.rebuild_webhook_plans()?;
        Self::validate_snapshot(&snapshot)?;
        let mut state = self.state.write();
        *state = snapshot;
        info!(
            items = state.items.len(),
            projects = state.projects.len(),
            "state imported"
        );
        Ok(())
    }

    /// Return to the state the process booted with.
    pub fn reset(&self) {
        let mut state = self.state.write();
        *state = self.baseline.clone();
        info!("state reset to boot baseline");
    }

    fn validate_snapshot(snapshot: &StoreState) -> Result<(), ApiError> {
        for item in snapshot.items.values() {
            if !snapshot.projects.contains_key(&item.project_key) {
                return Err(ApiError::validation(format!(
                    "item {} references unknown project {}",
                    item.key, item.project_key
                )));
            }
            if !snapshot.statuses.contains_key(&item.status_id) {
                return Err(ApiError::validation(format!(
                    "item {} references unknown status {}",
                    item.key, item.status_id
                )));
            }
        }
        for project in snapshot.projects.values() {
            if !snapshot.users.contains_key(&project.lead_account_id) {
                return Err(ApiError::validation(format!(
                    "project {} lead {} does not exist",
                    project.key, project.lead_account_id
                )));
            }
        }
        for sprint in snapshot.sprints.values() {
            if !snapshot.boards.contains_key(&sprint.board_id) {
                return Err(ApiError::validation(format!(
                    "sprint {} references unknown board {}",
                    sprint.id, sprint.board_id
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event plumbing
    // ------------------------------------------------------------------

    /// Hand an event to the sink together with the registrations that exist
    /// right now. Called after the write lock is released.
    pub(crate) fn emit(&self, event: StoreEvent, targets: Vec<HookTarget>) {
        self.sink.emit(event, targets);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::events::{EventSink, HookTarget, StoreEvent};
    use super::*;
    use parking_lot::Mutex;

    /// Sink that records every emitted event for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<(StoreEvent, Vec<HookTarget>)>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: StoreEvent, targets: Vec<HookTarget>) {
            self.events.lock().push((event, targets));
        }
    }

    pub fn seeded_store() -> (Arc<Store>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(Store::new(sample_state(), sink.clone()));
        (store, sink)
    }
}
