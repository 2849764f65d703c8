//! Work-item lifecycle: create, update, search, transitions, comments.

use super::entities::{Approval, Comment, ServiceRequest, Transition, WorkItem};
use super::events::StoreEvent;
use super::{Store, StoreState};
use crate::document;
use crate::error::ApiError;
use crate::query::{DateOp, QueryPlan};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Request type assigned to auto-created service requests.
pub(crate) const DEFAULT_REQUEST_TYPE_ID: &str = "100";

/// Parameters for creating a work item.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkItem {
    pub project_key: String,
    pub issue_type_id: String,
    #[serde(default)]
    pub summary: String,
    pub description: Option<Value>,
    #[serde(default)]
    pub reporter_id: String,
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, Value>,
    /// Service-desk request type; only meaningful for service-desk projects.
    #[serde(default)]
    pub request_type_id: Option<String>,
}

/// Partial update. Absent fields are untouched; `assigneeId: null` clears
/// the assignee.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemPatch {
    pub summary: Option<String>,
    pub description: Option<Value>,
    pub assignee_id: Option<Value>,
    pub labels: Option<Vec<String>>,
    pub custom_fields: Option<BTreeMap<String, Value>>,
}

impl WorkItemPatch {
    fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.assignee_id.is_none()
            && self.labels.is_none()
            && self.custom_fields.is_none()
    }
}

impl Store {
    /// Create a work item, assigning the next `{PROJECT}-{n}` key. For
    /// service-desk projects a linked service request is created in the same
    /// critical section.
    pub fn create_work_item(&self, req: CreateWorkItem) -> Result<WorkItem, ApiError> {
        let (item, event, targets) = {
            let mut state = self.state.write();
            let item = insert_work_item(&mut state, req)?;
            let status_name = state.status_name(&item.status_id);
            let event = StoreEvent::for_item("item_created", &item, &status_name);
            let targets = state.hook_targets();
            (item, event, targets)
        };

        debug!(key = %item.key, "work item created");
        self.emit(event, targets);
        Ok(item)
    }

    pub fn get_work_item(&self, key: &str) -> Result<WorkItem, ApiError> {
        self.state
            .read()
            .items
            .get(key)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Issue {key} does not exist")))
    }

    /// Partial field merge; bumps `updated` and emits `item_updated`.
    pub fn update_work_item(&self, key: &str, patch: WorkItemPatch) -> Result<WorkItem, ApiError> {
        if patch.is_empty() {
            return Err(ApiError::validation("no fields to update"));
        }

        let (item, event, targets) = {
            let mut state = self.state.write();

            if let Some(summary) = &patch.summary {
                if summary.trim().is_empty() {
                    return Err(ApiError::field("summary", "summary must not be empty"));
                }
            }
            let assignee = match &patch.assignee_id {
                None => None,
                Some(Value::Null) => Some(None),
                Some(Value::String(account_id)) => {
                    if !state.users.contains_key(account_id) {
                        return Err(ApiError::field(
                            "assigneeId",
                            format!("user {account_id} does not exist"),
                        ));
                    }
                    Some(Some(account_id.clone()))
                }
                Some(_) => {
                    return Err(ApiError::field("assigneeId", "must be a string or null"));
                }
            };

            let item = state
                .items
                .get_mut(key)
                .ok_or_else(|| ApiError::not_found(format!("Issue {key} does not exist")))?;

            if let Some(summary) = patch.summary {
                item.summary = summary;
            }
            if let Some(description) = &patch.description {
                item.description = document::normalize(Some(description));
            }
            if let Some(assignee) = assignee {
                item.assignee_id = assignee;
            }
            if let Some(labels) = patch.labels {
                item.labels = labels;
            }
            if let Some(custom) = patch.custom_fields {
                item.custom_fields.extend(custom);
            }
            item.updated = Utc::now();

            let item = item.clone();
            let status_name = state.status_name(&item.status_id);
            let event = StoreEvent::for_item("item_updated", &item, &status_name);
            let targets = state.hook_targets();
            (item, event, targets)
        };

        debug!(key = %item.key, "work item updated");
        self.emit(event, targets);
        Ok(item)
    }

    /// Apply the structured query plan, resolving `currentUser()` against the
    /// caller.
    pub fn search_work_items(&self, mut plan: QueryPlan, principal_id: &str) -> Vec<WorkItem> {
        plan.resolve_current_user(principal_id);

        let state = self.state.read();
        let mut matches: Vec<WorkItem> = state
            .items
            .values()
            .filter(|item| {
                plan.matches_flat(&flat_fields(item, &state)) && date_filters_match(&plan, item)
            })
            .cloned()
            .collect();
        drop(state);

        sort_items(&mut matches, &plan);
        matches
    }

    /// Transitions whose source set contains the item's current status.
    pub fn list_transitions(&self, key: &str) -> Result<Vec<Transition>, ApiError> {
        let state = self.state.read();
        let item = state
            .items
            .get(key)
            .ok_or_else(|| ApiError::not_found(format!("Issue {key} does not exist")))?;
        Ok(state
            .transitions
            .iter()
            .filter(|t| t.from.contains(&item.status_id))
            .cloned()
            .collect())
    }

    /// Apply a transition. Fails with Conflict (item unchanged) when the
    /// transition's source does not cover the current status.
    pub fn apply_transition(&self, key: &str, transition_id: &str) -> Result<WorkItem, ApiError> {
        let (item, event, targets) = {
            let mut state = self.state.write();

            let transition = state
                .transitions
                .iter()
                .find(|t| t.id == transition_id)
                .cloned()
                .ok_or_else(|| {
                    ApiError::field("transition", format!("unknown transition {transition_id}"))
                })?;

            let item = state
                .items
                .get_mut(key)
                .ok_or_else(|| ApiError::not_found(format!("Issue {key} does not exist")))?;

            if !transition.from.contains(&item.status_id) {
                return Err(ApiError::conflict(format!(
                    "transition {} is not valid from the current status",
                    transition.name
                )));
            }

            item.status_id = transition.to.clone();
            item.updated = Utc::now();

            let item = item.clone();
            let status_name = state.status_name(&item.status_id);
            let event = StoreEvent::for_item("item_updated", &item, &status_name);
            let targets = state.hook_targets();
            (item, event, targets)
        };

        debug!(key = %item.key, status = %item.status_id, "transition applied");
        self.emit(event, targets);
        Ok(item)
    }

    pub fn list_comments(&self, key: &str) -> Result<Vec<Comment>, ApiError> {
        Ok(self.get_work_item(key)?.comments)
    }

    /// Normalize the body, append, bump `updated`, emit `item_updated`.
    pub fn add_comment(
        &self,
        key: &str,
        author_id: &str,
        body: Option<&Value>,
    ) -> Result<Comment, ApiError> {
        let (comment, event, targets) = {
            let mut state = self.state.write();

            if !state.users.contains_key(author_id) {
                return Err(ApiError::field(
                    "author",
                    format!("user {author_id} does not exist"),
                ));
            }
            if !state.items.contains_key(key) {
                return Err(ApiError::not_found(format!("Issue {key} does not exist")));
            }

            state.next_comment_id += 1;
            let comment = Comment {
                id: state.next_comment_id,
                author_id: author_id.to_string(),
                body: document::normalize(body),
                created: Utc::now(),
            };

            let item = state
                .items
                .get_mut(key)
                .expect("checked above");
            item.comments.push(comment.clone());
            item.updated = Utc::now();

            let item = item.clone();
            let status_name = state.status_name(&item.status_id);
            let event = StoreEvent::for_item("item_updated", &item, &status_name);
            let targets = state.hook_targets();
            (comment, event, targets)
        };

        self.emit(event, targets);
        Ok(comment)
    }
}

/// Insert an item under the write lock, assigning ids and the per-project
/// key. Shared by the platform and service-desk create paths.
pub(crate) fn insert_work_item(
    state: &mut StoreState,
    req: CreateWorkItem,
) -> Result<WorkItem, ApiError> {
    let project = state
        .projects
        .get(&req.project_key)
        .cloned()
        .ok_or_else(|| {
            ApiError::field("project", format!("project {} does not exist", req.project_key))
        })?;
    if !state.issue_types.contains_key(&req.issue_type_id) {
        return Err(ApiError::field(
            "issuetype",
            format!("issue type {} does not exist", req.issue_type_id),
        ));
    }
    if req.summary.trim().is_empty() {
        return Err(ApiError::field("summary", "summary is required"));
    }
    if !state.users.contains_key(&req.reporter_id) {
        return Err(ApiError::field(
            "reporter",
            format!("user {} does not exist", req.reporter_id),
        ));
    }
    if let Some(assignee) = &req.assignee_id {
        if !state.users.contains_key(assignee) {
            return Err(ApiError::field(
                "assigneeId",
                format!("user {assignee} does not exist"),
            ));
        }
    }

    let counter = state.item_counters.entry(project.key.clone()).or_insert(0);
    *counter += 1;
    let key = format!("{}-{}", project.key, counter);

    state.next_item_id += 1;
    let now = Utc::now();
    let initial_status = default_status_id(state);
    let item = WorkItem {
        id: state.next_item_id,
        key: key.clone(),
        project_key: project.key.clone(),
        issue_type_id: req.issue_type_id,
        summary: req.summary,
        description: document::normalize(req.description.as_ref()),
        status_id: initial_status,
        reporter_id: req.reporter_id.clone(),
        assignee_id: req.assignee_id,
        labels: req.labels,
        created: now,
        updated: now,
        sprint_id: None,
        comments: Vec::new(),
        custom_fields: req.custom_fields,
    };
    state.items.insert(key.clone(), item.clone());

    if project.is_service_desk() {
        state.next_request_id += 1;
        state.next_approval_id += 1;
        let request = ServiceRequest {
            id: state.next_request_id,
            issue_key: key.clone(),
            request_type_id: req
                .request_type_id
                .unwrap_or_else(|| DEFAULT_REQUEST_TYPE_ID.to_string()),
            reporter_id: req.reporter_id,
            created: now,
            approvals: vec![Approval {
                id: state.next_approval_id,
                name: "Awaiting approval".to_string(),
                decision: None,
                decided_by: None,
                decided_at: None,
            }],
        };
        state.requests.insert(key, request);
    }

    Ok(item)
}

/// First status in the "new" category, by id order.
fn default_status_id(state: &StoreState) -> String {
    let mut candidates: Vec<&super::entities::Status> = state
        .statuses
        .values()
        .filter(|s| s.category_key == "new")
        .collect();
    candidates.sort_by(|a, b| a.id.cmp(&b.id));
    candidates
        .first()
        .map(|s| s.id.clone())
        .unwrap_or_else(|| "10000".to_string())
}

/// Flatten an item into the field map both search filters and webhook filter
/// plans are applied against.
fn flat_fields(item: &WorkItem, state: &StoreState) -> HashMap<String, Vec<String>> {
    let mut fields = HashMap::new();
    fields.insert("key".to_string(), vec![item.key.clone()]);
    fields.insert("project".to_string(), vec![item.project_key.clone()]);
    fields.insert(
        "status".to_string(),
        vec![state.status_name(&item.status_id)],
    );
    fields.insert("type".to_string(), vec![item.issue_type_id.clone()]);
    fields.insert("reporter".to_string(), vec![item.reporter_id.clone()]);
    fields.insert("summary".to_string(), vec![item.summary.clone()]);
    if let Some(assignee) = &item.assignee_id {
        fields.insert("assignee".to_string(), vec![assignee.clone()]);
    }
    if !item.labels.is_empty() {
        fields.insert("labels".to_string(), item.labels.clone());
    }
    for (name, value) in &item.custom_fields {
        if let Value::String(s) = value {
            fields.insert(name.clone(), vec![s.clone()]);
        }
    }
    fields
}

fn date_filters_match(plan: &QueryPlan, item: &WorkItem) -> bool {
    plan.dates.iter().all(|filter| {
        let actual = match filter.field.as_str() {
            "created" => item.created,
            "updated" => item.updated,
            _ => return false,
        };
        match filter.op {
            DateOp::Ge => actual >= filter.value,
            DateOp::Gt => actual > filter.value,
            DateOp::Le => actual <= filter.value,
            DateOp::Lt => actual < filter.value,
        }
    })
}

/// Sort by the plan's keys; default order is creation time, then key.
fn sort_items(items: &mut [WorkItem], plan: &QueryPlan) {
    items.sort_by(|a, b| {
        for key in &plan.order {
            let ordering = compare_by_field(a, b, &key.field);
            let ordering = if key.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.created.cmp(&b.created).then_with(|| a.key.cmp(&b.key))
    });
}

fn compare_by_field(a: &WorkItem, b: &WorkItem, field: &str) -> Ordering {
    match field {
        "created" => a.created.cmp(&b.created),
        "updated" => a.updated.cmp(&b.updated),
        "key" => a
            .project_key
            .cmp(&b.project_key)
            .then_with(|| a.id.cmp(&b.id)),
        "summary" => a.summary.cmp(&b.summary),
        "status" => a.status_id.cmp(&b.status_id),
        "project" => a.project_key.cmp(&b.project_key),
        _ => Ordering::Equal,
    }
}
