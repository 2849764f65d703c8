//! Domain entity records.
//!
//! All entities are plain serde records keyed by stable identifiers; the
//! store is their sole owner. Wire casing is camelCase throughout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub account_id: String,
    pub display_name: String,
    pub email_address: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub key: String,
    pub name: String,
    /// "software" or "service_desk".
    pub project_type_key: String,
    pub lead_account_id: String,
}

impl Project {
    pub fn is_service_desk(&self) -> bool {
        self.project_type_key == "service_desk"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueType {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCategory {
    pub id: String,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub id: String,
    pub name: String,
    pub category_key: String,
}

/// A workflow edge. Offered only when `from` contains the item's current
/// status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub id: String,
    pub name: String,
    pub from: Vec<String>,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: u64,
    pub author_id: String,
    pub body: Value,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: u64,
    /// `{PROJECT}-{n}`, immutable once assigned.
    pub key: String,
    pub project_key: String,
    pub issue_type_id: String,
    pub summary: String,
    pub description: Value,
    pub status_id: String,
    pub reporter_id: String,
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub sprint_id: Option<u64>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub board_type: String,
    pub project_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintState {
    Future,
    Active,
    Closed,
}

impl SprintState {
    /// Position in the forward-only lifecycle.
    pub fn rank(self) -> u8 {
        match self {
            SprintState::Future => 0,
            SprintState::Active => 1,
            SprintState::Closed => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: u64,
    pub board_id: u64,
    pub name: String,
    pub state: SprintState,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub goal: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Decline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: u64,
    pub name: String,
    pub decision: Option<ApprovalDecision>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Approval {
    pub fn is_decided(&self) -> bool {
        self.decision.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: u64,
    pub issue_key: String,
    pub request_type_id: String,
    pub reporter_id: String,
    pub created: DateTime<Utc>,
    pub approvals: Vec<Approval>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
    /// Optional filter expression, validated at registration time.
    pub filter: Option<String>,
    /// Per-registration signing secret; the dispatcher default applies
    /// when absent.
    pub secret: Option<String>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub account_id: String,
    /// When set, the forced-429 request header is honored for this token.
    #[serde(default)]
    pub force_rate_limit: bool,
}

/// Static field metadata served by the field-listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    pub id: String,
    pub name: String,
    pub custom: bool,
    pub schema_type: String,
}
