//! Service-desk requests and their approval workflow.

use super::entities::{ApprovalDecision, ServiceRequest, WorkItem};
use super::items::{insert_work_item, DEFAULT_REQUEST_TYPE_ID};
use super::events::StoreEvent;
use super::{CreateWorkItem, Store};
use crate::error::ApiError;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub request_type_id: Option<String>,
    #[serde(default)]
    pub summary: String,
    pub description: Option<serde_json::Value>,
    #[serde(default)]
    pub reporter_id: String,
}

impl Store {
    pub fn list_requests(&self) -> Vec<ServiceRequest> {
        let state = self.state.read();
        let mut requests: Vec<ServiceRequest> = state.requests.values().cloned().collect();
        requests.sort_by_key(|r| r.id);
        requests
    }

    pub fn get_request(&self, issue_key: &str) -> Result<ServiceRequest, ApiError> {
        self.state
            .read()
            .requests
            .get(issue_key)
            .cloned()
            .ok_or_else(|| {
                ApiError::not_found(format!("Request for issue {issue_key} does not exist"))
            })
    }

    /// Create a service-desk request: a work item under the service-desk
    /// project plus its linked request record, in one critical section.
    pub fn create_request(
        &self,
        req: CreateRequest,
    ) -> Result<(ServiceRequest, WorkItem), ApiError> {
        let (item, request, event, targets) = {
            let mut state = self.state.write();
            let desk_project = state
                .projects
                .values()
                .find(|p| p.is_service_desk())
                .cloned()
                .ok_or_else(|| {
                    ApiError::validation("no service-desk project exists in the store")
                })?;

            let item = insert_work_item(
                &mut state,
                CreateWorkItem {
                    project_key: desk_project.key,
                    // Service requests file under the service-request type.
                    issue_type_id: "10200".to_string(),
                    summary: req.summary,
                    description: req.description,
                    reporter_id: req.reporter_id,
                    request_type_id: Some(
                        req.request_type_id
                            .unwrap_or_else(|| DEFAULT_REQUEST_TYPE_ID.to_string()),
                    ),
                    ..Default::default()
                },
            )?;

            let request = state
                .requests
                .get(&item.key)
                .cloned()
                .expect("service-desk create always links a request");
            let status_name = state.status_name(&item.status_id);
            let event = StoreEvent::for_item("item_created", &item, &status_name);
            let targets = state.hook_targets();
            (item, request, event, targets)
        };

        debug!(key = %item.key, "service request created");
        self.emit(event, targets);
        Ok((request, item))
    }

    pub fn list_approvals(
        &self,
        issue_key: &str,
    ) -> Result<Vec<super::entities::Approval>, ApiError> {
        Ok(self.get_request(issue_key)?.approvals)
    }

    /// Record an approval decision. Decisions are append-only: deciding an
    /// already-decided approval is a Conflict.
    pub fn answer_approval(
        &self,
        issue_key: &str,
        approval_id: u64,
        decision: ApprovalDecision,
        decided_by: &str,
    ) -> Result<ServiceRequest, ApiError> {
        let mut state = self.state.write();
        let request = state.requests.get_mut(issue_key).ok_or_else(|| {
            ApiError::not_found(format!("Request for issue {issue_key} does not exist"))
        })?;

        let approval = request
            .approvals
            .iter_mut()
            .find(|a| a.id == approval_id)
            .ok_or_else(|| {
                ApiError::not_found(format!("Approval {approval_id} does not exist"))
            })?;

        if approval.is_decided() {
            return Err(ApiError::conflict(format!(
                "approval {approval_id} has already been decided"
            )));
        }

        approval.decision = Some(decision);
        approval.decided_by = Some(decided_by.to_string());
        approval.decided_at = Some(Utc::now());
        Ok(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::seeded_store;
    use super::*;

    #[test]
    fn test_create_request_files_under_service_desk_project() {
        let (store, _) = seeded_store();
        let (request, item) = store
            .create_request(CreateRequest {
                request_type_id: Some("200".to_string()),
                summary: "new laptop".to_string(),
                description: None,
                reporter_id: "carol".to_string(),
            })
            .unwrap();

        assert!(item.key.starts_with("SUP-"));
        assert_eq!(request.issue_key, item.key);
        assert_eq!(request.request_type_id, "200");
        assert_eq!(item.issue_type_id, "10200");
    }

    #[test]
    fn test_approval_decisions_are_append_only() {
        let (store, _) = seeded_store();
        let (request, item) = store
            .create_request(CreateRequest {
                request_type_id: None,
                summary: "database access".to_string(),
                description: None,
                reporter_id: "carol".to_string(),
            })
            .unwrap();
        let approval_id = request.approvals[0].id;

        let decided = store
            .answer_approval(&item.key, approval_id, ApprovalDecision::Approve, "bob")
            .unwrap();
        let approval = &decided.approvals[0];
        assert_eq!(approval.decision, Some(ApprovalDecision::Approve));
        assert_eq!(approval.decided_by.as_deref(), Some("bob"));
        assert!(approval.decided_at.is_some());

        let err = store
            .answer_approval(&item.key, approval_id, ApprovalDecision::Decline, "alice")
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_unknown_approval_is_not_found() {
        let (store, _) = seeded_store();
        let (_, item) = store
            .create_request(CreateRequest {
                request_type_id: None,
                summary: "badge".to_string(),
                description: None,
                reporter_id: "carol".to_string(),
            })
            .unwrap();

        let err = store
            .answer_approval(&item.key, 9999, ApprovalDecision::Approve, "bob")
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
