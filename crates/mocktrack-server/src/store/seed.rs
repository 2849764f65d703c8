//! Seed fixtures: reference data plus a small, deterministic sample set.

use super::entities::{
    Approval, Board, FieldMeta, IssueType, Project, ServiceRequest, Sprint, SprintState, Status,
    StatusCategory, TokenInfo, Transition, User, WorkItem,
};
use super::StoreState;
use crate::document;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;

/// Immutable field catalog served by the field-listing endpoint.
pub fn field_catalog() -> Vec<FieldMeta> {
    vec![
        field("summary", "Summary", false, "string"),
        field("description", "Description", false, "doc"),
        field("status", "Status", false, "status"),
        field("reporter", "Reporter", false, "user"),
        field("assignee", "Assignee", false, "user"),
        field("labels", "Labels", false, "array"),
        field("created", "Created", false, "datetime"),
        field("updated", "Updated", false, "datetime"),
        field("customfield_10001", "Story Points", true, "number"),
        field("customfield_10002", "Team", true, "string"),
    ]
}

fn field(id: &str, name: &str, custom: bool, schema_type: &str) -> FieldMeta {
    FieldMeta {
        id: id.to_string(),
        name: name.to_string(),
        custom,
        schema_type: schema_type.to_string(),
    }
}

/// Reference data every store needs even when "empty": users, tokens,
/// statuses, types, and the workflow. Without tokens nothing could
/// authenticate, so an empty store still carries principals.
pub fn empty_state() -> StoreState {
    let mut state = StoreState::default();

    for user in [
        user("alice", "Alice Nakamura", "alice@example.com", "UTC"),
        user("bob", "Bob Hendricks", "bob@example.com", "Europe/Berlin"),
        user("carol", "Carol Osei", "carol@example.com", "America/New_York"),
    ] {
        state.users.insert(user.account_id.clone(), user);
    }

    state.tokens.insert(
        "mock-token-alice".to_string(),
        TokenInfo {
            account_id: "alice".to_string(),
            force_rate_limit: false,
        },
    );
    state.tokens.insert(
        "mock-token-bob".to_string(),
        TokenInfo {
            account_id: "bob".to_string(),
            force_rate_limit: false,
        },
    );
    state.tokens.insert(
        "mock-token-forced".to_string(),
        TokenInfo {
            account_id: "carol".to_string(),
            force_rate_limit: true,
        },
    );

    state.status_categories = vec![
        category("1", "new", "To Do"),
        category("2", "indeterminate", "In Progress"),
        category("3", "done", "Done"),
    ];
    for status in [
        status("10000", "To Do", "new"),
        status("10001", "In Progress", "indeterminate"),
        status("10002", "Done", "done"),
    ] {
        state.statuses.insert(status.id.clone(), status);
    }

    state.transitions = vec![
        transition("11", "Start Progress", &["10000"], "10001"),
        transition("21", "Resolve", &["10001"], "10002"),
        transition("31", "Reopen", &["10002"], "10000"),
        transition("41", "Stop Progress", &["10001"], "10000"),
    ];

    for issue_type in [
        issue_type("10100", "Task", "A unit of work"),
        issue_type("10101", "Bug", "A defect"),
        issue_type("10102", "Story", "A user-facing change"),
        issue_type("10200", "Service Request", "A help-desk request"),
    ] {
        state.issue_types.insert(issue_type.id.clone(), issue_type);
    }

    state
}

/// The seeded sample data set the server boots with by default.
pub fn sample_state() -> StoreState {
    let mut state = empty_state();
    let now = Utc::now();

    for project in [
        project("10000", "DEV", "Device Platform", "software", "alice"),
        project("10001", "SUP", "Customer Support", "service_desk", "bob"),
    ] {
        state.projects.insert(project.key.clone(), project);
    }

    state.boards.insert(
        1,
        Board {
            id: 1,
            name: "DEV board".to_string(),
            board_type: "scrum".to_string(),
            project_key: "DEV".to_string(),
        },
    );
    state.sprints.insert(
        1,
        Sprint {
            id: 1,
            board_id: 1,
            name: "Sprint 1".to_string(),
            state: SprintState::Active,
            start_date: Some(now - Duration::days(7)),
            end_date: Some(now + Duration::days(7)),
            goal: Some("Ship the ingest pipeline".to_string()),
        },
    );
    state.sprints.insert(
        2,
        Sprint {
            id: 2,
            board_id: 1,
            name: "Sprint 2".to_string(),
            state: SprintState::Future,
            start_date: None,
            end_date: None,
            goal: None,
        },
    );
    state.next_sprint_id = 2;

    let samples = [
        (
            "DEV",
            "10101",
            "Login page rejects valid passwords",
            "alice",
            Some("bob"),
            vec!["auth", "urgent"],
            Some(1),
        ),
        (
            "DEV",
            "10100",
            "Add pagination to the audit log",
            "alice",
            None,
            vec!["backend"],
            None,
        ),
        (
            "DEV",
            "10102",
            "Dark mode for the settings screen",
            "bob",
            Some("alice"),
            vec![],
            None,
        ),
    ];
    let mut minutes_ago = 240;
    for (project_key, type_id, summary, reporter, assignee, labels, sprint) in samples {
        let item = seed_item(
            &mut state,
            project_key,
            type_id,
            summary,
            reporter,
            assignee,
            &labels,
            sprint,
            now - Duration::minutes(minutes_ago),
        );
        state.items.insert(item.key.clone(), item);
        minutes_ago -= 60;
    }

    // One service-desk request with a pending approval.
    let sup_item = seed_item(
        &mut state,
        "SUP",
        "10200",
        "Cannot reach the VPN from the Berlin office",
        "carol",
        None,
        &[],
        None,
        now - Duration::minutes(30),
    );
    state.next_request_id += 1;
    state.next_approval_id += 1;
    state.requests.insert(
        sup_item.key.clone(),
        ServiceRequest {
            id: state.next_request_id,
            issue_key: sup_item.key.clone(),
            request_type_id: "100".to_string(),
            reporter_id: "carol".to_string(),
            created: sup_item.created,
            approvals: vec![Approval {
                id: state.next_approval_id,
                name: "Awaiting approval".to_string(),
                decision: None,
                decided_by: None,
                decided_at: None,
            }],
        },
    );
    state.items.insert(sup_item.key.clone(), sup_item);

    state
}

#[allow(clippy::too_many_arguments)]
fn seed_item(
    state: &mut StoreState,
    project_key: &str,
    type_id: &str,
    summary: &str,
    reporter: &str,
    assignee: Option<&str>,
    labels: &[&str],
    sprint_id: Option<u64>,
    created: chrono::DateTime<Utc>,
) -> WorkItem {
    let counter = state
        .item_counters
        .entry(project_key.to_string())
        .or_insert(0);
    *counter += 1;
    let key = format!("{project_key}-{counter}");
    state.next_item_id += 1;

    WorkItem {
        id: state.next_item_id,
        key,
        project_key: project_key.to_string(),
        issue_type_id: type_id.to_string(),
        summary: summary.to_string(),
        description: document::from_text(summary),
        status_id: "10000".to_string(),
        reporter_id: reporter.to_string(),
        assignee_id: assignee.map(|a| a.to_string()),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        created,
        updated: created,
        sprint_id,
        comments: Vec::new(),
        custom_fields: BTreeMap::new(),
    }
}

fn user(account_id: &str, display_name: &str, email: &str, tz: &str) -> User {
    User {
        account_id: account_id.to_string(),
        display_name: display_name.to_string(),
        email_address: email.to_string(),
        time_zone: tz.to_string(),
    }
}

fn project(id: &str, key: &str, name: &str, type_key: &str, lead: &str) -> Project {
    Project {
        id: id.to_string(),
        key: key.to_string(),
        name: name.to_string(),
        project_type_key: type_key.to_string(),
        lead_account_id: lead.to_string(),
    }
}

fn category(id: &str, key: &str, name: &str) -> StatusCategory {
    StatusCategory {
        id: id.to_string(),
        key: key.to_string(),
        name: name.to_string(),
    }
}

fn status(id: &str, name: &str, category_key: &str) -> Status {
    Status {
        id: id.to_string(),
        name: name.to_string(),
        category_key: category_key.to_string(),
    }
}

fn transition(id: &str, name: &str, from: &[&str], to: &str) -> Transition {
    Transition {
        id: id.to_string(),
        name: name.to_string(),
        from: from.iter().map(|f| f.to_string()).collect(),
        to: to.to_string(),
    }
}

fn issue_type(id: &str, name: &str, description: &str) -> IssueType {
    IssueType {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_state_is_internally_consistent() {
        let state = sample_state();

        for item in state.items.values() {
            assert!(state.projects.contains_key(&item.project_key));
            assert!(state.statuses.contains_key(&item.status_id));
            assert!(state.users.contains_key(&item.reporter_id));
        }
        for project in state.projects.values() {
            assert!(state.users.contains_key(&project.lead_account_id));
        }
        for sprint in state.sprints.values() {
            assert!(state.boards.contains_key(&sprint.board_id));
        }
        // Counters agree with the highest seeded key.
        assert_eq!(state.item_counters.get("DEV"), Some(&3));
        assert_eq!(state.item_counters.get("SUP"), Some(&1));
        // Exactly one service request, linked to the SUP item.
        assert_eq!(state.requests.len(), 1);
        assert!(state.requests.contains_key("SUP-1"));
    }

    #[test]
    fn test_empty_state_keeps_reference_data_and_tokens() {
        let state = empty_state();
        assert!(state.items.is_empty());
        assert!(state.projects.is_empty());
        assert!(!state.tokens.is_empty());
        assert!(!state.statuses.is_empty());
        assert!(!state.transitions.is_empty());
    }
}
