//! Boards, sprints, and backlog operations.

use super::entities::{Board, Sprint, SprintState, WorkItem};
use super::events::StoreEvent;
use super::Store;
use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSprint {
    pub board_id: u64,
    pub name: String,
    pub goal: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintPatch {
    pub name: Option<String>,
    pub goal: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub state: Option<SprintState>,
}

impl Store {
    pub fn list_boards(&self) -> Vec<Board> {
        let state = self.state.read();
        let mut boards: Vec<Board> = state.boards.values().cloned().collect();
        boards.sort_by_key(|b| b.id);
        boards
    }

    pub fn get_board(&self, id: u64) -> Result<Board, ApiError> {
        self.state
            .read()
            .boards
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Board {id} does not exist")))
    }

    pub fn list_sprints(&self, board_id: u64) -> Result<Vec<Sprint>, ApiError> {
        let state = self.state.read();
        if !state.boards.contains_key(&board_id) {
            return Err(ApiError::not_found(format!("Board {board_id} does not exist")));
        }
        let mut sprints: Vec<Sprint> = state
            .sprints
            .values()
            .filter(|s| s.board_id == board_id)
            .cloned()
            .collect();
        sprints.sort_by_key(|s| s.id);
        Ok(sprints)
    }

    pub fn get_sprint(&self, id: u64) -> Result<Sprint, ApiError> {
        self.state
            .read()
            .sprints
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Sprint {id} does not exist")))
    }

    /// New sprints always start in the `future` state.
    pub fn create_sprint(&self, req: CreateSprint) -> Result<Sprint, ApiError> {
        let mut state = self.state.write();
        if !state.boards.contains_key(&req.board_id) {
            return Err(ApiError::field(
                "boardId",
                format!("board {} does not exist", req.board_id),
            ));
        }
        if req.name.trim().is_empty() {
            return Err(ApiError::field("name", "name is required"));
        }

        state.next_sprint_id += 1;
        let sprint = Sprint {
            id: state.next_sprint_id,
            board_id: req.board_id,
            name: req.name,
            state: SprintState::Future,
            start_date: req.start_date,
            end_date: req.end_date,
            goal: req.goal,
        };
        state.sprints.insert(sprint.id, sprint.clone());
        debug!(sprint = sprint.id, "sprint created");
        Ok(sprint)
    }

    /// Field merge plus the forward-only `future -> active -> closed` state
    /// machine; any backward move is a Conflict.
    pub fn update_sprint(&self, id: u64, patch: SprintPatch) -> Result<Sprint, ApiError> {
        let mut state = self.state.write();
        let sprint = state
            .sprints
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found(format!("Sprint {id} does not exist")))?;

        if let Some(next) = patch.state {
            if next.rank() < sprint.state.rank() {
                return Err(ApiError::conflict(format!(
                    "sprint cannot move backwards from {:?} to {:?}",
                    sprint.state, next
                )));
            }
            sprint.state = next;
        }
        if let Some(name) = patch.name {
            sprint.name = name;
        }
        if let Some(goal) = patch.goal {
            sprint.goal = Some(goal);
        }
        if let Some(start) = patch.start_date {
            sprint.start_date = Some(start);
        }
        if let Some(end) = patch.end_date {
            sprint.end_date = Some(end);
        }

        Ok(sprint.clone())
    }

    /// Items assigned to a sprint.
    pub fn sprint_issues(&self, sprint_id: u64) -> Result<Vec<WorkItem>, ApiError> {
        let state = self.state.read();
        if !state.sprints.contains_key(&sprint_id) {
            return Err(ApiError::not_found(format!("Sprint {sprint_id} does not exist")));
        }
        let mut items: Vec<WorkItem> = state
            .items
            .values()
            .filter(|i| i.sprint_id == Some(sprint_id))
            .cloned()
            .collect();
        items.sort_by_key(|i| i.id);
        Ok(items)
    }

    /// Board-project items not assigned to any sprint.
    pub fn backlog(&self, board_id: u64) -> Result<Vec<WorkItem>, ApiError> {
        let state = self.state.read();
        let board = state
            .boards
            .get(&board_id)
            .ok_or_else(|| ApiError::not_found(format!("Board {board_id} does not exist")))?;
        let mut items: Vec<WorkItem> = state
            .items
            .values()
            .filter(|i| i.project_key == board.project_key && i.sprint_id.is_none())
            .cloned()
            .collect();
        items.sort_by_key(|i| i.id);
        Ok(items)
    }

    /// Move items into a sprint. Validates everything before touching
    /// anything, then emits one `item_updated` per moved item.
    pub fn move_to_sprint(&self, sprint_id: u64, keys: &[String]) -> Result<(), ApiError> {
        let (events, targets) = {
            let mut state = self.state.write();
            if !state.sprints.contains_key(&sprint_id) {
                return Err(ApiError::not_found(format!(
                    "Sprint {sprint_id} does not exist"
                )));
            }
            for key in keys {
                if !state.items.contains_key(key) {
                    return Err(ApiError::not_found(format!("Issue {key} does not exist")));
                }
            }

            let mut events = Vec::new();
            for key in keys {
                let item = state.items.get_mut(key).expect("validated above");
                item.sprint_id = Some(sprint_id);
                item.updated = Utc::now();
                let item = item.clone();
                let status_name = state.status_name(&item.status_id);
                events.push(StoreEvent::for_item("item_updated", &item, &status_name));
            }
            (events, state.hook_targets())
        };

        for event in events {
            self.emit(event, targets.clone());
        }
        Ok(())
    }
}
