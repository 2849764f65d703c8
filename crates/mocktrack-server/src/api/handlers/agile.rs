//! Agile resources: boards, sprints, backlog.

use crate::api::types::{json_response, no_content, parse_json, ApiResponse, PageParams};
use crate::api::AppContext;
use crate::error::ApiError;
use crate::page::Page;
use crate::store::{CreateSprint, SprintPatch};
use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MoveIssuesBody {
    issues: Vec<String>,
}

pub async fn route(
    ctx: &AppContext,
    method: &Method,
    segments: &[&str],
    query: Option<&str>,
    body: Bytes,
) -> Result<ApiResponse, ApiError> {
    let page = PageParams::parse(query);

    match (method, segments) {
        (&Method::GET, ["board"]) => {
            let boards = ctx.store.list_boards();
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(boards, page.start_at, page.max_results),
            ))
        }
        (&Method::GET, ["board", id, "sprint"]) => {
            let board_id = parse_id(id, "board")?;
            let sprints = ctx.store.list_sprints(board_id)?;
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(sprints, page.start_at, page.max_results),
            ))
        }
        (&Method::GET, ["board", id, "backlog"]) => {
            let board_id = parse_id(id, "board")?;
            let items = ctx.store.backlog(board_id)?;
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(items, page.start_at, page.max_results),
            ))
        }

        (&Method::POST, ["sprint"]) => {
            let create: CreateSprint = parse_json(&body)?;
            let sprint = ctx.store.create_sprint(create)?;
            Ok(json_response(StatusCode::CREATED, &sprint))
        }
        (&Method::GET, ["sprint", id]) => {
            let sprint = ctx.store.get_sprint(parse_id(id, "sprint")?)?;
            Ok(json_response(StatusCode::OK, &sprint))
        }
        (&Method::PUT, ["sprint", id]) => {
            let patch: SprintPatch = parse_json(&body)?;
            let sprint = ctx.store.update_sprint(parse_id(id, "sprint")?, patch)?;
            Ok(json_response(StatusCode::OK, &sprint))
        }
        (&Method::POST, ["sprint", id, "issue"]) => {
            let body: MoveIssuesBody = parse_json(&body)?;
            ctx.store.move_to_sprint(parse_id(id, "sprint")?, &body.issues)?;
            Ok(no_content())
        }
        (&Method::GET, ["sprint", id, "issue"]) => {
            let items = ctx.store.sprint_issues(parse_id(id, "sprint")?)?;
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(items, page.start_at, page.max_results),
            ))
        }

        _ => Err(ApiError::not_found("no such resource")),
    }
}

fn parse_id(raw: &str, what: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("invalid {what} id '{raw}'")))
}
