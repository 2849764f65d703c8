//! Platform resources: items, search, transitions, comments, lookups.

use crate::api::types::{
    json_response, no_content, parse_json, query_param, ApiResponse, PageParams,
};
use crate::api::AppContext;
use crate::error::ApiError;
use crate::gate::Principal;
use crate::page::Page;
use crate::query;
use crate::store::{CreateWorkItem, WorkItemPatch};
use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyTransitionBody {
    transition: Option<TransitionRef>,
    transition_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransitionRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddCommentBody {
    body: Option<serde_json::Value>,
}

pub async fn route(
    ctx: &AppContext,
    principal: &Principal,
    method: &Method,
    segments: &[&str],
    query: Option<&str>,
    body: Bytes,
) -> Result<ApiResponse, ApiError> {
    let page = PageParams::parse(query);

    match (method, segments) {
        (&Method::GET, ["myself"]) => {
            let user = ctx.store.get_user(&principal.account_id)?;
            Ok(json_response(StatusCode::OK, &user))
        }

        (&Method::GET, ["project"]) => {
            let projects = ctx.store.list_projects();
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(projects, page.start_at, page.max_results),
            ))
        }
        (&Method::GET, ["project", key]) => {
            let project = ctx.store.get_project(key)?;
            Ok(json_response(StatusCode::OK, &project))
        }
        (&Method::GET, ["field"]) => {
            let fields = ctx.store.list_fields();
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(fields, page.start_at, page.max_results),
            ))
        }
        (&Method::GET, ["status"]) => {
            let statuses = ctx.store.list_statuses();
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(statuses, page.start_at, page.max_results),
            ))
        }

        (&Method::POST, ["issue"]) => {
            let mut create: CreateWorkItem = parse_json(&body)?;
            if create.reporter_id.is_empty() {
                create.reporter_id = principal.account_id.clone();
            }
            let item = ctx.store.create_work_item(create)?;
            Ok(json_response(
                StatusCode::CREATED,
                &json!({
                    "id": item.id.to_string(),
                    "key": item.key,
                    "self": format!("/rest/api/3/issue/{}", item.key),
                }),
            ))
        }
        (&Method::GET, ["issue", key]) => {
            let item = ctx.store.get_work_item(key)?;
            Ok(json_response(StatusCode::OK, &item))
        }
        (&Method::PUT, ["issue", key]) => {
            let patch: WorkItemPatch = parse_json(&body)?;
            ctx.store.update_work_item(key, patch)?;
            Ok(no_content())
        }

        (&Method::GET, ["search"]) => {
            let jql = query_param(query, "jql").unwrap_or_default();
            let plan = query::parse_lenient(&jql);
            let items = ctx.store.search_work_items(plan, &principal.account_id);
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(items, page.start_at, page.max_results),
            ))
        }

        (&Method::GET, ["issue", key, "transitions"]) => {
            let transitions = ctx.store.list_transitions(key)?;
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(transitions, page.start_at, page.max_results),
            ))
        }
        (&Method::POST, ["issue", key, "transitions"]) => {
            let body: ApplyTransitionBody = parse_json(&body)?;
            let transition_id = body
                .transition
                .map(|t| t.id)
                .or(body.transition_id)
                .ok_or_else(|| ApiError::field("transition", "transition id is required"))?;
            ctx.store.apply_transition(key, &transition_id)?;
            Ok(no_content())
        }

        (&Method::GET, ["issue", key, "comment"]) => {
            let comments = ctx.store.list_comments(key)?;
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(comments, page.start_at, page.max_results),
            ))
        }
        (&Method::POST, ["issue", key, "comment"]) => {
            let body: AddCommentBody = parse_json(&body)?;
            let comment = ctx
                .store
                .add_comment(key, &principal.account_id, body.body.as_ref())?;
            Ok(json_response(StatusCode::CREATED, &comment))
        }

        _ => Err(ApiError::not_found("no such resource")),
    }
}
