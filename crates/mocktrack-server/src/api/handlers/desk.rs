//! Service-desk resources: requests and the approval workflow.

use crate::api::types::{json_response, parse_json, ApiResponse, PageParams};
use crate::api::AppContext;
use crate::error::ApiError;
use crate::gate::Principal;
use crate::page::Page;
use crate::store::entities::ApprovalDecision;
use crate::store::CreateRequest;
use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct ApprovalBody {
    decision: ApprovalDecision,
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
        (&Method::GET, ["request"]) => {
            let requests = ctx.store.list_requests();
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(requests, page.start_at, page.max_results),
            ))
        }
        (&Method::POST, ["request"]) => {
            let mut create: CreateRequest = parse_json(&body)?;
            if create.reporter_id.is_empty() {
                create.reporter_id = principal.account_id.clone();
            }
            let (request, item) = ctx.store.create_request(create)?;
            Ok(json_response(
                StatusCode::CREATED,
                &json!({
                    "request": request,
                    "issueKey": item.key,
                }),
            ))
        }
        (&Method::GET, ["request", key]) => {
            let request = ctx.store.get_request(key)?;
            Ok(json_response(StatusCode::OK, &request))
        }
        (&Method::GET, ["request", key, "approval"]) => {
            let approvals = ctx.store.list_approvals(key)?;
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(approvals, page.start_at, page.max_results),
            ))
        }
        (&Method::POST, ["request", key, "approval", id]) => {
            let approval_id: u64 = id
                .parse()
                .map_err(|_| ApiError::validation(format!("invalid approval id '{id}'")))?;
            let body: ApprovalBody = parse_json(&body)?;
            let request = ctx.store.answer_approval(
                key,
                approval_id,
                body.decision,
                &principal.account_id,
            )?;
            Ok(json_response(StatusCode::OK, &request))
        }

        _ => Err(ApiError::not_found("no such resource")),
    }
}
