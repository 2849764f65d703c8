//! Webhook admin: register, list, inspect, delete.

use crate::api::types::{json_response, no_content, parse_json, ApiResponse, PageParams};
use crate::api::AppContext;
use crate::error::ApiError;
use crate::page::Page;
use crate::store::RegisterWebhook;
use bytes::Bytes;
use hyper::{Method, StatusCode};

pub async fn route(
    ctx: &AppContext,
    method: &Method,
    segments: &[&str],
    query: Option<&str>,
    body: Bytes,
) -> Result<ApiResponse, ApiError> {
    let page = PageParams::parse(query);

    match (method, segments) {
        (&Method::POST, ["webhook"]) => {
            let register: RegisterWebhook = parse_json(&body)?;
            let registration = ctx.store.register_webhook(register)?;
            Ok(json_response(StatusCode::CREATED, &registration))
        }
        (&Method::GET, ["webhook"]) => {
            let hooks = ctx.store.list_webhooks();
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(hooks, page.start_at, page.max_results),
            ))
        }
        (&Method::GET, ["webhook", id]) => {
            let registration = ctx.store.get_webhook(id)?;
            Ok(json_response(StatusCode::OK, &registration))
        }
        (&Method::DELETE, ["webhook", id]) => {
            ctx.store.delete_webhook(id)?;
            Ok(no_content())
        }

        _ => Err(ApiError::not_found("no such resource")),
    }
}
