//! Operator endpoints: info, snapshot export/load, reset, delivery logs.

use crate::api::types::{json_response, no_content, parse_json, ApiResponse, PageParams};
use crate::api::AppContext;
use crate::error::ApiError;
use crate::page::Page;
use crate::store::StoreState;
use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde_json::json;

pub async fn route(
    ctx: &AppContext,
    method: &Method,
    segments: &[&str],
    query: Option<&str>,
    body: Bytes,
) -> Result<ApiResponse, ApiError> {
    let page = PageParams::parse(query);

    match (method, segments) {
        (&Method::GET, ["info"]) => {
            let config = ctx.dispatcher.config();
            Ok(json_response(
                StatusCode::OK,
                &json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "uptimeSecs": ctx.started_at.elapsed().as_secs(),
                    "counts": ctx.store.counts(),
                    "deliveriesByEventType": ctx.dispatcher.log().counts_by_event_type(),
                    "dispatcher": {
                        "jitterMinMs": config.jitter_min_ms,
                        "jitterMaxMs": config.jitter_max_ms,
                        "poisonProbability": config.poison_probability,
                        "sendTimeoutMs": config.send_timeout.as_millis() as u64,
                    },
                }),
            ))
        }

        (&Method::GET, ["export"]) => {
            Ok(json_response(StatusCode::OK, &ctx.store.export_state()))
        }
        (&Method::POST, ["load"]) => {
            let snapshot: StoreState = parse_json(&body)?;
            ctx.store.import_state(snapshot)?;
            Ok(no_content())
        }
        (&Method::POST, ["reset"]) => {
            ctx.store.reset();
            Ok(no_content())
        }

        (&Method::GET, ["deliveries"]) => {
            let deliveries = ctx.dispatcher.log().deliveries();
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(deliveries, page.start_at, page.max_results),
            ))
        }
        (&Method::GET, ["delivery-attempts"]) => {
            let attempts = ctx.dispatcher.log().attempts();
            Ok(json_response(
                StatusCode::OK,
                &Page::slice(attempts, page.start_at, page.max_results),
            ))
        }

        _ => Err(ApiError::not_found("no such resource")),
    }
}
