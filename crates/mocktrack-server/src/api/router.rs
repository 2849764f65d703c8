//! Top-level route dispatch.
//!
//! Every `/rest/*` route passes the gate (auth + cost-weighted rate limit)
//! before its handler runs; operator routes authenticate but are not rate
//! limited. Domain errors surface here, at exactly one translation point.

use crate::api::handlers::{agile, desk, hooks, operator, platform};
use crate::api::types::{collect_body, error_response, ApiResponse};
use crate::api::AppContext;
use crate::error::ApiError;
use crate::gate::{OperationCost, FORCE_RATE_LIMIT_HEADER};
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use http_body_util::Full;
use std::sync::Arc;
use tracing::debug;

/// Entry point wired into the hyper connection service.
pub async fn route_request(
    req: Request<Incoming>,
    ctx: Arc<AppContext>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    let authorization = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let force_rate_limit = req
        .headers()
        .get(FORCE_RATE_LIMIT_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    debug!(%method, %path, "request");

    let response = match dispatch(
        req,
        &ctx,
        &method,
        &path,
        query.as_deref(),
        authorization.as_deref(),
        force_rate_limit,
    )
    .await
    {
        Ok(response) => response,
        Err(err) => error_response(&err),
    };
    Ok(response)
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    req: Request<Incoming>,
    ctx: &AppContext,
    method: &Method,
    path: &str,
    query: Option<&str>,
    authorization: Option<&str>,
    force_rate_limit: bool,
) -> Result<ApiResponse, ApiError> {
    let body = if matches!(*method, Method::POST | Method::PUT) {
        collect_body(req).await?
    } else {
        Bytes::new()
    };

    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match segments.as_slice() {
        ["rest", "api", "3", rest @ ..] => {
            let cost = platform_cost(method, rest);
            let principal = ctx.gate.check(authorization, force_rate_limit, cost)?;
            platform::route(ctx, &principal, method, rest, query, body).await
        }
        ["rest", "agile", "1.0", rest @ ..] => {
            ctx.gate
                .check(authorization, force_rate_limit, method_cost(method))?;
            agile::route(ctx, method, rest, query, body).await
        }
        ["rest", "servicedeskapi", rest @ ..] => {
            let principal =
                ctx.gate
                    .check(authorization, force_rate_limit, method_cost(method))?;
            desk::route(ctx, &principal, method, rest, query, body).await
        }
        ["rest", "webhooks", "1.0", rest @ ..] => {
            ctx.gate
                .check(authorization, force_rate_limit, method_cost(method))?;
            hooks::route(ctx, method, rest, query, body).await
        }
        ["_mock", rest @ ..] => {
            // Operator endpoints observe the mock; they authenticate but are
            // never rate limited, so tests can inspect state mid-429.
            ctx.gate.authenticate_only(authorization)?;
            operator::route(ctx, method, rest, query, body).await
        }
        _ => Err(ApiError::not_found("no such resource")),
    }
}

fn platform_cost(method: &Method, segments: &[&str]) -> OperationCost {
    if *method == Method::GET && segments == ["search"] {
        return OperationCost::Search;
    }
    method_cost(method)
}

fn method_cost(method: &Method) -> OperationCost {
    if *method == Method::GET {
        OperationCost::Read
    } else {
        OperationCost::Write
    }
}
