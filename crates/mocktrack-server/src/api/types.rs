//! Response shaping and request parsing helpers for the routers.

use crate::error::ApiError;
use crate::page::DEFAULT_PAGE_SIZE;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub type ApiResponse = Response<Full<Bytes>>;

/// Build a JSON response with the given status.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> ApiResponse {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("{}"))))
}

pub fn no_content() -> ApiResponse {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// The single domain-error-to-wire translation point. Attaches the
/// challenge and rate-limit metadata headers the contract promises.
pub fn error_response(err: &ApiError) -> ApiResponse {
    let mut builder = Response::builder()
        .status(err.status())
        .header("Content-Type", "application/json");

    match err {
        ApiError::Unauthorized(_) => {
            builder = builder.header("WWW-Authenticate", "Bearer realm=\"mocktrack\"");
        }
        ApiError::RateLimited {
            retry_after_secs,
            remaining,
            reset_epoch_secs,
        } => {
            builder = builder
                .header("Retry-After", retry_after_secs.to_string())
                .header("X-RateLimit-Remaining", remaining.to_string())
                .header("X-RateLimit-Reset", reset_epoch_secs.to_string());
        }
        _ => {}
    }

    let json =
        serde_json::to_string(&err.envelope()).unwrap_or_else(|_| "{\"errorMessages\":[]}".into());
    builder
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("{}"))))
}

/// Collect the request body.
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, ApiError> {
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| ApiError::Internal(format!("failed to read request body: {e}")))
}

/// Parse a JSON body into a typed value.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::validation(format!("invalid JSON body: {e}")))
}

/// `startAt`/`maxResults` query parameters with the usual defaults.
#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    pub start_at: usize,
    pub max_results: usize,
}

impl PageParams {
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = PageParams {
            start_at: 0,
            max_results: DEFAULT_PAGE_SIZE,
        };
        if let Some(q) = query {
            for pair in q.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    match key {
                        "startAt" => {
                            if let Ok(v) = value.parse() {
                                params.start_at = v;
                            }
                        }
                        "maxResults" => {
                            if let Ok(v) = value.parse() {
                                params.max_results = v;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        params
    }
}

/// Extract and percent-decode a single query parameter.
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let q = query?;
    for pair in q.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == name {
                return Some(
                    urlencoding::decode(value)
                        .map(|decoded| decoded.replace('+', " "))
                        .unwrap_or_else(|_| value.to_string()),
                );
            }
        }
    }
    None
}
