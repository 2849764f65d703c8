//! Contract tests driving the full HTTP surface against an in-process
//! server on an ephemeral port.

use mocktrack_server::api::server::ApiServer;
use mocktrack_server::api::AppContext;
use mocktrack_server::gate::Gate;
use mocktrack_server::hook::{DispatcherConfig, WebhookDispatcher};
use mocktrack_server::store::{sample_state, Store};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TOKEN: &str = "mock-token-alice";

/// Start a server with fast webhook settings; returns its base URL.
async fn start_server() -> String {
    let dispatcher = Arc::new(WebhookDispatcher::new(DispatcherConfig {
        jitter_min_ms: 0,
        jitter_max_ms: 5,
        poison_probability: 0.0,
        send_timeout: Duration::from_secs(2),
        default_secret: "test-secret".to_string(),
    }));
    let store = Arc::new(Store::new(sample_state(), dispatcher.clone()));
    let gate = Arc::new(Gate::new(store.clone()));
    let ctx = Arc::new(AppContext {
        store,
        gate,
        dispatcher,
        started_at: Instant::now(),
    });

    let server = ApiServer::bind("127.0.0.1:0".parse().unwrap(), ctx)
        .await
        .expect("bind test server");
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    format!("http://{addr}")
}

/// Minimal webhook receiver that counts POSTs it sees.
async fn start_receiver() -> (String, Arc<AtomicUsize>) {
    use bytes::Bytes;
    use http_body_util::Full;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let hits = Arc::clone(&hits_clone);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |_req| {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, hyper::Error>(hyper::Response::new(Full::new(Bytes::new())))
                    }
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    (format!("http://{addr}/hook"), hits)
}

fn client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

async fn create_issue(client: &Client, base: &str, project: &str, summary: &str) -> Value {
    let response = client
        .post(format!("{base}/rest/api/3/issue"))
        .bearer_auth(TOKEN)
        .json(&json!({
            "projectKey": project,
            "issueTypeId": "10100",
            "summary": summary,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201, "create issue should return 201");
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_missing_token_is_unauthorized_with_challenge() {
    let base = start_server().await;
    let response = client()
        .get(format!("{base}/rest/api/3/myself"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert!(response.headers().get("www-authenticate").is_some());

    let body: Value = response.json().await.unwrap();
    assert!(body["errorMessages"].as_array().is_some());
}

#[tokio::test]
async fn test_myself_resolves_the_token_principal() {
    let base = start_server().await;
    let body: Value = client()
        .get(format!("{base}/rest/api/3/myself"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["accountId"], "alice");
    assert!(body["displayName"].as_str().is_some());
}

#[tokio::test]
async fn test_issue_crud_and_comments() {
    let base = start_server().await;
    let client = client();

    let created = create_issue(&client, &base, "DEV", "contract test issue").await;
    let key = created["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("DEV-"));

    // Read it back.
    let item: Value = client
        .get(format!("{base}/rest/api/3/issue/{key}"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item["summary"], "contract test issue");
    assert_eq!(item["description"]["type"], "doc");

    // Partial update returns 204.
    let response = client
        .put(format!("{base}/rest/api/3/issue/{key}"))
        .bearer_auth(TOKEN)
        .json(&json!({"summary": "renamed", "assigneeId": "bob"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // Comment round trip.
    let comment: Value = client
        .post(format!("{base}/rest/api/3/issue/{key}/comment"))
        .bearer_auth(TOKEN)
        .json(&json!({"body": "plain text comment"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(comment["body"]["type"], "doc");

    let comments: Value = client
        .get(format!("{base}/rest/api/3/issue/{key}/comment"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(comments["total"], 1);
    assert_eq!(comments["isLast"], true);

    // Unknown issue renders the envelope with a 404.
    let response = client
        .get(format!("{base}/rest/api/3/issue/DEV-99999"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_search_with_jql_and_pagination_envelope() {
    let base = start_server().await;
    let client = client();

    for i in 0..5 {
        create_issue(&client, &base, "DEV", &format!("searchable {i}")).await;
    }

    let body: Value = client
        .get(format!(
            "{base}/rest/api/3/search?jql=project%20%3D%20DEV%20ORDER%20BY%20created%20DESC&startAt=0&maxResults=3"
        ))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["startAt"], 0);
    assert_eq!(body["maxResults"], 3);
    assert_eq!(body["values"].as_array().unwrap().len(), 3);
    assert_eq!(body["isLast"], false);
    // Newest first under ORDER BY created DESC.
    assert_eq!(body["values"][0]["summary"], "searchable 4");
}

#[tokio::test]
async fn test_forced_rate_limit_header() {
    let base = start_server().await;
    let client = client();

    // Flagged token + header: deterministic 429 with retry guidance.
    let response = client
        .get(format!("{base}/rest/api/3/myself"))
        .bearer_auth("mock-token-forced")
        .header("X-Mock-Force-429", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    assert!(response.headers().get("x-ratelimit-remaining").is_some());

    // Unflagged token ignores the header.
    let response = client
        .get(format!("{base}/rest/api/3/myself"))
        .bearer_auth(TOKEN)
        .header("X-Mock-Force-429", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_transition_listing_and_conflict() {
    let base = start_server().await;
    let client = client();

    let created = create_issue(&client, &base, "DEV", "workflow item").await;
    let key = created["key"].as_str().unwrap();

    let transitions: Value = client
        .get(format!("{base}/rest/api/3/issue/{key}/transitions"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let offered: Vec<&str> = transitions["values"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert!(offered.contains(&"11"));
    assert!(!offered.contains(&"21"));

    // Applying a transition whose source does not match conflicts.
    let response = client
        .post(format!("{base}/rest/api/3/issue/{key}/transitions"))
        .bearer_auth(TOKEN)
        .json(&json!({"transition": {"id": "21"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // The offered one succeeds.
    let response = client
        .post(format!("{base}/rest/api/3/issue/{key}/transitions"))
        .bearer_auth(TOKEN)
        .json(&json!({"transition": {"id": "11"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let item: Value = client
        .get(format!("{base}/rest/api/3/issue/{key}"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item["statusId"], "10001");
}

#[tokio::test]
async fn test_webhook_matching_and_isolation() {
    let base = start_server().await;
    let client = client();
    let (hook_url, hits) = start_receiver().await;

    // Register for item_created in DEV only.
    let response = client
        .post(format!("{base}/rest/webhooks/1.0/webhook"))
        .bearer_auth(TOKEN)
        .json(&json!({
            "url": hook_url,
            "events": ["item_created"],
            "filter": "project = DEV",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // SUP creation must not reach the hook. The service-desk issue type is
    // required for SUP; use the generic create with that type.
    let response = client
        .post(format!("{base}/rest/api/3/issue"))
        .bearer_auth(TOKEN)
        .json(&json!({
            "projectKey": "SUP",
            "issueTypeId": "10200",
            "summary": "unrelated support issue",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // DEV creation must reach it exactly once, without slowing the 201.
    create_issue(&client, &base, "DEV", "hooked issue").await;

    // Poll the delivery log until the single delivery lands.
    let mut deliveries = Value::Null;
    for _ in 0..100 {
        deliveries = client
            .get(format!("{base}/_mock/deliveries"))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if deliveries["total"] == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(deliveries["total"], 1, "expected exactly one delivery");
    let record = &deliveries["values"][0];
    assert_eq!(record["eventType"], "item_created");
    assert_eq!(record["outcome"], "delivered");
    assert!(record["eventId"].as_str().is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // The attempt log carries the structured view.
    let attempts: Value = client
        .get(format!("{base}/_mock/delivery-attempts"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(attempts["total"], 1);
    assert_eq!(attempts["values"][0]["status"], 200);
}

#[tokio::test]
async fn test_service_desk_request_flow() {
    let base = start_server().await;
    let client = client();

    let created: Value = client
        .post(format!("{base}/rest/servicedeskapi/request"))
        .bearer_auth(TOKEN)
        .json(&json!({"summary": "need a license", "requestTypeId": "100"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let issue_key = created["issueKey"].as_str().unwrap().to_string();
    assert!(issue_key.starts_with("SUP-"));

    let approvals: Value = client
        .get(format!(
            "{base}/rest/servicedeskapi/request/{issue_key}/approval"
        ))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(approvals["total"], 1);
    let approval_id = approvals["values"][0]["id"].as_u64().unwrap();

    // Decide once: ok. Decide twice: conflict.
    let response = client
        .post(format!(
            "{base}/rest/servicedeskapi/request/{issue_key}/approval/{approval_id}"
        ))
        .bearer_auth(TOKEN)
        .json(&json!({"decision": "approve"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .post(format!(
            "{base}/rest/servicedeskapi/request/{issue_key}/approval/{approval_id}"
        ))
        .bearer_auth(TOKEN)
        .json(&json!({"decision": "decline"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn test_agile_sprint_lifecycle_over_http() {
    let base = start_server().await;
    let client = client();

    let sprint: Value = client
        .post(format!("{base}/rest/agile/1.0/sprint"))
        .bearer_auth(TOKEN)
        .json(&json!({"boardId": 1, "name": "HTTP sprint"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sprint["state"], "future");
    let sprint_id = sprint["id"].as_u64().unwrap();

    let response = client
        .put(format!("{base}/rest/agile/1.0/sprint/{sprint_id}"))
        .bearer_auth(TOKEN)
        .json(&json!({"state": "active"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Backwards is a conflict.
    let response = client
        .put(format!("{base}/rest/agile/1.0/sprint/{sprint_id}"))
        .bearer_auth(TOKEN)
        .json(&json!({"state": "future"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // Move an item in and read it back from the sprint.
    let created = create_issue(&client, &base, "DEV", "sprint-bound").await;
    let key = created["key"].as_str().unwrap();
    let response = client
        .post(format!("{base}/rest/agile/1.0/sprint/{sprint_id}/issue"))
        .bearer_auth(TOKEN)
        .json(&json!({"issues": [key]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let issues: Value = client
        .get(format!("{base}/rest/agile/1.0/sprint/{sprint_id}/issue"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(issues["values"]
        .as_array()
        .unwrap()
        .iter()
        .any(|i| i["key"] == *key));
}

#[tokio::test]
async fn test_operator_export_load_reset() {
    let base = start_server().await;
    let client = client();

    create_issue(&client, &base, "DEV", "exported issue").await;
    let snapshot: Value = client
        .get(format!("{base}/_mock/export"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Reset drops the new issue.
    let response = client
        .post(format!("{base}/_mock/reset"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // Load brings it back.
    let response = client
        .post(format!("{base}/_mock/load"))
        .bearer_auth(TOKEN)
        .json(&snapshot)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let search: Value = client
        .get(format!(
            "{base}/rest/api/3/search?jql=summary%20%3D%20%22exported%20issue%22"
        ))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["total"], 1);

    let info: Value = client
        .get(format!("{base}/_mock/info"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(info["version"].as_str().is_some());
    assert!(info["counts"]["items"].as_u64().is_some());
}
