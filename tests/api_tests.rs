//! HTTP surface driven through the router without a listener.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crackteam::api::router;
use crackteam::config::ServerConfig;
use crackteam::node::Node;

const MD5: &str = "5f4dcc3b5aa765d61d8327deb882cf99";

fn app(open_enrollment: bool) -> (Router, Node) {
    let node = Node::new(ServerConfig::default().with_open_enrollment(open_enrollment)).unwrap();
    (router(node.app_state()), node)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn submission(hash: &str) -> Value {
    json!({
        "teamId": "team_red",
        "requestedBy": "alice",
        "hash": hash,
        "wordlists": ["rockyou.txt"],
    })
}

#[tokio::test]
async fn health_reports_counts() {
    let (app, _node) = app(true);
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["jobs"], 0);
    assert_eq!(body["peers"], 0);
}

#[tokio::test]
async fn submit_identifies_hash_and_joins_duplicates() {
    let (app, _node) = app(true);

    let (status, created) = send(&app, "POST", "/api/jobs", Some(submission(MD5))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["outcome"], "created");
    let job_id = created["jobId"].as_str().unwrap().to_string();

    let (status, job) = send(&app, "GET", &format!("/api/jobs/{}", job_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "queued");
    assert_eq!(job["hashTypeInfo"]["hashType"], "MD5");
    assert_eq!(job["hashTypeInfo"]["hashcatMode"], 0);
    assert_eq!(job["strategy"], "dictionary");

    let (status, joined) = send(&app, "POST", "/api/jobs", Some(submission(MD5))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["outcome"], "joined");
    assert_eq!(joined["jobId"], job_id.as_str());

    let (_, list) = send(&app, "GET", "/api/jobs", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn explicit_hash_type_is_used_as_given() {
    let (app, _node) = app(true);
    let mut body = submission(MD5);
    body["hashType"] = json!({ "hashType": "NTLM", "confidence": 1.0, "hashcatMode": 1000 });
    body["strategy"] = json!("brute_force");

    let (status, created) = send(&app, "POST", "/api/jobs", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/jobs/{}", created["jobId"].as_str().unwrap());
    let (_, job) = send(&app, "GET", &uri, None).await;
    assert_eq!(job["hashTypeInfo"]["hashType"], "NTLM");
    assert_eq!(job["strategy"], "brute_force");
}

#[tokio::test]
async fn invalid_submissions_map_to_error_codes() {
    let (app, _node) = app(true);

    let (status, body) = send(&app, "POST", "/api/jobs", Some(submission("zzz"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "ENGINE_UNAVAILABLE");

    let mut empty = submission(MD5);
    empty["wordlists"] = json!([]);
    let (status, body) = send(&app, "POST", "/api/jobs", Some(empty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert!(body["error"].as_str().unwrap().contains("wordlist"));
}

#[tokio::test]
async fn unknown_job_is_404() {
    let (app, _node) = app(true);
    let (status, body) = send(&app, "GET", &format!("/api/jobs/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn cancel_with_and_without_reason() {
    let (app, node) = app(true);
    let (_, created) = send(&app, "POST", "/api/jobs", Some(submission(MD5))).await;
    let job_id = created["jobId"].as_str().unwrap().to_string();
    let uri = format!("/api/jobs/{}/cancel", job_id);

    let (status, body) = send(&app, "POST", &uri, Some(json!({ "reason": "typo" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);
    let id: Uuid = job_id.parse().unwrap();
    assert_eq!(
        node.coordinator.get_job_status(id).unwrap().message.as_deref(),
        Some("typo")
    );

    let (status, _) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, other) = send(&app, "POST", "/api/jobs", Some(submission(MD5))).await;
    let other_uri = format!("/api/jobs/{}/cancel", other["jobId"].as_str().unwrap());
    let (status, _) = send(&app, "POST", &other_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let other_id: Uuid = other["jobId"].as_str().unwrap().parse().unwrap();
    assert_eq!(
        node.coordinator.get_job_status(other_id).unwrap().message.as_deref(),
        Some("Cancelled by request")
    );
}

#[tokio::test]
async fn cache_lookup() {
    let (app, node) = app(true);
    let uri = format!("/api/cache/{}", MD5);

    let (status, _) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    node.coordinator.cache().put(MD5, "password", "p1").unwrap();
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plaintext"], "password");
    assert_eq!(body["solvedBy"], "p1");

    let (status, body) = send(&app, "POST", "/api/jobs", Some(submission(MD5))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "cached");
    assert_eq!(body["plaintext"], "password");
}

#[tokio::test]
async fn identify_ranks_candidates() {
    let (app, _node) = app(true);
    let (status, body) = send(&app, "POST", "/api/identify", Some(json!({ "hash": MD5 }))).await;
    assert_eq!(status, StatusCode::OK);
    let candidates = body["candidates"].as_array().unwrap();
    assert!(!candidates.is_empty() && candidates.len() <= 5);
    assert_eq!(candidates[0]["hashType"], "MD5");
}

#[tokio::test]
async fn team_membership_gates_submission() {
    let (app, _node) = app(false);

    let (status, team) = send(
        &app,
        "POST",
        "/api/teams",
        Some(json!({ "teamName": "red", "userName": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let team_id = team["teamId"].as_str().unwrap().to_string();
    let admin = team["userId"].as_str().unwrap().to_string();
    assert!(team_id.starts_with("team_"));
    assert!(admin.starts_with("user_"));

    let (status, joined) = send(
        &app,
        "POST",
        &format!("/api/teams/{}/join", team_id),
        Some(json!({ "userName": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["teamId"], team_id.as_str());

    let (status, members) = send(&app, "GET", &format!("/api/teams/{}/members", team_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let members = members.as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0]["role"], "admin");
    assert_eq!(members[1]["role"], "member");

    let mut outsider = submission(MD5);
    outsider["teamId"] = json!(team_id);
    outsider["requestedBy"] = json!("mallory");
    let (status, body) = send(&app, "POST", "/api/jobs", Some(outsider)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let mut member = submission(MD5);
    member["teamId"] = json!(team_id);
    member["requestedBy"] = json!(admin);
    let (status, _) = send(&app, "POST", "/api/jobs", Some(member)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_team_is_404() {
    let (app, _node) = app(false);
    let (status, body) = send(&app, "GET", "/api/teams/team_0_deadbeef/members", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(
        &app,
        "POST",
        "/api/teams/team_0_deadbeef/join",
        Some(json!({ "userName": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
