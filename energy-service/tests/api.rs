use std::{collections::HashMap, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use energy_client::domain::OwnerId;
use energy_service::{
    api::{self, AppState, StaticTokenIdentity},
    store::MemoryEnergyStore,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "energy-test-boundary";

fn app_with_limit(max_upload_bytes: usize) -> (Router, Arc<MemoryEnergyStore>) {
    let store = Arc::new(MemoryEnergyStore::new());
    let identity = StaticTokenIdentity::new(HashMap::from([
        ("alice-token".to_string(), OwnerId::new("alice")),
        ("bob-token".to_string(), OwnerId::new("bob")),
    ]));
    let state = AppState::new(store.clone(), Arc::new(identity), 0.12, max_upload_bytes);
    (api::router(state), store)
}

fn app() -> (Router, Arc<MemoryEnergyStore>) {
    app_with_limit(1024 * 1024)
}

fn upload_request(token: &str, csv: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"usage.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {csv}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::post("/upload-csv/")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn get_request(token: &str, uri: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

const SAMPLE: &str = "timestamp,consumption\n\
2024-01-01T08:00:00Z,20\n\
2024-01-01T18:00:00Z,40\n\
2024-01-02T09:15:00Z,30\n\
2024-01-02T09:45:00Z,10\n\
2024-02-01T00:00:00Z,25.5\n";

#[tokio::test]
async fn upload_then_query_rollups_and_statistics() {
    let (app, store) = app();

    let (status, body) = send(&app, upload_request("alice-token", SAMPLE)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "message": "Successfully processed 5 records" }));
    assert_eq!(store.record_count(&OwnerId::new("alice")).await, 5);

    let (status, body) = send(&app, get_request("alice-token", "/energy-data/?period=monthly")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            { "name": "Jan", "consumption": 100.0 },
            { "name": "Feb", "consumption": 25.5 },
        ])
    );

    let (_, body) = send(&app, get_request("alice-token", "/energy-data/?period=daily")).await;
    assert_eq!(
        body,
        json!([
            { "name": "01 Jan", "consumption": 60.0 },
            { "name": "02 Jan", "consumption": 40.0 },
            { "name": "01 Feb", "consumption": 25.5 },
        ])
    );

    let (_, body) = send(&app, get_request("alice-token", "/energy-data/?period=hourly")).await;
    assert_eq!(
        body,
        json!([
            { "hour": "08:00", "consumption": 20.0 },
            { "hour": "18:00", "consumption": 40.0 },
            { "hour": "09:00", "consumption": 20.0 },
            { "hour": "00:00", "consumption": 25.5 },
        ])
    );

    let (status, body) = send(&app, get_request("alice-token", "/statistics/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "total_consumption": 125.5,
            "average_daily": 41.83,
            "peak_consumption": { "value": 40.0, "timestamp": "2024-01-01T18:00:00Z" },
            "estimated_cost": 15.06,
        })
    );
}

#[tokio::test]
async fn period_defaults_to_monthly_and_rejects_unknown_values() {
    let (app, _) = app();
    send(&app, upload_request("alice-token", SAMPLE)).await;

    let (status, body) = send(&app, get_request("alice-token", "/energy-data/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (status, body) = send(&app, get_request("alice-token", "/energy-data/?period=weekly")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "error": "Invalid period parameter. Use 'monthly', 'daily', or 'hourly'" })
    );
}

#[tokio::test]
async fn rejected_upload_changes_nothing() {
    let (app, store) = app();
    let alice = OwnerId::new("alice");

    let (status, body) = send(&app, upload_request("alice-token", "timestamp,usage\n2024-01-01,1\n")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("consumption"));

    let bad_row = "timestamp,consumption\n2024-01-01,1\n2024-01-02,2\nyesterday,3\n2024-01-04,4\n";
    let (status, body) = send(&app, upload_request("alice-token", bad_row)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("row 3: invalid timestamp 'yesterday'"));

    assert_eq!(store.record_count(&alice).await, 0);

    let (_, body) = send(&app, get_request("alice-token", "/uploads/")).await;
    let uploads = body.as_array().unwrap();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|u| u["processed"] == json!(false)));
}

#[tokio::test]
async fn owners_only_see_their_own_data() {
    let (app, _) = app();
    send(&app, upload_request("alice-token", SAMPLE)).await;

    let (status, body) = send(&app, get_request("bob-token", "/statistics/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "total_consumption": 0.0,
            "average_daily": 0.0,
            "peak_consumption": { "value": 0.0, "timestamp": null },
            "estimated_cost": 0.0,
        })
    );

    let (_, body) = send(&app, get_request("bob-token", "/energy-data/?period=daily")).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthorized() {
    let (app, _) = app();

    let req = Request::get("/statistics/").body(Body::empty()).unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, get_request("nope", "/statistics/")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn multipart_without_file_field_is_bad_request() {
    let (app, _) = app();
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"note\"\r\n\r\n\
         hello\r\n\
         --{BOUNDARY}--\r\n"
    );
    let req = Request::post("/upload-csv/")
        .header(header::AUTHORIZATION, "Bearer alice-token")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "missing file field" }));
}

#[tokio::test]
async fn oversized_upload_is_refused() {
    let (app, store) = app_with_limit(64);
    let big = format!("timestamp,consumption\n{}", "2024-01-01T00:00:00Z,1\n".repeat(20));

    let resp = app.clone().oneshot(upload_request("alice-token", &big)).await.unwrap();
    assert!(resp.status().is_client_error());
    assert_eq!(store.record_count(&OwnerId::new("alice")).await, 0);
}
