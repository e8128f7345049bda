use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, BodyDataStream},
    http::{header, Method, Request, StatusCode},
    Router,
};
use backend::{
    http::{router, AppState},
    FixedClock, MemoryStore, TaskStore,
};
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use serde_json::{json, Value};
use shared::{NewTask, Task};
use tokio::time::{sleep, timeout};
use tower::ServiceExt;
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()
}

fn app() -> (Router, Arc<MemoryStore>) {
    app_at(now())
}

fn app_at(now: DateTime<Utc>) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), Arc::new(FixedClock::new(now)), chrono_tz::UTC);
    (router(state), store)
}

async fn insert_due(store: &MemoryStore, text: &str, due: DateTime<Utc>) {
    let mut draft = NewTask::from_input(text, now()).unwrap();
    draft.due_date = Some(due);
    store.insert(draft).await.unwrap();
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn read_until(body: &mut BodyDataStream, received: &mut String, marker: &str) {
    timeout(Duration::from_secs(2), async {
        while !received.contains(marker) {
            let chunk = body.next().await.expect("stream ended early").unwrap();
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("timed out reading the event stream");
}

fn texts(value: &Value) -> Vec<String> {
    serde_json::from_value::<Vec<Task>>(value.clone())
        .unwrap()
        .into_iter()
        .map(|t| t.text)
        .collect()
}

#[tokio::test]
async fn create_then_list_by_tab() {
    let (app, store) = app();
    let mut undated = NewTask::from_input("someday", now()).unwrap();
    undated.due_date = None;
    store.insert(undated).await.unwrap();

    let (status, created) = send(&app, Method::POST, "/api/tasks", Some(json!({ "text": "buy milk" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["text"], "buy milk");
    assert_eq!(created["completed"], false);

    let (status, today) = send(&app, Method::GET, "/api/tasks?tab=today", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(texts(&today), ["buy milk"]);

    let (_, all) = send(&app, Method::GET, "/api/tasks?tab=all", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn missing_tab_defaults_to_today() {
    let (app, store) = app();
    let mut old = NewTask::from_input("last year", now()).unwrap();
    old.due_date = Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap());
    store.insert(old).await.unwrap();

    let (status, body) = send(&app, Method::GET, "/api/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(texts(&body).is_empty());
}

#[tokio::test]
async fn blank_text_is_a_bad_request() {
    let (app, store) = app();
    let (status, body) = send(&app, Method::POST, "/api/tasks", Some(json!({ "text": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("empty"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn unknown_or_empty_tab_is_a_bad_request() {
    let (app, _) = app();
    let (status, _) = send(&app, Method::GET, "/api/tasks?tab=decade", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::GET, "/api/tasks?tab=", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn zone_name_keeps_year_bounds_across_dst() {
    // July in Berlin is UTC+2, but the year started at UTC+1.
    let (app, store) = app_at(Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap());
    insert_due(&store, "new year's eve", Utc.with_ymd_and_hms(2023, 12, 31, 22, 30, 0).unwrap()).await;
    insert_due(&store, "new year", Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap()).await;
    insert_due(&store, "last night of 2024", Utc.with_ymd_and_hms(2024, 12, 31, 22, 30, 0).unwrap()).await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/tasks?tab=yearly&tz=Europe%2FBerlin&utc_offset=120",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(texts(&body), ["new year", "last night of 2024"]);
}

#[tokio::test]
async fn unknown_zone_name_is_a_bad_request() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/api/tasks?tab=today&tz=Mars%2FOlympus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Mars/Olympus"));
}

#[tokio::test]
async fn client_offset_moves_the_day_boundary() {
    let (app, store) = app();
    // 22:30 UTC on the 14th is already the 15th at UTC+3.
    let mut late = NewTask::from_input("late", now()).unwrap();
    late.due_date = Some(Utc.with_ymd_and_hms(2024, 3, 14, 22, 30, 0).unwrap());
    store.insert(late).await.unwrap();

    let (_, utc) = send(&app, Method::GET, "/api/tasks?tab=today", None).await;
    assert_eq!(texts(&utc), ["late"]);

    let (_, plus_three) = send(&app, Method::GET, "/api/tasks?tab=today&utc_offset=180", None).await;
    assert!(texts(&plus_three).is_empty());
}

#[tokio::test]
async fn update_patches_completed_only() {
    let (app, store) = app();
    let task = store.insert(NewTask::from_input("flip", now()).unwrap()).await.unwrap();
    let uri = format!("/api/tasks/{}", task.id);

    let (status, body) = send(&app, Method::PATCH, &uri, Some(json!({ "completed": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed"], true);
    assert_eq!(body["text"], "flip");

    let (status, _) = send(&app, Method::PUT, &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let (app, store) = app();
    let task = store.insert(NewTask::from_input("bye", now()).unwrap()).await.unwrap();
    let uri = format!("/api/tasks/{}", task.id);

    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], task.id.to_string());

    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let (app, store) = app();
    store.fail_writes(true).await;
    let (status, _) = send(&app, Method::POST, "/api/tasks", Some(json!({ "text": "x" }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/tasks/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn live_endpoint_streams_server_sent_events() {
    let (app, store) = app();
    insert_due(&store, "water plants", now()).await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/tasks/live?tab=weekly")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let mut body = response.into_body().into_data_stream();
    let mut received = String::new();
    read_until(&mut body, &mut received, "event: snapshot").await;
    read_until(&mut body, &mut received, "water plants").await;

    store.fail_reads(true).await;
    store.touch();
    read_until(&mut body, &mut received, "event: failure").await;

    let end = timeout(Duration::from_secs(2), body.next())
        .await
        .expect("stream did not end after the failure event");
    assert!(end.is_none());
    assert!(received.contains("data: store unavailable"));
    assert_eq!(received.matches("event: failure").count(), 1);

    timeout(Duration::from_secs(2), async {
        while store.watchers() != 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("live query still running after the stream ended");
}
