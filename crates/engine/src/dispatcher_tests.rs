// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

fn ctx(pairs: &[(&str, &str)]) -> ContextMap {
    let map: BTreeMap<String, String> =
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    ContextMap::from_parameters(&map)
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{port}/run")
}

const TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn ok_json_object_becomes_a_delta() {
    let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let app = Router::new()
        .route(
            "/run",
            post(|State(seen): State<Arc<Mutex<Option<String>>>>, body: String| async move {
                *seen.lock() = Some(body);
                (StatusCode::OK, r#"{"pods":"[]"}"#)
            }),
        )
        .with_state(Arc::clone(&seen));
    let url = serve(app).await;

    let outcome = HttpDispatcher::new()
        .invoke(&url, TIMEOUT, &ctx(&[("1", "param")]))
        .await
        .unwrap();

    assert_eq!(outcome.delta.get("pods"), Some("[]"));
    assert_eq!(outcome.raw, r#"{"pods":"[]"}"#);
    // The request body was the serialized context.
    assert_eq!(seen.lock().as_deref(), Some(r#"{"1":"param"}"#));
}

#[tokio::test]
async fn ok_empty_body_is_an_empty_delta() {
    let app = Router::new().route("/run", post(|| async { (StatusCode::OK, "") }));
    let url = serve(app).await;

    let outcome = HttpDispatcher::new().invoke(&url, TIMEOUT, &ctx(&[])).await.unwrap();

    assert!(outcome.delta.is_empty());
    assert!(outcome.raw.is_empty());
}

#[tokio::test]
async fn ok_malformed_body_is_a_malformed_result() {
    let app = Router::new().route("/run", post(|| async { (StatusCode::OK, "not json") }));
    let url = serve(app).await;

    let err = HttpDispatcher::new().invoke(&url, TIMEOUT, &ctx(&[])).await.unwrap_err();

    assert!(matches!(err, DispatchError::Malformed(_)));
    assert_eq!(err.reason(), FailureReason::MalformedResult);
}

#[tokio::test]
async fn non_200_is_rejected_with_status_and_body() {
    let app = Router::new()
        .route("/run", post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "worker exploded") }));
    let url = serve(app).await;

    let err = HttpDispatcher::new().invoke(&url, TIMEOUT, &ctx(&[])).await.unwrap_err();

    assert_eq!(err, DispatchError::Rejected { status: 500, body: "worker exploded".to_string() });
    assert_eq!(err.reason(), FailureReason::OperationRejected);
}

#[tokio::test]
async fn rejection_body_is_truncated() {
    let app = Router::new().route(
        "/run",
        post(|| async { (StatusCode::BAD_GATEWAY, "x".repeat(REJECTION_BODY_LIMIT + 1000)) }),
    );
    let url = serve(app).await;

    let err = HttpDispatcher::new().invoke(&url, TIMEOUT, &ctx(&[])).await.unwrap_err();

    match err {
        DispatchError::Rejected { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body.len(), REJECTION_BODY_LIMIT);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn rejection_truncation_respects_char_boundaries() {
    // Three-byte characters guarantee the limit lands mid-character.
    let app = Router::new().route(
        "/run",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "€".repeat(2000)) }),
    );
    let url = serve(app).await;

    let err = HttpDispatcher::new().invoke(&url, TIMEOUT, &ctx(&[])).await.unwrap_err();

    match err {
        DispatchError::Rejected { body, .. } => {
            assert!(body.len() <= REJECTION_BODY_LIMIT);
            assert_eq!(body.len(), 4095);
            assert!(body.chars().all(|c| c == '€'));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[yare::parameterized(
    short_ascii    = { "abc", 4096, "abc" },
    exact_boundary = { "aé", 3, "aé" },
    mid_character  = { "aéé", 4, "aé" },
)]
fn truncate_utf8_never_splits_a_character(input: &str, max: usize, expected: &str) {
    assert_eq!(truncate_utf8(input.to_string(), max), expected);
}

#[tokio::test]
async fn slow_worker_times_out() {
    let app = Router::new().route(
        "/run",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            (StatusCode::OK, "{}")
        }),
    );
    let url = serve(app).await;

    let err = HttpDispatcher::new()
        .invoke(&url, Duration::from_millis(50), &ctx(&[]))
        .await
        .unwrap_err();

    assert_eq!(err, DispatchError::Timeout);
    assert_eq!(err.reason(), FailureReason::Timeout);
}

#[tokio::test]
async fn unreachable_worker_is_a_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = HttpDispatcher::new()
        .invoke(&format!("http://127.0.0.1:{port}/run"), TIMEOUT, &ctx(&[]))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Transport(_)));
    assert_eq!(err.reason(), FailureReason::Transport);
}
