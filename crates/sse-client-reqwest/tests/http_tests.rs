//! End-to-end tests against a local axum SSE endpoint

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use futures::{stream, Stream, StreamExt, TryStreamExt};
use sse_client::{
    Callbacks, ClientConfig, CloseReason, ConnectRequest, ConnectionManager, Error, Event,
    EventStream, Transport,
};
use sse_client_reqwest::ReqwestTransport;
use tokio::sync::mpsc;

// ============== Test Server ==============

/// Sends two events on a fresh connection; on a resumed one, echoes the
/// `Last-Event-ID` it was given.
async fn events(headers: HeaderMap) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    let events = match last_event_id {
        None => vec![
            SseEvent::default().comment("welcome"),
            SseEvent::default().id("1").event("greeting").data("first"),
            SseEvent::default().id("2").data("line one\nline two"),
        ],
        Some(id) => vec![SseEvent::default().id("3").event("resumed").data(id)],
    };
    Sse::new(stream::iter(events.into_iter().map(Ok)))
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/events", get(events))
        .route("/no-content", get(|| async { StatusCode::NO_CONTENT }))
        .route("/html", get(|| async { Html("<p>not a stream</p>") }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn fast_retry() -> ClientConfig {
    ClientConfig::new().retry(Duration::from_millis(20))
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_closed(manager: &ConnectionManager) -> CloseReason {
    tokio::time::timeout(Duration::from_secs(10), manager.wait_closed())
        .await
        .expect("timed out waiting for close")
}

// ============== Transport Tests ==============

#[tokio::test]
async fn test_transport_sends_headers() {
    let base = spawn_server().await;
    let request = ConnectRequest {
        url: format!("{base}/events"),
        headers: BTreeMap::from([("Last-Event-ID".to_string(), "9".to_string())]),
    };

    let response = ReqwestTransport::new().connect(&request).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.is_event_stream());

    let body: Vec<u8> = response
        .body
        .try_fold(Vec::new(), |mut body, chunk| async move {
            body.extend_from_slice(&chunk);
            Ok(body)
        })
        .await
        .unwrap();
    let body = String::from_utf8(body).unwrap();
    assert!(body.contains("event: resumed"));
    assert!(body.contains("data: 9"));
}

#[tokio::test]
async fn test_event_stream_over_reqwest_body() {
    let base = spawn_server().await;
    let response = reqwest::get(format!("{base}/events")).await.unwrap();

    let events: Vec<Event> = EventStream::new(response.bytes_stream().boxed())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        events,
        vec![
            Event::new("greeting", "first").with_id("1"),
            Event::message("line one\nline two").with_id("2"),
        ]
    );
}

// ============== Connection Manager Tests ==============

#[tokio::test]
async fn test_manager_resumes_with_last_event_id() {
    let base = spawn_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let callbacks = Callbacks::new().on_message(move |event| {
        let _ = tx.send(event);
    });

    let manager = ConnectionManager::open(
        format!("{base}/events"),
        fast_retry(),
        ReqwestTransport::new(),
        callbacks,
    )
    .unwrap();

    assert_eq!(next_event(&mut rx).await, Event::new("greeting", "first").with_id("1"));
    assert_eq!(
        next_event(&mut rx).await,
        Event::message("line one\nline two").with_id("2")
    );
    // The server echoes the Last-Event-ID header of the reconnect
    assert_eq!(next_event(&mut rx).await, Event::new("resumed", "2").with_id("3"));

    manager.close();
    assert_eq!(wait_closed(&manager).await, CloseReason::Cancelled);
    assert_eq!(manager.parser_state().last_event_id.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_manager_no_content_is_terminal() {
    let base = spawn_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let callbacks = Callbacks::new().on_error(move |err| {
        let _ = tx.send(matches!(err, Some(Error::NoContent(204))));
    });

    let manager = ConnectionManager::open(
        format!("{base}/no-content"),
        fast_retry(),
        ReqwestTransport::new(),
        callbacks,
    )
    .unwrap();

    assert_eq!(wait_closed(&manager).await, CloseReason::NonRetryable);
    assert_eq!(rx.recv().await, Some(true));
}

#[tokio::test]
async fn test_manager_wrong_content_type_is_terminal() {
    let base = spawn_server().await;
    let manager = ConnectionManager::open(
        format!("{base}/html"),
        fast_retry(),
        ReqwestTransport::new(),
        Callbacks::new(),
    )
    .unwrap();

    assert_eq!(wait_closed(&manager).await, CloseReason::NonRetryable);
}

#[tokio::test]
async fn test_manager_connection_refused_is_retried() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let callbacks = Callbacks::new().on_error(move |err| {
        let _ = tx.send(matches!(err, Some(Error::Transport(_))));
    });

    let manager = ConnectionManager::open(
        format!("http://{addr}/events"),
        fast_retry().max_reconnect_attempts(2),
        ReqwestTransport::new(),
        callbacks,
    )
    .unwrap();

    assert_eq!(wait_closed(&manager).await, CloseReason::RetriesExhausted);
    for _ in 0..3 {
        assert_eq!(rx.recv().await, Some(true));
    }
}
