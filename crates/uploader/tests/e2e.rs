//! End-to-end tests over real HTTP: an in-process axum server implements
//! the negotiation endpoint and the chunk-transfer protocol, and the
//! uploader drives full sessions against it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{patch, post};
use chrono::Utc;
use tempfile::TempDir;
use tokio::net::TcpListener;

use skylift_protocol::constants::OFFSET_HEADER;
use skylift_protocol::types::{ResumeRecord, UploadDestination, UploadStatus};
use skylift_transfer::{FileDescriptor, MemoryResumeStore, ResumeStore};
use skylift_uploader::{RetrySchedule, UploadEvent, Uploader, UploaderOptions};

const MIB: usize = 1024 * 1024;

/// Shared state of the test upload server.
struct UploadServer {
    received: Mutex<Vec<u8>>,
    patches: AtomicUsize,
    negotiations: AtomicUsize,
    /// Once this many chunks have landed, further PATCHes get 500 until
    /// the limit is lifted.
    fail_after: Mutex<Option<usize>>,
    upload_url: Mutex<String>,
}

impl UploadServer {
    fn new() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            patches: AtomicUsize::new(0),
            negotiations: AtomicUsize::new(0),
            fail_after: Mutex::new(None),
            upload_url: Mutex::new(String::new()),
        }
    }

    fn upload_url(&self) -> String {
        self.upload_url.lock().unwrap().clone()
    }
}

async fn negotiate_handler(State(server): State<Arc<UploadServer>>) -> impl IntoResponse {
    server.negotiations.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({
        "success": true,
        "data": {
            "endpoint": server.upload_url(),
            "headers": {"X-Session-Token": "tok-1"},
            "collection": "col-1"
        }
    }))
}

async fn declined_handler(State(server): State<Arc<UploadServer>>) -> impl IntoResponse {
    server.negotiations.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({"success": false}))
}

async fn patch_handler(
    State(server): State<Arc<UploadServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(limit) = *server.fail_after.lock().unwrap()
        && server.patches.load(Ordering::SeqCst) >= limit
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new()).into_response();
    }

    let offset: u64 = match headers
        .get(OFFSET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
    {
        Some(offset) => offset,
        None => return (StatusCode::BAD_REQUEST, HeaderMap::new()).into_response(),
    };

    let mut received = server.received.lock().unwrap();
    if offset != received.len() as u64 {
        return (StatusCode::CONFLICT, HeaderMap::new()).into_response();
    }
    received.extend_from_slice(&body);
    server.patches.fetch_add(1, Ordering::SeqCst);

    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(OFFSET_HEADER, received.len().to_string().parse().unwrap());
    (StatusCode::NO_CONTENT, resp_headers).into_response()
}

async fn head_handler(State(server): State<Arc<UploadServer>>) -> impl IntoResponse {
    let len = server.received.lock().unwrap().len();
    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(OFFSET_HEADER, len.to_string().parse().unwrap());
    (StatusCode::OK, resp_headers)
}

/// Spawns the test server. Returns its state and the negotiation URL.
async fn spawn_server(decline_negotiation: bool) -> (Arc<UploadServer>, String) {
    let server = Arc::new(UploadServer::new());
    let negotiate = if decline_negotiation {
        post(declined_handler)
    } else {
        post(negotiate_handler)
    };
    let app = axum::Router::new()
        .route("/negotiate", negotiate)
        .route("/files/f1", patch(patch_handler).head(head_handler))
        // The chunk size under test (3 MiB) exceeds axum's 2 MiB default
        // request-body cap, which would 413 every PATCH before the handler
        // runs. Lift it so the server accepts real chunk bodies.
        .layer(axum::extract::DefaultBodyLimit::disable())
        .with_state(Arc::clone(&server));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    *server.upload_url.lock().unwrap() = format!("http://{addr}/files/f1");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (server, format!("http://{addr}/negotiate"))
}

fn test_file(dir: &TempDir, size: usize) -> (FileDescriptor, Vec<u8>) {
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    let path = dir.path().join("payload.bin");
    std::fs::write(&path, &data).unwrap();
    let file = FileDescriptor::from_path(&path)
        .unwrap()
        .with_content_type("application/octet-stream");
    (file, data)
}

fn options(negotiate_url: &str) -> UploaderOptions {
    let mut opts = UploaderOptions::new(negotiate_url);
    opts.chunk_size = 3 * MIB;
    opts
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<UploadEvent>) -> Vec<UploadEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn ten_mib_file_uploads_in_four_chunks() {
    let (server, negotiate_url) = spawn_server(false).await;
    let dir = TempDir::new().unwrap();
    let (file, data) = test_file(&dir, 10 * MIB);
    let fingerprint = file.fingerprint();

    let store = Arc::new(MemoryResumeStore::new());
    let mut up = Uploader::new(options(&negotiate_url), Arc::clone(&store) as _);
    let events_rx = up.take_events().unwrap();

    up.add_file(file).await.unwrap();
    let results = up.start().await.unwrap();
    drop(up);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, UploadStatus::Completed);
    assert_eq!(results[0].bytes_uploaded, 10 * MIB as u64);

    // 3 + 3 + 3 + 1 MiB.
    assert_eq!(server.patches.load(Ordering::SeqCst), 4);
    assert_eq!(server.negotiations.load(Ordering::SeqCst), 1);
    assert_eq!(*server.received.lock().unwrap(), data);

    // Completion implies record absence.
    assert!(store.get(&fingerprint).unwrap().is_none());

    let events = drain(events_rx).await;
    let succeeded = events
        .iter()
        .filter(|e| matches!(e, UploadEvent::Succeeded { .. }))
        .count();
    let failed = events
        .iter()
        .filter(|e| matches!(e, UploadEvent::Failed { .. }))
        .count();
    assert_eq!((succeeded, failed), (1, 0));

    let last_progress = events
        .iter()
        .rev()
        .find_map(|e| match e {
            UploadEvent::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .unwrap();
    assert!((last_progress.percent() - 100.0).abs() < f64::EPSILON);
    assert_eq!(last_progress.bytes_uploaded, 10 * MIB as u64);
}

#[tokio::test]
async fn declined_negotiation_sends_no_chunks() {
    let (server, negotiate_url) = spawn_server(true).await;
    let dir = TempDir::new().unwrap();
    let (file, _) = test_file(&dir, MIB);

    let store = Arc::new(MemoryResumeStore::new());
    let mut up = Uploader::new(options(&negotiate_url), store);
    let events_rx = up.take_events().unwrap();

    up.add_file(file).await.unwrap();
    let results = up.start().await.unwrap();
    drop(up);

    assert_eq!(results[0].status, UploadStatus::Failed);
    assert_eq!(server.patches.load(Ordering::SeqCst), 0);

    let events = drain(events_rx).await;
    assert!(
        events
            .iter()
            .any(|e| matches!(e, UploadEvent::Failed { .. }))
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, UploadEvent::Succeeded { .. }))
    );
}

#[tokio::test]
async fn interrupted_upload_resumes_where_it_stopped() {
    let (server, negotiate_url) = spawn_server(false).await;
    let dir = TempDir::new().unwrap();
    let (file, data) = test_file(&dir, 10 * MIB);
    let fingerprint = file.fingerprint();
    let store = Arc::new(MemoryResumeStore::new());

    // First run: the server accepts two chunks and then starts failing.
    *server.fail_after.lock().unwrap() = Some(2);
    let mut opts = options(&negotiate_url);
    opts.retry_schedule = RetrySchedule::new(vec![Duration::ZERO]);
    let mut up = Uploader::new(opts, Arc::clone(&store) as _);
    up.add_file(file.clone()).await.unwrap();
    let results = up.start().await.unwrap();
    drop(up);

    assert_eq!(results[0].status, UploadStatus::Failed);
    let record = store.get(&fingerprint).unwrap().unwrap();
    assert_eq!(record.offset, 6 * MIB as u64);

    // Second run: the server recovered; the session resumes at 6 MiB.
    *server.fail_after.lock().unwrap() = None;
    let patches_before = server.patches.load(Ordering::SeqCst);
    let mut up = Uploader::new(options(&negotiate_url), Arc::clone(&store) as _);
    up.add_file(file).await.unwrap();
    let results = up.start().await.unwrap();
    drop(up);

    assert_eq!(results[0].status, UploadStatus::Completed);
    assert_eq!(*server.received.lock().unwrap(), data);
    // Only the remaining 4 MiB went out: one 3 MiB chunk and one 1 MiB.
    assert_eq!(server.patches.load(Ordering::SeqCst) - patches_before, 2);
    assert!(store.get(&fingerprint).unwrap().is_none());
}

#[tokio::test]
async fn stale_local_record_defers_to_server_offset() {
    let (server, negotiate_url) = spawn_server(false).await;
    let dir = TempDir::new().unwrap();
    let (file, data) = test_file(&dir, 10 * MIB);
    let fingerprint = file.fingerprint();

    // The server already holds 6 MiB; the local record only knows of 3.
    server
        .received
        .lock()
        .unwrap()
        .extend_from_slice(&data[..6 * MIB]);
    let store = Arc::new(MemoryResumeStore::new());
    let mut headers = HashMap::new();
    headers.insert("X-Session-Token".to_string(), "tok-1".to_string());
    store
        .put(
            &fingerprint,
            ResumeRecord {
                destination: UploadDestination {
                    endpoint: server.upload_url(),
                    headers,
                    collection: "col-1".into(),
                    title: file.name.clone(),
                    content_type: file.content_type.clone(),
                },
                offset: 3 * MIB as u64,
                updated_at: Utc::now(),
            },
        )
        .unwrap();

    let mut up = Uploader::new(options(&negotiate_url), Arc::clone(&store) as _);
    up.add_file(file).await.unwrap();
    let results = up.start().await.unwrap();
    drop(up);

    assert_eq!(results[0].status, UploadStatus::Completed);
    assert_eq!(*server.received.lock().unwrap(), data);
    // Two chunks for the remaining 4 MiB; nothing below 6 MiB re-sent.
    assert_eq!(server.patches.load(Ordering::SeqCst), 2);
}
