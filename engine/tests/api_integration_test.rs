//! HTTP and WebSocket transport tests
//!
//! Each test serves the real router on 127.0.0.1:0 and talks to it with
//! reqwest and tokio-tungstenite.

use futures::{SinkExt, StreamExt};
use proctor_engine::config::Config;
use proctor_engine::db::Database;
use proctor_engine::server::{self, AppState};
use proctor_engine::store::SessionStore;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUESTION_BANK: &str = r#"{
    "sections": [{
        "id": "reading",
        "questions": [
            {"id": "r1", "options": [{"key": "A"}, {"key": "B", "correct": true}]}
        ]
    }]
}"#;

struct TestServer {
    addr: SocketAddr,
    sessions: Arc<dyn SessionStore>,
    _db: Database,
    _dir: TempDir,
}

impl TestServer {
    fn url(&self, route: &str) -> String {
        format!("http://{}{}", self.addr, route)
    }
}

async fn spawn_server(detector_url: Option<String>) -> TestServer {
    spawn_configured(|config| config.proctoring.detector_url = detector_url).await
}

async fn spawn_configured(configure: impl FnOnce(&mut Config)) -> TestServer {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("english_exam.json"), QUESTION_BANK).unwrap();

    let mut config = Config::default();
    config.grading.rubrics_dir = dir.path().to_path_buf();
    config.grading.question_bank_dir = dir.path().to_path_buf();
    configure(&mut config);

    let db = Database::new(&dir.path().join("proctor.db")).await.unwrap();
    let sessions: Arc<dyn SessionStore> = Arc::new(db.sessions());
    let state = AppState::with_provider(&config, Arc::clone(&sessions), None).unwrap();
    let app = server::router(state, &config.server).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        sessions,
        _db: db,
        _dir: dir,
    }
}

fn png_frame() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(8, 6)
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    bytes
}

/// Landmarks for a single face looking straight at the camera
fn frontal_face() -> Value {
    let mut points = vec![json!({"x": 0.5, "y": 0.5}); 468];
    points[1] = json!({"x": 0.5, "y": 0.53});
    points[10] = json!({"x": 0.5, "y": 0.2});
    points[152] = json!({"x": 0.5, "y": 0.8});
    points[33] = json!({"x": 0.4, "y": 0.4});
    points[263] = json!({"x": 0.6, "y": 0.4});
    points[133] = json!({"x": 0.45, "y": 0.4});
    points[362] = json!({"x": 0.55, "y": 0.4});
    json!({ "landmarks": points })
}

#[tokio::test]
async fn test_root_reports_status() {
    let server = spawn_server(None).await;

    let body: Value = reqwest::get(server.url("/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "running");
    assert_eq!(body["detector"], false);
    assert_eq!(body["ai_grading"], false);
}

#[tokio::test]
async fn test_frame_without_detector_is_unavailable() {
    let server = spawn_server(None).await;

    let response = reqwest::Client::new()
        .post(server.url("/frames"))
        .body(png_frame())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert!(body["hint"].is_string());
}

#[tokio::test]
async fn test_garbage_frame_is_bad_request() {
    let server = spawn_server(None).await;

    let response = reqwest::Client::new()
        .post(server.url("/frames"))
        .body("definitely not an image")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_frame_analysis_with_detector() {
    let detector = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "faces": [frontal_face()] })),
        )
        .mount(&detector)
        .await;

    let server = spawn_server(Some(format!("{}/detect", detector.uri()))).await;

    let body: Value = reqwest::Client::new()
        .post(server.url("/frames"))
        .body(png_frame())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["faces"], 1);
    assert_eq!(body["yaw"], 0.0);
    assert_eq!(body["pitch"], 0.0);
    assert!(body["flag"].is_null());
    assert!(body["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_flagged_frame_records_incident() {
    let detector = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "faces": [] })))
        .mount(&detector)
        .await;

    let server = spawn_server(Some(detector.uri())).await;

    let body: Value = reqwest::Client::new()
        .post(server.url("/frames?candidate_id=c1"))
        .body(png_frame())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["faces"], 0);
    assert_eq!(body["flag"], "no_face");
    assert!(body["yaw"].is_null());

    let attempt = server.sessions.latest_attempt("c1").await.unwrap().unwrap();
    let incidents = server.sessions.list_incidents(&attempt.id).await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].incident_type, "no_face");
}

#[tokio::test]
async fn test_audio_stub() {
    let server = spawn_server(None).await;

    let body: Value = reqwest::Client::new()
        .post(server.url("/audio"))
        .body(vec![0u8; 16])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["message"], "Audio analysis not yet implemented");
}

#[tokio::test]
async fn test_heartbeat_ping_pong_and_status() {
    let server = spawn_server(None).await;

    let status: Value = reqwest::get(server.url("/status/c1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status, json!({"connected": false, "downtime": null}));

    let (mut socket, _) = tokio_tungstenite::connect_async(format!(
        "ws://{}/heartbeat/c1",
        server.addr
    ))
    .await
    .unwrap();

    socket.send(Message::Text("ping".to_string())).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    assert_eq!(reply, Message::Text("pong".to_string()));

    let status: Value = reqwest::get(server.url("/status/c1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status, json!({"connected": true, "downtime": 0.0}));

    socket.close(None).await.unwrap();

    // teardown happens on the server side after the close frame arrives
    let mut disconnected = false;
    for _ in 0..50 {
        let status: Value = reqwest::get(server.url("/status/c1"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if status["downtime"].is_null() {
            disconnected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(disconnected);
}

#[tokio::test]
async fn test_stale_connection_recorded_once() {
    let server = spawn_configured(|config| config.heartbeat.timeout_secs = 1).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!(
        "ws://{}/heartbeat/c1",
        server.addr
    ))
    .await
    .unwrap();
    socket.send(Message::Text("ping".to_string())).await.unwrap();
    socket.next().await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(1300)).await;

    for _ in 0..3 {
        let status: Value = reqwest::get(server.url("/status/c1"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["connected"], false);
        assert_eq!(status["flag"], "connectivity_timeout");
    }

    let attempt = server.sessions.latest_attempt("c1").await.unwrap().unwrap();
    let incidents = server.sessions.list_incidents(&attempt.id).await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].incident_type, "connectivity_timeout");

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_answer_finish_results_flow() {
    let server = spawn_server(None).await;
    let client = reqwest::Client::new();

    let attempt: Value = client
        .post(server.url("/attempts"))
        .json(&json!({"candidate_id": "c1", "exam_set": "A"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(attempt["id"].as_str().unwrap().starts_with("c1_"));

    let stored: Value = client
        .post(server.url("/answers"))
        .json(&json!({
            "candidate_id": "c1",
            "subject": "english",
            "section_id": "reading",
            "question_id": "r1",
            "selected_option": "B",
            "correct_answer": "A"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["success"], true);
    assert!(stored.get("correct_answer").is_none());

    let incident = client
        .post(server.url("/incidents"))
        .json(&json!({"candidate_id": "c1", "incident_type": "tab_hidden", "details": "blur"}))
        .send()
        .await
        .unwrap();
    assert_eq!(incident.status(), 200);

    let totals: Value = client
        .post(server.url("/finish/c1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        totals,
        json!({"total_score": 1.0, "total_max": 1.0, "percentage": 100.0})
    );

    let results: Value = reqwest::get(server.url("/results/c1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results["summary"]["candidate_id"], "c1");
    assert_eq!(results["grading"][0]["feedback"], "Correct");
}

#[tokio::test]
async fn test_missing_candidate_is_bad_request() {
    let server = spawn_server(None).await;

    let response = reqwest::Client::new()
        .post(server.url("/answers"))
        .json(&json!({
            "candidate_id": "",
            "subject": "english",
            "section_id": "reading",
            "question_id": "r1"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("candidate_id"));
}

#[tokio::test]
async fn test_unknown_results_are_not_found() {
    let server = spawn_server(None).await;

    let response = reqwest::get(server.url("/results/ghost")).await.unwrap();
    assert_eq!(response.status(), 404);

    let response = reqwest::Client::new()
        .post(server.url("/finish/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
