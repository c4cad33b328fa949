//! HTTP and WebSocket delivery of chat turns

pub mod caller;
pub mod errors;
pub mod files;
pub mod health;
pub mod messages;
pub mod sessions;
pub mod ws;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Room for the text fields and multipart framing around an upload
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Body limit for the multipart route, saturating on huge configured sizes
fn upload_body_limit(max_file_size: u64) -> usize {
    usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD)
}

pub fn router(state: AppState) -> Router {
    let upload_limit = upload_body_limit(state.config.uploads.max_file_size);

    Router::new()
        .route(
            "/api/chat/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/api/chat/sessions/{id}",
            get(sessions::get_session)
                .patch(sessions::rename_session)
                .delete(sessions::delete_session),
        )
        .route("/api/chat/sessions/{id}/messages", get(sessions::session_messages))
        .route("/api/chat/sessions/{id}/processing", get(sessions::session_processing))
        .route("/api/chat/message", post(messages::send_message_sse))
        .route("/api/chat/message/stream", post(messages::send_message_ndjson))
        .route(
            "/api/chat/message/multimodal",
            post(messages::send_multimodal_sse).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/chat/messages/{id}/cancel", post(messages::cancel_message))
        .route("/api/chat/health", get(health::health))
        .route("/api/models", get(health::list_models))
        .route("/api/files/{id}", get(files::get_file).delete(files::delete_file))
        .route("/api/files/{id}/info", get(files::file_info))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C
pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    log::info!("chat-relay listening on http://{}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    log::info!("chat-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ChatMessageStatus, ChatRole};
    use crate::state::test_support::{test_state, StaticBackend};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    struct TestServer {
        _dir: TempDir,
        state: AppState,
        base: String,
        client: reqwest::Client,
    }

    impl TestServer {
        async fn start(backend: StaticBackend) -> Self {
            let (dir, state) = test_state(backend);
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let app = router(state.clone());
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            Self {
                _dir: dir,
                state,
                base: format!("http://{}", addr),
                client: reqwest::Client::new(),
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn create_session(&self, user: &str) -> String {
            let response = self
                .client
                .post(self.url("/api/chat/sessions"))
                .header("X-User-Id", user)
                .json(&json!({ "title": "Test chat" }))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 201);
            let body: Value = response.json().await.unwrap();
            body["id"].as_str().unwrap().to_string()
        }
    }

    #[test]
    fn test_upload_body_limit() {
        assert_eq!(upload_body_limit(1024), 1024 + MULTIPART_OVERHEAD);
        assert_eq!(upload_body_limit(u64::MAX), usize::MAX);
        assert_eq!(upload_body_limit(usize::MAX as u64 - 1), usize::MAX);
    }

    /// `(event name, data json)` pairs of a complete SSE body
    fn parse_sse(body: &str) -> Vec<(String, Value)> {
        body.split("\n\n")
            .filter_map(|block| {
                let mut name = None;
                let mut data = None;
                for line in block.lines() {
                    if let Some(rest) = line.strip_prefix("event:") {
                        name = Some(rest.trim().to_string());
                    } else if let Some(rest) = line.strip_prefix("data:") {
                        data = Some(serde_json::from_str(rest.trim()).unwrap());
                    }
                }
                Some((name?, data?))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_sse_turn_end_to_end() {
        let server = TestServer::start(StaticBackend::replying(vec!["Hel", "lo"])).await;
        let session_id = server.create_session("alice").await;

        let response = server
            .client
            .post(server.url("/api/chat/message"))
            .header("X-User-Id", "alice")
            .json(&json!({ "sessionId": session_id, "content": "Hi" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let events = parse_sse(&response.text().await.unwrap());
        let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["stream_start", "stream_chunk", "stream_chunk", "stream_end"]);
        assert_eq!(events[1].1["content"], "Hel");
        assert_eq!(events[3].1["metadata"]["tokenCount"], 2);

        let messages: Value = server
            .client
            .get(server.url(&format!("/api/chat/sessions/{}/messages", session_id)))
            .header("X-User-Id", "alice")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(messages.as_array().unwrap().len(), 2);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"], "Hello");
        assert_eq!(messages[1]["status"], "complete");
    }

    #[tokio::test]
    async fn test_ndjson_turn() {
        let server = TestServer::start(StaticBackend::replying(vec!["a", "b", "c"])).await;
        let session_id = server.create_session("alice").await;

        let response = server
            .client
            .post(server.url("/api/chat/message/stream"))
            .header("X-User-Id", "alice")
            .json(&json!({ "sessionId": session_id, "content": "Hi" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.headers()["content-type"], "application/x-ndjson");

        let body = response.text().await.unwrap();
        let kinds: Vec<String> = body
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap()["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            kinds,
            vec!["stream_start", "stream_chunk", "stream_chunk", "stream_chunk", "stream_end"]
        );
    }

    #[tokio::test]
    async fn test_foreign_session_yields_single_error_event() {
        let server = TestServer::start(StaticBackend::replying(vec!["secret"])).await;
        let session_id = server.create_session("alice").await;

        let body = server
            .client
            .post(server.url("/api/chat/message"))
            .header("X-User-Id", "mallory")
            .json(&json!({ "sessionId": session_id, "content": "Hi" }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        let events = parse_sse(&body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "error");
        assert_eq!(events[0].1["content"], "Session not found or access denied");
        assert!(events[0].1["messageId"].is_null());

        let stored = server.state.db.get_chat_messages_by_session(&session_id).unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_message_is_rejected_before_streaming() {
        let server = TestServer::start(StaticBackend::replying(vec![])).await;
        let session_id = server.create_session("alice").await;

        let response = server
            .client
            .post(server.url("/api/chat/message"))
            .json(&json!({ "sessionId": session_id, "content": "   " }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["errors"]["content"], "Message content cannot be empty");

        let malformed = server
            .client
            .post(server.url("/api/chat/message"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(malformed.status(), 400);
    }

    #[tokio::test]
    async fn test_session_routes() {
        let server = TestServer::start(StaticBackend::replying(vec![])).await;

        // No body and no header: default title, default user
        let created: Value = server
            .client
            .post(server.url("/api/chat/sessions"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();
        assert_eq!(created["userId"], "default-user");
        assert!(created["title"].as_str().unwrap().starts_with("New Chat - "));

        let renamed: Value = server
            .client
            .patch(server.url(&format!("/api/chat/sessions/{}", id)))
            .json(&json!({ "title": "Renamed" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(renamed["title"], "Renamed");

        let list: Value = server
            .client
            .get(server.url("/api/chat/sessions"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list[0]["messageCount"], 0);

        let processing: Value = server
            .client
            .get(server.url(&format!("/api/chat/sessions/{}/processing", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(processing["processing"], false);

        let foreign = server
            .client
            .get(server.url(&format!("/api/chat/sessions/{}", id)))
            .header("X-User-Id", "bob")
            .send()
            .await
            .unwrap();
        assert_eq!(foreign.status(), 404);

        let deleted = server
            .client
            .delete(server.url(&format!("/api/chat/sessions/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), 204);

        let gone = server
            .client
            .get(server.url(&format!("/api/chat/sessions/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(gone.status(), 404);
    }

    #[tokio::test]
    async fn test_multimodal_turn_and_file_routes() {
        let server = TestServer::start(StaticBackend::replying(vec!["A cat"])).await;
        let session_id = server.create_session("alice").await;

        let image = reqwest::multipart::Part::bytes(b"\x89PNGdata".to_vec())
            .file_name("cat.png")
            .mime_str("image/png")
            .unwrap();
        let form = reqwest::multipart::Form::new()
            .text("sessionId", session_id.clone())
            .text("content", "What is this?")
            .part("file", image);

        let body = server
            .client
            .post(server.url("/api/chat/message/multimodal"))
            .header("X-User-Id", "alice")
            .multipart(form)
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        let names: Vec<String> = parse_sse(&body).into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["stream_start", "stream_chunk", "stream_end"]);

        let messages: Value = server
            .client
            .get(server.url(&format!("/api/chat/sessions/{}/messages", session_id)))
            .header("X-User-Id", "alice")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let attachment = &messages[0]["attachments"][0];
        assert_eq!(attachment["fileName"], "cat.png");
        let file_id = attachment["id"].as_str().unwrap();

        let download = server
            .client
            .get(server.url(&format!("/api/files/{}", file_id)))
            .header("X-User-Id", "alice")
            .send()
            .await
            .unwrap();
        assert_eq!(download.status(), 200);
        assert_eq!(download.headers()["content-type"], "image/png");
        assert_eq!(download.bytes().await.unwrap().as_ref(), b"\x89PNGdata");

        let foreign = server
            .client
            .get(server.url(&format!("/api/files/{}/info", file_id)))
            .header("X-User-Id", "bob")
            .send()
            .await
            .unwrap();
        assert_eq!(foreign.status(), 404);

        let deleted = server
            .client
            .delete(server.url(&format!("/api/files/{}", file_id)))
            .header("X-User-Id", "alice")
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), 204);
    }

    #[tokio::test]
    async fn test_multimodal_rejects_disallowed_type() {
        let server = TestServer::start(StaticBackend::replying(vec!["never"])).await;
        let session_id = server.create_session("alice").await;

        let doc = reqwest::multipart::Part::bytes(b"%PDF".to_vec())
            .file_name("doc.pdf")
            .mime_str("application/pdf")
            .unwrap();
        let form = reqwest::multipart::Form::new()
            .text("sessionId", session_id.clone())
            .text("content", "Read this")
            .part("file", doc);

        let body = server
            .client
            .post(server.url("/api/chat/message/multimodal"))
            .header("X-User-Id", "alice")
            .multipart(form)
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        let events = parse_sse(&body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "error");

        let stored = server.state.db.get_chat_messages_by_session(&session_id).unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_route_stops_turn() {
        let server = TestServer::start(StaticBackend::hanging(vec!["thinking"])).await;
        let session_id = server.create_session("alice").await;

        let mut response = server
            .client
            .post(server.url("/api/chat/message/stream"))
            .header("X-User-Id", "alice")
            .json(&json!({ "sessionId": session_id, "content": "Hi" }))
            .send()
            .await
            .unwrap();

        let first = response.chunk().await.unwrap().unwrap();
        let start: Value = serde_json::from_slice(first.split(|b| *b == b'\n').next().unwrap()).unwrap();
        assert_eq!(start["type"], "stream_start");
        let message_id = start["messageId"].as_str().unwrap().to_string();

        let cancel: Value = server
            .client
            .post(server.url(&format!("/api/chat/messages/{}/cancel", message_id)))
            .header("X-User-Id", "alice")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(cancel["cancelled"], true);

        let mut rest = String::new();
        while let Some(chunk) = response.chunk().await.unwrap() {
            rest.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        let last: Value = serde_json::from_str(rest.lines().last().unwrap()).unwrap();
        assert_eq!(last["type"], "error");
        assert_eq!(last["content"], "Generation cancelled");

        let stored = server.state.db.get_chat_messages_by_session(&session_id).unwrap();
        let assistant = stored.iter().find(|m| m.role == ChatRole::Assistant).unwrap();
        assert_eq!(assistant.status, ChatMessageStatus::Cancelled);
        assert!(assistant.content.is_empty());
    }

    #[tokio::test]
    async fn test_health_and_models() {
        let server = TestServer::start(StaticBackend::replying(vec![])).await;

        let health: Value = server
            .client
            .get(server.url("/api/chat/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "UP");
        assert_eq!(health["backend"]["available"], true);

        let models: Value = server
            .client
            .get(server.url("/api/models"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(models["current"], "llava");
        assert_eq!(models["models"][0], "llava");
    }
}
