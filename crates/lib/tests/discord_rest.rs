//! Integration test: run the Discord REST side of the channel (message send, channel lookup,
//! typing) against an in-process stub of the API bound to a free port.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use lib::channels::{ChannelError, ChannelHandle, ChannelKind, DiscordChannel, MAX_MESSAGE_LEN};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOKEN: &str = "tok";
const FORBIDDEN_CHANNEL: &str = "locked";

#[derive(Default)]
struct Stub {
    posts: Mutex<Vec<(String, String)>>,
    lookups: AtomicUsize,
    typing: AtomicUsize,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bot {}", TOKEN))
        .unwrap_or(false)
}

async fn create_message(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Path(channel_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) || channel_id == FORBIDDEN_CHANNEL {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Missing Access", "code": 50001 })),
        );
    }
    let content = body["content"].as_str().unwrap_or("").to_string();
    stub.posts.lock().unwrap().push((channel_id, content));
    (StatusCode::OK, Json(json!({ "id": "m" })))
}

async fn get_channel(
    State(stub): State<Arc<Stub>>,
    Path(channel_id): Path<String>,
) -> Json<Value> {
    stub.lookups.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "id": channel_id, "type": 11 }))
}

async fn trigger_typing(State(stub): State<Arc<Stub>>) -> StatusCode {
    stub.typing.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn serve(stub: Arc<Stub>) -> String {
    let app = Router::new()
        .route("/channels/:id", get(get_channel))
        .route("/channels/:id/messages", post(create_message))
        .route("/channels/:id/typing", post(trigger_typing))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn long_reply_is_sent_in_chunks() {
    let stub = Arc::new(Stub::default());
    let discord = DiscordChannel::with_api_base(TOKEN, serve(stub.clone()).await);
    let text = "a".repeat(4500);
    discord.send_message("c1", &text).await.expect("sent");

    let posts = stub.posts.lock().unwrap().clone();
    assert_eq!(posts.len(), 3);
    assert!(posts.iter().all(|(id, chunk)| id == "c1" && chunk.chars().count() <= MAX_MESSAGE_LEN));
    let joined: String = posts.into_iter().map(|(_, chunk)| chunk).collect();
    assert_eq!(joined, text);
}

#[tokio::test]
async fn rejected_send_is_api_error() {
    let stub = Arc::new(Stub::default());
    let discord = DiscordChannel::with_api_base(TOKEN, serve(stub.clone()).await);
    let err = discord
        .send_message(FORBIDDEN_CHANNEL, "hi")
        .await
        .expect_err("403 must fail");
    assert!(matches!(err, ChannelError::Api(ref body) if body.contains("403")), "{}", err);
    assert!(stub.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn channel_kind_is_looked_up_once() {
    let stub = Arc::new(Stub::default());
    let discord = DiscordChannel::with_api_base(TOKEN, serve(stub.clone()).await);
    assert_eq!(discord.channel_kind("t1").await.unwrap(), ChannelKind::PublicThread);
    assert_eq!(discord.channel_kind("t1").await.unwrap(), ChannelKind::PublicThread);
    assert_eq!(stub.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn typing_posts_until_guard_dropped() {
    let stub = Arc::new(Stub::default());
    let discord = DiscordChannel::with_api_base(TOKEN, serve(stub.clone()).await);
    let guard = discord.start_typing("c1");
    let mut waited = Duration::ZERO;
    while stub.typing.load(Ordering::SeqCst) == 0 && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    assert_eq!(stub.typing.load(Ordering::SeqCst), 1);
    drop(guard);
}
