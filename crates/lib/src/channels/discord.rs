//! Discord channel: gateway WebSocket for MESSAGE_CREATE, REST API for replies and typing.

use crate::channels::handle::{ChannelError, ChannelHandle, TypingGuard};
use crate::channels::inbound::{Attachment, ChannelKind, InboundMessage};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

/// GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT
const INTENTS: u64 = 1 | (1 << 9) | (1 << 15);
const INVITE_PERMISSIONS: u64 = 412317273088;

/// Discord rejects message content longer than this.
pub const MAX_MESSAGE_LEN: usize = 2000;
const TYPING_REFRESH: Duration = Duration::from_secs(8);
const REST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_BACKOFF_SECS: u64 = 60;

/// Discord channel connector.
pub struct DiscordChannel {
    id: String,
    token: String,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
    bot_user_id: RwLock<Option<String>>,
    kinds: Mutex<HashMap<String, ChannelKind>>,
}

impl DiscordChannel {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(token, DISCORD_API_BASE)
    }

    /// Use a different REST base URL (tests, proxies).
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("discord: building http client failed, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self {
            id: "discord".to_string(),
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            running: AtomicBool::new(false),
            client,
            bot_user_id: RwLock::new(None),
            kinds: Mutex::new(HashMap::new()),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Start the gateway loop and forward messages to the bot. Returns a handle to await on shutdown.
    pub fn start_inbound(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("discord channel: starting gateway loop");
        tokio::spawn(async move {
            run_gateway_loop(self, inbound_tx).await;
        })
    }

    fn cached_kind(&self, channel_id: &str) -> Option<ChannelKind> {
        self.kinds.lock().ok()?.get(channel_id).copied()
    }

    /// Cache the kind of a channel or thread object (`id` + `type`).
    fn remember_kind(&self, channel: &Value) {
        let (Some(id), Some(code)) = (channel["id"].as_str(), channel["type"].as_u64()) else {
            return;
        };
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.insert(id.to_string(), ChannelKind::from_discord(code));
        }
    }

    /// Cache every channel and active thread listed in a GUILD_CREATE payload.
    fn remember_guild(&self, guild: &Value) {
        for key in ["channels", "threads"] {
            if let Some(list) = guild[key].as_array() {
                list.iter().for_each(|c| self.remember_kind(c));
            }
        }
    }

    /// Kind of a channel: from the cache, else GET /channels/{id} (then cached).
    pub async fn channel_kind(&self, channel_id: &str) -> Result<ChannelKind, ChannelError> {
        if let Some(kind) = self.cached_kind(channel_id) {
            return Ok(kind);
        }
        let url = format!("{}/channels/{}", self.api_base, channel_id);
        let res = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("get channel failed: {} {}", status, body)));
        }
        let data: Value = res.json().await?;
        let kind = ChannelKind::from_discord(data["type"].as_u64().unwrap_or(u64::MAX));
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.insert(channel_id.to_string(), kind);
        }
        Ok(kind)
    }

    /// POST /channels/{id}/messages. Long text is sent as several messages.
    pub async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), ChannelError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let res = self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, self.auth())
                .json(&json!({ "content": chunk }))
                .send()
                .await?;
            if !res.status().is_success() {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                return Err(ChannelError::Api(format!("send message failed: {} {}", status, body)));
            }
        }
        Ok(())
    }

    fn record_ready(&self, data: &Value) {
        let Some(user_id) = data["user"]["id"].as_str() else {
            return;
        };
        if let Ok(mut g) = self.bot_user_id.write() {
            *g = Some(user_id.to_string());
        }
        let name = data["user"]["username"].as_str().unwrap_or("unknown");
        log::info!("logged in as {} ({})", name, user_id);
        log::info!("bot invite url: {}", invite_url(user_id));
    }

    async fn to_inbound(&self, data: &Value) -> Option<InboundMessage> {
        let channel_id = data["channel_id"].as_str()?;
        let kind = match self.channel_kind(channel_id).await {
            Ok(kind) => kind,
            Err(e) => {
                log::warn!(
                    "discord: dropping message {}, channel {} lookup failed: {}",
                    data["id"].as_str().unwrap_or("?"),
                    channel_id,
                    e
                );
                return None;
            }
        };
        parse_message_create(data, kind)
    }
}

/// Handle one DISPATCH event. Never waits on REST: a message from a channel whose kind is not
/// cached is resolved in its own task. Returns false once the inbound receiver is gone.
async fn handle_dispatch(
    channel: &Arc<DiscordChannel>,
    event: &str,
    data: &Value,
    inbound_tx: &mpsc::Sender<InboundMessage>,
) -> bool {
    match event {
        "READY" => channel.record_ready(data),
        "GUILD_CREATE" => channel.remember_guild(data),
        "CHANNEL_CREATE" | "CHANNEL_UPDATE" | "THREAD_CREATE" | "THREAD_UPDATE" => {
            channel.remember_kind(data)
        }
        "MESSAGE_CREATE" => {
            let Some(channel_id) = data["channel_id"].as_str() else {
                return true;
            };
            match channel.cached_kind(channel_id) {
                Some(kind) => {
                    if let Some(msg) = parse_message_create(data, kind) {
                        return inbound_tx.send(msg).await.is_ok();
                    }
                }
                None => {
                    let channel = channel.clone();
                    let data = data.clone();
                    let inbound_tx = inbound_tx.clone();
                    tokio::spawn(async move {
                        if let Some(msg) = channel.to_inbound(&data).await {
                            let _ = inbound_tx.send(msg).await;
                        }
                    });
                }
            }
        }
        other => log::trace!("discord: ignoring dispatch {}", other),
    }
    true
}

/// OAuth2 URL for inviting the bot with the permissions it needs.
pub fn invite_url(client_id: &str) -> String {
    format!(
        "https://discord.com/oauth2/authorize?client_id={}&permissions={}&scope=bot",
        client_id, INVITE_PERMISSIONS
    )
}

/// Build an inbound message from a MESSAGE_CREATE payload.
fn parse_message_create(data: &Value, channel_kind: ChannelKind) -> Option<InboundMessage> {
    let author = &data["author"];
    let mentions = data["mentions"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|m| m["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let attachments = data["attachments"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|a| Attachment {
                    filename: a["filename"].as_str().unwrap_or("file").to_string(),
                    url: a["url"].as_str().unwrap_or("").to_string(),
                    content_type: a["content_type"].as_str().map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();
    Some(InboundMessage {
        message_id: data["id"].as_str().unwrap_or("").to_string(),
        author_id: author["id"].as_str()?.to_string(),
        author_is_bot: author["bot"].as_bool().unwrap_or(false),
        mentions,
        channel_id: data["channel_id"].as_str()?.to_string(),
        channel_kind,
        guild_id: data["guild_id"].as_str().map(str::to_string),
        content: data["content"].as_str().unwrap_or("").to_string(),
        attachments,
    })
}

/// Split text into chunks of at most `max` characters, preferring newline boundaries.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(max)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if end == rest.len() {
            chunks.push(rest.to_string());
            break;
        }
        let cut = match rest[..end].rfind('\n') {
            Some(i) if i > 0 => i + 1,
            _ => end,
        };
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    chunks
}

async fn run_gateway_loop(channel: Arc<DiscordChannel>, inbound_tx: mpsc::Sender<InboundMessage>) {
    let mut backoff = 1u64;
    while channel.running() {
        match run_gateway_session(&channel, &inbound_tx).await {
            Ok(SessionEnd::InboundClosed) => {
                log::debug!("discord: inbound channel closed, stopping loop");
                return;
            }
            Ok(SessionEnd::Reconnect) => backoff = 1,
            Err(e) => {
                log::warn!("discord gateway error: {}", e);
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
            }
        }
        if !channel.running() {
            break;
        }
        log::info!("discord: reconnecting in {}s", backoff);
        tokio::time::sleep(Duration::from_secs(backoff)).await;
    }
    log::info!("discord channel: gateway loop stopped");
}

enum SessionEnd {
    Reconnect,
    InboundClosed,
}

/// One gateway connection: HELLO, IDENTIFY, then heartbeat and dispatch until it drops.
async fn run_gateway_session(
    channel: &Arc<DiscordChannel>,
    inbound_tx: &mpsc::Sender<InboundMessage>,
) -> Result<SessionEnd, String> {
    let (ws, _) = tokio_tungstenite::connect_async(DISCORD_GATEWAY_URL)
        .await
        .map_err(|e| e.to_string())?;
    let (mut write, mut read) = ws.split();

    let hello = read
        .next()
        .await
        .ok_or("gateway closed before HELLO")?
        .map_err(|e| e.to_string())?;
    let hello: Value = serde_json::from_str(hello.to_text().map_err(|e| e.to_string())?)
        .map_err(|e| e.to_string())?;
    if hello["op"].as_u64() != Some(OP_HELLO) {
        return Err(format!("expected HELLO, got op {}", hello["op"]));
    }
    let interval = hello["d"]["heartbeat_interval"].as_u64().unwrap_or(41250);

    let identify = json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": channel.token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "relaybot",
                "device": "relaybot"
            }
        }
    });
    write
        .send(Message::Text(identify.to_string()))
        .await
        .map_err(|e| e.to_string())?;
    log::debug!("discord: identified, heartbeat every {}ms", interval);

    let mut sequence: Option<u64> = None;
    let mut heartbeat = tokio::time::interval(Duration::from_millis(interval));
    heartbeat.tick().await;

    while channel.running() {
        tokio::select! {
            _ = heartbeat.tick() => {
                let hb = json!({ "op": OP_HEARTBEAT, "d": sequence });
                write.send(Message::Text(hb.to_string())).await.map_err(|e| e.to_string())?;
            }
            frame = read.next() => {
                let frame = match frame {
                    Some(Ok(f)) => f,
                    Some(Err(e)) => return Err(e.to_string()),
                    None => return Ok(SessionEnd::Reconnect),
                };
                if frame.is_close() {
                    log::info!("discord: gateway closed connection");
                    return Ok(SessionEnd::Reconnect);
                }
                let Ok(text) = frame.to_text() else { continue };
                let Ok(payload) = serde_json::from_str::<Value>(text) else { continue };
                if let Some(s) = payload["s"].as_u64() {
                    sequence = Some(s);
                }
                match payload["op"].as_u64() {
                    Some(OP_DISPATCH) => {
                        let event = payload["t"].as_str().unwrap_or("");
                        if !handle_dispatch(channel, event, &payload["d"], inbound_tx).await {
                            return Ok(SessionEnd::InboundClosed);
                        }
                    }
                    Some(OP_HEARTBEAT) => {
                        let hb = json!({ "op": OP_HEARTBEAT, "d": sequence });
                        write.send(Message::Text(hb.to_string())).await.map_err(|e| e.to_string())?;
                    }
                    Some(OP_HEARTBEAT_ACK) => {}
                    Some(OP_RECONNECT) | Some(OP_INVALID_SESSION) => {
                        log::info!("discord: gateway asked to reconnect");
                        return Ok(SessionEnd::Reconnect);
                    }
                    op => log::debug!("discord: unhandled opcode {:?}", op),
                }
            }
        }
    }
    let _ = write.close().await;
    Ok(SessionEnd::Reconnect)
}

#[async_trait]
impl ChannelHandle for DiscordChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn self_user_id(&self) -> Option<String> {
        self.bot_user_id.read().ok().and_then(|g| g.clone())
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError> {
        DiscordChannel::send_message(self, conversation_id, text).await
    }

    fn start_typing(&self, conversation_id: &str) -> TypingGuard {
        let client = self.client.clone();
        let url = format!("{}/channels/{}/typing", self.api_base, conversation_id);
        let auth = self.auth();
        TypingGuard::new(tokio::spawn(async move {
            loop {
                if let Err(e) = client
                    .post(&url)
                    .header(reqwest::header::AUTHORIZATION, &auth)
                    .send()
                    .await
                {
                    log::debug!("discord typing failed: {}", e);
                }
                tokio::time::sleep(TYPING_REFRESH).await;
            }
        }))
    }
}
