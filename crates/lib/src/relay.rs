//! Message relay: filter inbound channel messages, forward them to the workspace, reply.
//!
//! One workspace session per channel. While the api is offline the relay answers with a fixed
//! message and re-probes instead of forwarding; a failed chat does the same after replying with
//! its own fixed message.

use crate::channels::{ChannelHandle, InboundMessage};
use crate::extensions::Extension;
use crate::health::{Availability, HealthService};
use crate::llm::ChatBackend;
use async_trait::async_trait;
use std::sync::Arc;

/// Extension name the relay registers under.
pub const RELAY_EXTENSION: &str = "ai";

pub const OFFLINE_REPLY: &str = "AI is offline. Please try again later.";
pub const CHAT_FAILED_REPLY: &str = "Failed to chat. Please try again later.";

/// What the relay did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Ignored,
    /// Api was offline; fallback sent and probes re-run.
    Offline,
    /// Workspace reply delivered.
    Replied,
    /// Chat failed; fallback sent and probes re-run.
    Failed,
}

/// Workspace session for a channel: the channel id itself.
pub fn session_id_for(channel_id: &str) -> String {
    channel_id.to_string()
}

/// True when a message must not be relayed: own messages, messages mentioning the bot, non-text
/// channels, other bots, and prefix commands.
pub fn is_ignored(msg: &InboundMessage, bot_user_id: Option<&str>, prefix: &str) -> bool {
    let from_self = bot_user_id.is_some_and(|id| msg.author_id == id);
    let mentions_self = bot_user_id.is_some_and(|id| msg.mentions.iter().any(|m| m == id));
    from_self
        || mentions_self
        || !msg.channel_kind.is_relayable()
        || msg.author_is_bot
        || msg.content.starts_with(prefix)
}

pub struct MessageRelay<B: ChatBackend + ?Sized> {
    backend: Arc<B>,
    health: Arc<HealthService<B>>,
    channel: Arc<dyn ChannelHandle>,
    prefix: String,
}

impl<B: ChatBackend + ?Sized> MessageRelay<B> {
    pub fn new(
        backend: Arc<B>,
        health: Arc<HealthService<B>>,
        channel: Arc<dyn ChannelHandle>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            health,
            channel,
            prefix: prefix.into(),
        }
    }

    pub fn health(&self) -> &Arc<HealthService<B>> {
        &self.health
    }

    /// Process one inbound message.
    pub async fn handle(&self, msg: &InboundMessage) -> RelayOutcome {
        let bot_id = self.channel.self_user_id();
        if is_ignored(msg, bot_id.as_deref(), &self.prefix) {
            return RelayOutcome::Ignored;
        }

        if self.health.state() == Availability::Offline {
            self.reply(&msg.channel_id, OFFLINE_REPLY).await;
            self.health.refresh().await;
            return RelayOutcome::Offline;
        }

        if !msg.attachments.is_empty() {
            log::debug!(
                "relay: ignoring {} attachment(s) on message {}",
                msg.attachments.len(),
                msg.message_id
            );
        }

        let session_id = session_id_for(&msg.channel_id);
        let typing = self.channel.start_typing(&msg.channel_id);
        let result = match self.backend.send_chat(&session_id, &msg.content).await {
            Ok(reply) => reply.text().map(str::to_string),
            Err(e) => Err(e),
        };

        match result {
            Ok(text) => {
                self.reply(&msg.channel_id, &text).await;
                drop(typing);
                RelayOutcome::Replied
            }
            Err(e) => {
                log::warn!("relay: failed to chat in session {}: {}", session_id, e);
                self.reply(&msg.channel_id, CHAT_FAILED_REPLY).await;
                drop(typing);
                self.health.refresh().await;
                RelayOutcome::Failed
            }
        }
    }

    async fn reply(&self, channel_id: &str, text: &str) {
        if let Err(e) = self.channel.send_message(channel_id, text).await {
            log::warn!("relay: {} send to {} failed: {}", self.channel.id(), channel_id, e);
        }
    }
}

#[async_trait]
impl<B: ChatBackend + ?Sized> Extension for MessageRelay<B> {
    fn name(&self) -> &str {
        RELAY_EXTENSION
    }

    /// Loading the relay probes the workspace api so the first message sees a fresh state.
    async fn on_load(&self) {
        let state = self.health.refresh().await;
        log::info!("relay loaded, workspace api {}", state);
    }
}
