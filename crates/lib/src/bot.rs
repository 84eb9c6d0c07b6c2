//! Bot runtime: wire the workspace client, health service, relay and Discord channel together,
//! then dispatch inbound messages until shutdown.

use crate::channels::{ChannelHandle, DiscordChannel, InboundMessage};
use crate::config::Config;
use crate::extensions::{parse_command, ExtensionRegistry};
use crate::health::{Availability, HealthService};
use crate::llm::{ChatBackend, WorkspaceClient};
use crate::relay::{MessageRelay, RELAY_EXTENSION};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

const INBOUND_CAPACITY: usize = 64;

/// Everything a message handler task needs.
pub struct BotContext {
    relay: Arc<MessageRelay<dyn ChatBackend>>,
    extensions: ExtensionRegistry,
    channel: Arc<dyn ChannelHandle>,
    prefix: String,
}

impl BotContext {
    pub fn new(
        relay: Arc<MessageRelay<dyn ChatBackend>>,
        channel: Arc<dyn ChannelHandle>,
        prefix: impl Into<String>,
    ) -> Self {
        let mut extensions = ExtensionRegistry::new();
        extensions.register(relay.clone());
        Self {
            relay,
            extensions,
            channel,
            prefix: prefix.into(),
        }
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Load the extensions named in config. Failures are logged, not fatal.
    pub async fn load_extensions(&self, names: &[String]) {
        for name in names {
            if let Err(e) = self.extensions.load(name).await {
                log::warn!("failed to load extension {}: {}", name, e);
            }
        }
    }

    /// Handle one inbound message: management commands first, then the relay if it is loaded.
    /// Commands are only taken in text channels and threads.
    pub async fn dispatch(&self, msg: InboundMessage) {
        let bot_id = self.channel.self_user_id();
        let from_self = bot_id.as_deref() == Some(msg.author_id.as_str());
        if !from_self && !msg.author_is_bot && msg.channel_kind.is_relayable() {
            if let Some(command) = parse_command(&msg.content, &self.prefix) {
                let reply = self.extensions.run_command(&command).await;
                if let Err(e) = self.channel.send_message(&msg.channel_id, &reply).await {
                    log::warn!(
                        "{}: command reply to {} failed: {}",
                        self.channel.id(),
                        msg.channel_id,
                        e
                    );
                }
                return;
            }
        }
        if self.extensions.is_loaded(RELAY_EXTENSION).await {
            let outcome = self.relay.handle(&msg).await;
            log::debug!("message {} in {}: {:?}", msg.message_id, msg.channel_id, outcome);
        }
    }
}

fn workspace_client(config: &Config) -> Result<WorkspaceClient> {
    let host = config
        .anythingllm
        .host
        .clone()
        .context("ANYTHINGLLM_HOST is not set")?;
    let api_key = config
        .anythingllm
        .api_key
        .clone()
        .context("ANYTHINGLLM_API_KEY is not set")?;
    Ok(WorkspaceClient::new(
        host,
        api_key,
        config.anythingllm.workspace_slug.clone(),
    ))
}

/// Run the probe set once and report the resulting availability and workspace.
pub async fn probe_once(config: &Config) -> Result<(Availability, String)> {
    let client = Arc::new(workspace_client(config)?);
    let health = HealthService::new(client.clone());
    let state = health.refresh().await;
    Ok((state, client.active_workspace()))
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Run the bot until Ctrl-C or SIGTERM.
pub async fn run_bot(config: Config) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let token = config
        .discord
        .token
        .clone()
        .context("DISCORD_TOKEN is not set")?;

    let backend: Arc<dyn ChatBackend> = Arc::new(workspace_client(&config)?);
    let health = Arc::new(HealthService::new(backend.clone()));
    let discord = Arc::new(DiscordChannel::new(token));
    let channel: Arc<dyn ChannelHandle> = discord.clone();
    let relay = Arc::new(MessageRelay::new(
        backend,
        health,
        channel.clone(),
        config.discord.prefix.clone(),
    ));
    let ctx = Arc::new(BotContext::new(relay, channel, config.discord.prefix.clone()));

    if let Some(guild) = config.test_guild() {
        log::info!("test guild configured: {}", guild);
    }
    ctx.load_extensions(&config.extensions).await;

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_CAPACITY);
    let gateway = discord.clone().start_inbound(inbound_tx);
    log::info!("{} channel started", discord.id());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            msg = inbound_rx.recv() => {
                let Some(msg) = msg else {
                    log::warn!("inbound channel closed");
                    break;
                };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    ctx.dispatch(msg).await;
                });
            }
            _ = &mut shutdown => {
                log::info!("shutdown signal received");
                break;
            }
        }
    }

    discord.stop();
    gateway.abort();
    log::info!("bot stopped");
    Ok(())
}
