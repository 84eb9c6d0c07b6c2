//! Handle to a running channel connector: send replies and show typing.

use async_trait::async_trait;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
}

/// Keeps a typing indicator alive until dropped.
#[derive(Default)]
pub struct TypingGuard {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl TypingGuard {
    /// Guard over a refresh task; dropping it aborts the task.
    pub fn new(task: JoinHandle<()>) -> Self {
        Self::on_stop(move || task.abort())
    }

    /// Guard that runs `stop` once when dropped.
    pub fn on_stop(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    /// Guard that shows nothing.
    pub fn none() -> Self {
        Self::default()
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

/// Handle to a running channel (stop, send message, typing).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "discord").
    fn id(&self) -> &str;

    /// Stop the channel connector.
    fn stop(&self);

    /// User id of the bot on this channel, once known.
    fn self_user_id(&self) -> Option<String> {
        None
    }

    /// Send a text message to a conversation (e.g. Discord channel id).
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError>;

    /// Show a typing indicator in a conversation until the returned guard is dropped.
    fn start_typing(&self, _conversation_id: &str) -> TypingGuard {
        TypingGuard::none()
    }
}
