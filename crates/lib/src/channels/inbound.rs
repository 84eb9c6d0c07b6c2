//! Inbound message from a channel: delivered to the bot loop for relay handling.

/// Kind of conversation a message arrived in. Only text channels and threads are relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Text,
    PublicThread,
    PrivateThread,
    /// Any other Discord channel type code (DMs, voice, forums, ...).
    Other(u64),
}

impl ChannelKind {
    /// Map a Discord channel `type` code.
    pub fn from_discord(code: u64) -> Self {
        match code {
            0 => ChannelKind::Text,
            11 => ChannelKind::PublicThread,
            12 => ChannelKind::PrivateThread,
            other => ChannelKind::Other(other),
        }
    }

    pub fn is_relayable(self) -> bool {
        matches!(
            self,
            ChannelKind::Text | ChannelKind::PublicThread | ChannelKind::PrivateThread
        )
    }
}

/// File attached to a message. Received but never forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub content_type: Option<String>,
}

/// A message from a channel to be filtered and optionally relayed to the workspace.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: String,
    pub author_id: String,
    /// Author is an automated account.
    pub author_is_bot: bool,
    /// User ids mentioned in the message.
    pub mentions: Vec<String>,
    pub channel_id: String,
    pub channel_kind: ChannelKind,
    pub guild_id: Option<String>,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discord_codes() {
        assert_eq!(ChannelKind::from_discord(0), ChannelKind::Text);
        assert_eq!(ChannelKind::from_discord(11), ChannelKind::PublicThread);
        assert_eq!(ChannelKind::from_discord(12), ChannelKind::PrivateThread);
        assert_eq!(ChannelKind::from_discord(1), ChannelKind::Other(1));
        assert!(!ChannelKind::Other(2).is_relayable());
        assert!(ChannelKind::PrivateThread.is_relayable());
    }
}
