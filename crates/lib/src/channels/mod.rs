//! Communication channels (Discord).
//!
//! Channel handle trait so the relay can send replies without knowing the platform.
//! Inbound messages are sent to the bot loop over an mpsc channel.

mod discord;
mod handle;
mod inbound;

pub use discord::{split_message, DiscordChannel, MAX_MESSAGE_LEN};
pub use handle::{ChannelError, ChannelHandle, TypingGuard};
pub use inbound::{Attachment, ChannelKind, InboundMessage};
