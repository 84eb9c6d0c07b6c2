//! Relaybot core library: AnythingLLM workspace client, availability tracking, message relay,
//! and the Discord channel used by the CLI.

pub mod bot;
pub mod channels;
pub mod config;
pub mod extensions;
pub mod health;
pub mod llm;
pub mod relay;
