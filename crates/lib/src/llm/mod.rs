//! Remote LLM workspace client.
//!
//! `ChatBackend` is the seam the relay and health service talk to; `WorkspaceClient` implements
//! it against the AnythingLLM HTTP API.

mod workspace;

pub use workspace::{ChatReply, WorkspaceClient, WorkspaceError};

use async_trait::async_trait;

/// Probe and chat operations needed by the relay.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Run the full probe set; Ok only when every probe succeeds.
    async fn run_all_probes(&self) -> Result<(), WorkspaceError>;

    /// Send one user message in the given session.
    async fn send_chat(&self, session_id: &str, message: &str) -> Result<ChatReply, WorkspaceError>;
}

#[async_trait]
impl ChatBackend for WorkspaceClient {
    async fn run_all_probes(&self) -> Result<(), WorkspaceError> {
        WorkspaceClient::run_all_probes(self).await
    }

    async fn send_chat(&self, session_id: &str, message: &str) -> Result<ChatReply, WorkspaceError> {
        WorkspaceClient::send_chat(self, session_id, message).await
    }
}
