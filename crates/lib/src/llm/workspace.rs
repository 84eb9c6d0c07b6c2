//! AnythingLLM workspace API client.
//! Probes (service, API key, workspace) and workspace chat with per-channel sessions.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

const API_VERSION: &str = "/v1";

/// Client for the AnythingLLM developer API.
pub struct WorkspaceClient {
    host: String,
    api_key: String,
    workspace_slug: RwLock<String>,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("api is not available: {0}")]
    ServiceUnavailable(StatusCode),
    #[error("api key is not valid: {0}")]
    InvalidCredentials(StatusCode),
    #[error("workspace {slug} lookup failed: {status}")]
    WorkspaceLookup { slug: String, status: StatusCode },
    #[error("no workspaces exist on the server")]
    NoWorkspaces,
    #[error("failed to chat: {0}")]
    Chat(StatusCode),
    #[error("chat response has no text")]
    MissingText,
}

impl WorkspaceClient {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>, workspace_slug: impl Into<String>) -> Self {
        let host = host.into().trim_end_matches('/').to_string();
        Self {
            host,
            api_key: api_key.into(),
            workspace_slug: RwLock::new(workspace_slug.into()),
            client: reqwest::Client::new(),
        }
    }

    fn base_api_url(&self) -> String {
        format!("{}{}", self.host, API_VERSION)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Slug used for chat calls; may have been replaced by `probe_workspace`.
    pub fn active_workspace(&self) -> String {
        match self.workspace_slug.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_active_workspace(&self, slug: &str) {
        let mut g = match self.workspace_slug.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *g = slug.to_string();
    }

    /// GET {host} — unauthenticated availability check.
    pub async fn probe_service(&self) -> Result<(), WorkspaceError> {
        let res = self.client.get(&self.host).send().await?;
        if res.status() != StatusCode::OK {
            return Err(WorkspaceError::ServiceUnavailable(res.status()));
        }
        log::info!("workspace api is available");
        Ok(())
    }

    /// GET /v1/auth — API key check.
    pub async fn probe_credentials(&self) -> Result<(), WorkspaceError> {
        let url = format!("{}/auth", self.base_api_url());
        let res = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            return Err(WorkspaceError::InvalidCredentials(res.status()));
        }
        log::info!("workspace api key is valid");
        Ok(())
    }

    /// GET /v1/workspace/{name} — resolve the workspace to chat with.
    /// When `name` is not listed, the first listed workspace becomes the active one.
    pub async fn probe_workspace(&self, name: &str) -> Result<String, WorkspaceError> {
        let url = format!("{}/workspace/{}", self.base_api_url(), name);
        let res = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            return Err(WorkspaceError::WorkspaceLookup {
                slug: name.to_string(),
                status: res.status(),
            });
        }
        let data: WorkspaceListing = res.json().await?;
        let resolved = resolve_slug(name, &data.workspace).ok_or(WorkspaceError::NoWorkspaces)?;
        if resolved != name {
            log::warn!(
                "workspace {} does not exist, using workspace {}",
                name,
                resolved
            );
            self.set_active_workspace(&resolved);
        } else {
            log::info!("workspace {} is valid", name);
        }
        Ok(resolved)
    }

    /// Run all three probes concurrently. Succeeds only when every probe succeeds.
    pub async fn run_all_probes(&self) -> Result<(), WorkspaceError> {
        log::info!("testing workspace api");
        let slug = self.active_workspace();
        let (service, credentials, workspace) = tokio::join!(
            self.probe_service(),
            self.probe_credentials(),
            self.probe_workspace(&slug),
        );
        let mut first_err = None;
        for err in [service.err(), credentials.err(), workspace.err()]
            .into_iter()
            .flatten()
        {
            log::warn!("probe failed: {}", err);
            first_err.get_or_insert(err);
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                log::info!("workspace api tests completed");
                Ok(())
            }
        }
    }

    /// POST /v1/workspace/{slug}/chat — send one message in chat mode.
    pub async fn send_chat(&self, session_id: &str, message: &str) -> Result<ChatReply, WorkspaceError> {
        let url = format!(
            "{}/workspace/{}/chat",
            self.base_api_url(),
            self.active_workspace()
        );
        let body = ChatRequest {
            message,
            mode: "chat",
            session_id,
        };
        let res = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            return Err(WorkspaceError::Chat(res.status()));
        }
        Ok(res.json().await?)
    }

    /// GET /v1/workspace/{slug} — raw workspace details.
    pub async fn workspace_info(&self) -> Result<serde_json::Value, WorkspaceError> {
        let url = format!("{}/workspace/{}", self.base_api_url(), self.active_workspace());
        self.get_json(&url).await
    }

    /// GET /v1/workspace/{slug}/chats — chat history of the workspace.
    pub async fn workspace_chats(&self) -> Result<serde_json::Value, WorkspaceError> {
        let url = format!(
            "{}/workspace/{}/chats",
            self.base_api_url(),
            self.active_workspace()
        );
        self.get_json(&url).await
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, WorkspaceError> {
        let res = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            return Err(WorkspaceError::WorkspaceLookup {
                slug: self.active_workspace(),
                status: res.status(),
            });
        }
        Ok(res.json().await?)
    }
}

/// Pick `wanted` when listed, else the first listed slug.
fn resolve_slug(wanted: &str, listed: &[WorkspaceSummary]) -> Option<String> {
    if listed.iter().any(|ws| ws.slug == wanted) {
        return Some(wanted.to_string());
    }
    listed.first().map(|ws| ws.slug.clone())
}

#[derive(Debug, Deserialize)]
struct WorkspaceListing {
    #[serde(default)]
    workspace: Vec<WorkspaceSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkspaceSummary {
    slug: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    message: &'a str,
    mode: &'static str,
    session_id: &'a str,
}

/// Chat endpoint response. Only `textResponse` is relayed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub typ: Option<String>,
    #[serde(default)]
    pub text_response: Option<String>,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
    #[serde(default)]
    pub close: bool,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ChatReply {
    /// Reply text; `MissingText` when the server sent none or only whitespace.
    pub fn text(&self) -> Result<&str, WorkspaceError> {
        self.text_response
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(WorkspaceError::MissingText)
    }
}
