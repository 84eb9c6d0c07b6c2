//! Loadable bot extensions and the prefix commands that manage them
//! (`load`, `unload`, `reload`, `cogs`).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A named unit of bot behaviour that can be switched on and off at runtime.
#[async_trait]
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    /// Called each time the extension is loaded.
    async fn on_load(&self) {}

    /// Called each time the extension is unloaded.
    async fn on_unload(&self) {}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("unknown extension {0}")]
    Unknown(String),
    #[error("extension {0} is already loaded")]
    AlreadyLoaded(String),
    #[error("extension {0} is not loaded")]
    NotLoaded(String),
}

/// Known extensions and the ordered list of those currently loaded.
#[derive(Default)]
pub struct ExtensionRegistry {
    available: HashMap<String, Arc<dyn Extension>>,
    loaded: RwLock<Vec<String>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Arc<dyn Extension>) {
        self.available
            .insert(extension.name().to_string(), extension);
    }

    fn get(&self, name: &str) -> Result<&Arc<dyn Extension>, ExtensionError> {
        self.available
            .get(name)
            .ok_or_else(|| ExtensionError::Unknown(name.to_string()))
    }

    pub async fn load(&self, name: &str) -> Result<(), ExtensionError> {
        let ext = self.get(name)?;
        {
            let mut loaded = self.loaded.write().await;
            if loaded.iter().any(|n| n == name) {
                return Err(ExtensionError::AlreadyLoaded(name.to_string()));
            }
            loaded.push(name.to_string());
        }
        ext.on_load().await;
        log::info!("loaded extension {}", name);
        Ok(())
    }

    pub async fn unload(&self, name: &str) -> Result<(), ExtensionError> {
        let ext = self.get(name)?;
        {
            let mut loaded = self.loaded.write().await;
            let pos = loaded
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| ExtensionError::NotLoaded(name.to_string()))?;
            loaded.remove(pos);
        }
        ext.on_unload().await;
        log::info!("unloaded extension {}", name);
        Ok(())
    }

    pub async fn reload(&self, name: &str) -> Result<(), ExtensionError> {
        self.unload(name).await?;
        self.load(name).await
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().await.iter().any(|n| n == name)
    }

    pub async fn loaded(&self) -> Vec<String> {
        self.loaded.read().await.clone()
    }

    /// Run a management command and return the text to send back.
    pub async fn run_command(&self, command: &Command) -> String {
        let result = match command {
            Command::Load(name) => self.load(name).await.map(|_| format!("Loaded extension {}", name)),
            Command::Unload(name) => self
                .unload(name)
                .await
                .map(|_| format!("Unloaded extension {}", name)),
            Command::Reload(name) => self
                .reload(name)
                .await
                .map(|_| format!("Reloaded extension {}", name)),
            Command::List => Ok(format!("Extensions: [{}]", self.loaded().await.join(", "))),
        };
        result.unwrap_or_else(|e| {
            log::warn!("extension command failed: {}", e);
            format!("Error: {}", e)
        })
    }
}

/// Extension management command parsed from a prefixed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load(String),
    Unload(String),
    Reload(String),
    List,
}

/// Parse `{prefix}load <name>`, `{prefix}unload <name>`, `{prefix}reload <name>` or `{prefix}cogs`.
/// Anything else (including a missing name) is not a command.
pub fn parse_command(content: &str, prefix: &str) -> Option<Command> {
    let rest = content.strip_prefix(prefix)?;
    let mut parts = rest.split_whitespace();
    let verb = parts.next()?;
    let arg = parts.next().map(str::to_string);
    match (verb, arg) {
        ("load", Some(name)) => Some(Command::Load(name)),
        ("unload", Some(name)) => Some(Command::Unload(name)),
        ("reload", Some(name)) => Some(Command::Reload(name)),
        ("cogs", None) => Some(Command::List),
        _ => None,
    }
}
