//! Plan Board
//!
//! A kanban backend for plans, tabs and tasks:
//! - Linked-list ordering engine for tabs (per plan) and tasks (per tab)
//! - Optimistic version checks on every write, stale writes surface as conflicts
//! - Neo4j or in-memory node store
//! - Axum HTTP API guarded by JWT bearer auth

pub mod api;
pub mod auth;
pub mod board;
pub mod events;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub storage: StorageYamlConfig,
    pub board: BoardYamlConfig,
    /// Auth section; when absent the API runs in open mode
    pub auth: Option<AuthConfig>,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Which node store backs the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Neo4j,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "neo4j" => Ok(StorageBackend::Neo4j),
            other => anyhow::bail!("unknown storage backend '{}'", other),
        }
    }
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageYamlConfig {
    pub backend: StorageBackend,
    pub neo4j: Neo4jYamlConfig,
}

/// Neo4j connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "plan-board".into(),
        }
    }
}

/// Board configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoardYamlConfig {
    /// Tabs created with every new plan, first one is the anchor
    pub default_tabs: Vec<String>,
}

impl Default for BoardYamlConfig {
    fn default() -> Self {
        Self {
            default_tabs: board::default_tab_names(),
        }
    }
}

/// JWT validation settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer
    pub jwt_secret: String,
    /// Lifetime of tokens minted by local tooling (default: 28800 = 8h)
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_secs: u64,
    /// Optional email domain restriction (e.g. "example.com")
    pub allowed_email_domain: Option<String>,
}

fn default_jwt_expiry() -> u64 {
    28800
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Configuration after YAML and environment are merged
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub storage_backend: StorageBackend,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub default_tabs: Vec<String>,
    pub auth_config: Option<AuthConfig>,
}

impl Config {
    /// Load `yaml_path` (default `config.yaml`), then apply env overrides.
    ///
    /// Priority: env var > YAML value > built-in default.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let storage_backend = match std::env::var("STORAGE_BACKEND") {
            Ok(raw) => raw.parse::<StorageBackend>().context("invalid STORAGE_BACKEND")?,
            Err(_) => yaml.storage.backend,
        };

        Ok(Self {
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.server.port),
            storage_backend,
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(yaml.storage.neo4j.uri),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.storage.neo4j.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.storage.neo4j.password),
            default_tabs: yaml.board.default_tabs,
            auth_config: yaml.auth,
        })
    }

    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

// ============================================================================
// Application state
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn store::NodeStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Connect the configured node store
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn store::NodeStore> = match config.storage_backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory store, data is lost on restart");
                Arc::new(store::MemoryNodeStore::new())
            }
            StorageBackend::Neo4j => Arc::new(
                store::Neo4jNodeStore::new(
                    &config.neo4j_uri,
                    &config.neo4j_user,
                    &config.neo4j_password,
                )
                .await?,
            ),
        };

        Ok(Self {
            store,
            config: Arc::new(config),
        })
    }
}

/// Wire the board manager, event bus and router, then serve until shutdown
pub async fn start_server(config: Config) -> Result<()> {
    let port = config.server_port;
    if config.auth_config.is_none() {
        tracing::warn!("No auth section configured, API is open to anonymous callers");
    }

    let state = AppState::new(config).await?;
    let event_bus = Arc::new(events::EventBus::default());
    let board = board::BoardManager::new(state.store.clone())
        .with_event_emitter(event_bus.clone())
        .with_default_tabs(state.config.default_tabs.clone());

    let server_state = Arc::new(api::handlers::ServerState {
        board: Arc::new(board),
        event_bus,
        auth_config: state.config.auth_config.clone(),
    });
    let app = api::create_router(server_state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("plan-board listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
