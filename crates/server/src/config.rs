//! Chat server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::auth::AuthManager;
use crate::db;
use crate::live::{Broadcaster, ChannelRegistry};
use crate::store::MessageStore;

/// Configuration for the CourseChat server
#[derive(Clone, Debug)]
pub struct ChatServerConfig {
    /// Storage root directory
    pub root_dir: PathBuf,
    /// SQLite database holding users, sessions and messages
    pub db_path: PathBuf,
    /// Listen address
    pub addr: SocketAddr,
    /// Session lifetime in days
    pub session_days: i64,
    /// bcrypt cost for password hashes
    pub password_cost: u32,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        let root_dir = chat_common::paths::data_root();
        Self {
            db_path: chat_common::paths::db_path(&root_dir),
            root_dir,
            addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            session_days: 30,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl ChatServerConfig {
    /// Create config rooted at a custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let root_dir = base_dir.into();
        Self {
            db_path: chat_common::paths::db_path(&root_dir),
            root_dir,
            ..Self::default()
        }
    }

    /// Defaults overridden by `COURSECHAT_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(db) = std::env::var("COURSECHAT_DB") {
            config.db_path = PathBuf::from(db);
        }
        if let Ok(addr) = std::env::var("COURSECHAT_ADDR") {
            match addr.parse() {
                Ok(addr) => config.addr = addr,
                Err(e) => warn!("Ignoring COURSECHAT_ADDR {:?}: {}", addr, e),
            }
        }
        if let Ok(days) = std::env::var("COURSECHAT_SESSION_DAYS") {
            match days.parse() {
                Ok(days) => config.session_days = days,
                Err(e) => warn!("Ignoring COURSECHAT_SESSION_DAYS {:?}: {}", days, e),
            }
        }

        config
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        chat_common::paths::ensure_dir(&self.root_dir)?;
        if let Some(parent) = self.db_path.parent() {
            chat_common::paths::ensure_dir(parent)?;
        }
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MessageStore>,
    pub auth: Arc<AuthManager>,
    pub registry: Arc<ChannelRegistry>,
    pub broadcaster: Arc<Broadcaster>,
}

impl AppState {
    /// Open storage and wire up every component
    pub async fn new(config: &ChatServerConfig) -> anyhow::Result<Self> {
        config.ensure_dirs().await?;

        let pool = db::connect(&config.db_path).await?;

        let auth = Arc::new(AuthManager::new(
            pool.clone(),
            chrono::Duration::days(config.session_days),
            config.password_cost,
        ));
        let store = Arc::new(MessageStore::new(pool, auth.clone()));
        let registry = Arc::new(ChannelRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));

        Ok(Self {
            store,
            auth,
            registry,
            broadcaster,
        })
    }
}
