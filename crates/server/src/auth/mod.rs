//! Authentication Module
//!
//! Handles signup, login, and session management. The core trusts the
//! identity resolved here for every Persistence API call and for the live
//! channel handshake. User data lives in the shared SQLite database.

pub mod middleware;

use async_trait::async_trait;
use bcrypt::{hash, verify};
use chat_common::{Identity, IdentityId, Role};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::directory::Directory;
use crate::error::{Error, Result};

/// Session token for authenticated requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: IdentityId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Input for registering a participant
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub role: Role,
}

type UserRow = (String, String, String, String);

fn identity_from_row((id, email, full_name, role): UserRow) -> Result<Identity> {
    let role = role
        .parse::<Role>()
        .map_err(|e| Error::Internal(format!("Corrupt user record {id}: {e}")))?;
    Ok(Identity {
        id: IdentityId::new(id),
        role,
        display_name: full_name,
        email,
    })
}

/// Auth manager handles all authentication
pub struct AuthManager {
    pool: SqlitePool,
    session_ttl: Duration,
    password_cost: u32,
    /// In-memory session cache
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    pub fn new(pool: SqlitePool, session_ttl: Duration, password_cost: u32) -> Self {
        info!("[Auth] Initialized");
        Self {
            pool,
            session_ttl,
            password_cost,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new participant
    pub async fn signup(&self, input: NewUser) -> Result<Identity> {
        let email = input.email.trim().to_lowercase();
        let full_name = input.full_name.trim().to_string();
        if email.is_empty() || full_name.is_empty() {
            return Err(Error::Validation("Email and name are required".into()));
        }
        if input.password.len() < 6 {
            return Err(Error::Validation(
                "Password must be at least 6 characters".into(),
            ));
        }

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            return Err(Error::Conflict("Email already registered".into()));
        }

        let password_hash = hash(&input.password, self.password_cost)?;

        let identity = Identity {
            id: IdentityId::new(Uuid::new_v4().to_string()),
            role: input.role,
            display_name: full_name,
            email,
        };

        sqlx::query(
            "INSERT INTO users (id, email, full_name, role, password_hash, created_at, is_active) VALUES (?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(identity.id.as_str())
        .bind(&identity.email)
        .bind(&identity.display_name)
        .bind(identity.role.as_str())
        .bind(&password_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(
            "[Auth] User registered: {} ({}, {})",
            identity.display_name, identity.email, identity.role
        );

        Ok(identity)
    }

    /// Login user and create session
    pub async fn login(&self, email: &str, password: &str) -> Result<(Identity, Session)> {
        let email = email.trim().to_lowercase();

        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, email, full_name, role, password_hash FROM users WHERE email = ? AND is_active = 1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let (id, email, full_name, role, password_hash) = row.ok_or(Error::LoginFail)?;

        if !verify(password, &password_hash)? {
            warn!("[Auth] Failed login attempt for {}", email);
            return Err(Error::LoginFail);
        }

        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&id)
            .execute(&self.pool)
            .await?;

        let identity = identity_from_row((id, email, full_name, role))?;
        let session = self.create_session(&identity.id).await?;

        info!("[Auth] User logged in: {}", identity.display_name);

        Ok((identity, session))
    }

    async fn create_session(&self, user_id: &IdentityId) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(session.user_id.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        // Expired tokens that are never presented again would otherwise stay
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session.token.clone(), session.clone());

        Ok(session)
    }

    /// Validate session token and resolve the caller's identity
    pub async fn validate_session(&self, token: &str) -> Result<Identity> {
        let cached = self.sessions.read().await.get(token).cloned();

        let (user_id, expires_at) = match cached {
            Some(session) => (session.user_id, session.expires_at),
            None => {
                let row: Option<(String, String)> =
                    sqlx::query_as("SELECT user_id, expires_at FROM sessions WHERE token = ?")
                        .bind(token)
                        .fetch_optional(&self.pool)
                        .await?;
                let (user_id, expires_at) = row.ok_or(Error::LoginFail)?;
                let expires_at: DateTime<Utc> =
                    expires_at.parse().map_err(|_| Error::LoginFail)?;
                (IdentityId::new(user_id), expires_at)
            }
        };

        if expires_at <= Utc::now() {
            self.sessions.write().await.remove(token);
            return Err(Error::LoginFail);
        }

        self.get_user(&user_id).await?.ok_or(Error::LoginFail)
    }

    /// Logout user (invalidate session)
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);

        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        info!("[Auth] Session invalidated");
        Ok(())
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: &IdentityId) -> Result<Option<Identity>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, full_name, role FROM users WHERE id = ? AND is_active = 1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(identity_from_row).transpose()
    }

    /// List all active users
    pub async fn list_users(&self) -> Result<Vec<Identity>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, email, full_name, role FROM users WHERE is_active = 1 ORDER BY full_name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(identity_from_row).collect()
    }
}

#[async_trait]
impl Directory for AuthManager {
    async fn lookup(&self, id: &IdentityId) -> Result<Option<Identity>> {
        self.get_user(id).await
    }

    async fn list(&self) -> Result<Vec<Identity>> {
        self.list_users().await
    }
}
