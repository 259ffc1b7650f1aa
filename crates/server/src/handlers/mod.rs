//! HTTP handlers
//!
//! Persistence API (`/messages`), participant directory (`/users`) and the
//! auth collaborator endpoints (`/auth/*`).

pub mod auth;
pub mod messages;
pub mod users;

// Auth handlers
pub use auth::{login, logout, me, signup};

// Persistence API
pub use messages::{get_messages, post_message};

// Directory
pub use users::list_users;
