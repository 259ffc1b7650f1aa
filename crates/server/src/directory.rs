//! Participant directory
//!
//! The Message Store only needs to know whether an identity exists; the
//! `/users` listing needs the counterpart view. Both go through [`Directory`]
//! so storage never depends on how identities are issued.

use async_trait::async_trait;
use chat_common::{Identity, IdentityId, Role};

use crate::error::Result;

#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve one identity, `None` if unknown
    async fn lookup(&self, id: &IdentityId) -> Result<Option<Identity>>;

    /// Every active identity
    async fn list(&self) -> Result<Vec<Identity>>;
}

/// Who `caller` may start a conversation with.
///
/// The caller is never listed. Learners only see Operators; Operators see
/// everyone else. `query` is a case-insensitive substring match over name
/// and email.
pub fn counterparts(all: Vec<Identity>, caller: &Identity, query: Option<&str>) -> Vec<Identity> {
    let needle = query
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    all.into_iter()
        .filter(|u| u.id != caller.id)
        .filter(|u| caller.role == Role::Operator || u.role == Role::Operator)
        .filter(|u| match &needle {
            Some(n) => {
                u.display_name.to_lowercase().contains(n) || u.email.to_lowercase().contains(n)
            }
            None => true,
        })
        .collect()
}
