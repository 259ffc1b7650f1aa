use crate::error::{Error, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use chat_common::{Identity, IdentityId};

/// Authenticated caller, inserted by the auth middleware
#[derive(Clone, Debug)]
pub struct Ctx {
    identity: Identity,
    token: String,
}

impl Ctx {
    pub fn new(identity: Identity, token: String) -> Self {
        Self { identity, token }
    }

    pub fn user_id(&self) -> &IdentityId {
        &self.identity.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or(Error::AuthFailCtxNotInRequestExt)
    }
}
