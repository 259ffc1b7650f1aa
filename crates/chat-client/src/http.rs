//! HTTP client for the message store and auth endpoints

use crate::error::{ClientError, Result};
use crate::transport::MessageApi;
use async_trait::async_trait;
use chat_common::{Identity, IdentityId, Message, Role};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

/// Token plus the identity it authenticates
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: Identity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupBody<'a> {
    email: &'a str,
    full_name: &'a str,
    password: &'a str,
    role: Role,
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    to: &'a IdentityId,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct UsersBody {
    users: Vec<Identity>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub async fn signup(
    base_url: &str,
    email: &str,
    full_name: &str,
    password: &str,
    role: Role,
) -> Result<AuthSession> {
    let req = Client::new()
        .post(format!("{}/auth/signup", base_url))
        .json(&SignupBody {
            email,
            full_name,
            password,
            role,
        });
    decode(req.send().await?).await
}

pub async fn login(base_url: &str, email: &str, password: &str) -> Result<AuthSession> {
    let req = Client::new()
        .post(format!("{}/auth/login", base_url))
        .json(&LoginBody { email, password });
    decode(req.send().await?).await
}

pub struct HttpMessageApi {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl HttpMessageApi {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.auth_token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.auth_token)
    }

    /// Counterparts the caller may message, optionally filtered by name/email
    pub async fn users(&self, query: Option<&str>) -> Result<Vec<Identity>> {
        let path = match query {
            Some(q) => format!("/users?q={}", urlencoding::encode(q)),
            None => "/users".to_string(),
        };
        let body: UsersBody = decode(self.get(&path).send().await?).await?;
        Ok(body.users)
    }

    pub async fn me(&self) -> Result<Identity> {
        decode(self.get("/auth/me").send().await?).await
    }

    pub async fn logout(&self) -> Result<()> {
        let resp = self.post("/auth/logout").send().await?;
        check(resp).await.map(|_| ())
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn append(&self, to: &IdentityId, text: &str) -> Result<Message> {
        debug!("POST /messages -> {}", to);
        let req = self.post("/messages").json(&SendBody { to, text });
        decode(req.send().await?).await
    }

    async fn history(&self, peer: &IdentityId) -> Result<Vec<Message>> {
        let path = format!("/messages/{}", urlencoding::encode(peer.as_str()));
        debug!("GET {}", path);
        let body: HistoryBody = decode(self.get(&path).send().await?).await?;
        Ok(body.messages)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = check(resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Map error statuses onto [`ClientError`]
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error.message)
        .unwrap_or(text);

    Err(match status {
        StatusCode::BAD_REQUEST => ClientError::Validation(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        _ => ClientError::Server {
            status: status.as_u16(),
            message,
        },
    })
}
