//! Relay access: the REST surface of the chat server behind one trait.
//!
//! `HttpRelay` is the production implementation. The login cookie lives in a
//! shared jar so the push channel can present the same session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use chatty_proto::{
    api::{CreateChatRequest, CreateChatResponse, InviteRequest, LoginRequest, SignupRequest},
    ChatId, ChatRecord, MessageRecord, UserId, UserRecord,
};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::realtime::WsChannel;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Every call the client makes against the relay.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn signup(&self, req: &SignupRequest) -> Result<(), ClientError>;
    /// Establishes the relay session and returns the stored account.
    async fn login(&self, req: &LoginRequest) -> Result<UserRecord, ClientError>;
    async fn list_chats(&self) -> Result<Vec<ChatRecord>, ClientError>;
    async fn create_chat(&self, req: &CreateChatRequest) -> Result<ChatId, ClientError>;
    async fn invite(&self, chat_id: ChatId, req: &InviteRequest) -> Result<(), ClientError>;
    async fn messages(&self, chat_id: ChatId) -> Result<Vec<MessageRecord>, ClientError>;
    async fn participants(&self, chat_id: ChatId) -> Result<Vec<UserRecord>, ClientError>;
    async fn remove_participant(&self, chat_id: ChatId, user_id: UserId) -> Result<(), ClientError>;
    async fn delete_chat(&self, chat_id: ChatId) -> Result<(), ClientError>;
    async fn leave_chat(&self, chat_id: ChatId) -> Result<(), ClientError>;
    async fn search_users(&self, query: &str) -> Result<Vec<UserRecord>, ClientError>;
}

pub struct HttpRelay {
    http: reqwest::Client,
    base: Url,
    jar: Arc<Jar>,
}

impl HttpRelay {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base = config.base_url()?;
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base, jar })
    }

    /// `Cookie` header value for the relay session, if logged in.
    pub fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.base)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    /// Push channel that authenticates with this relay's session cookie.
    pub fn push_channel(&self, config: &ClientConfig) -> Result<WsChannel, ClientError> {
        Ok(WsChannel::new(config.push_url()?, self.base.clone(), self.jar.clone()))
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::Transport(format!("bad endpoint {path}: {e}")))
    }

    /// Pass through 2xx responses; turn anything else into `ClientError::Relay`.
    async fn check(endpoint: &str, resp: Response) -> Result<Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default().trim().to_string();
        warn!("[relay] {endpoint} returned {status}");
        Err(ClientError::Relay {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    /// GET a JSON list. The relay encodes an empty list as `null`.
    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ClientError> {
        let resp = self.http.get(self.url(path)?).send().await?;
        let resp = Self::check(path, resp).await?;
        decode_list(path, &resp.bytes().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let resp = self.http.delete(self.url(path)?).send().await?;
        Self::check(path, resp).await?;
        Ok(())
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn signup(&self, req: &SignupRequest) -> Result<(), ClientError> {
        let resp = self.http.post(self.url("/signup")?).json(req).send().await?;
        Self::check("/signup", resp).await?;
        debug!("[relay] signup accepted for {}", req.username);
        Ok(())
    }

    async fn login(&self, req: &LoginRequest) -> Result<UserRecord, ClientError> {
        let resp = self.http.post(self.url("/login")?).json(req).send().await?;
        let resp = Self::check("/login", resp).await?;
        Ok(resp.json::<UserRecord>().await?)
    }

    async fn list_chats(&self) -> Result<Vec<ChatRecord>, ClientError> {
        self.get_list("/chats").await
    }

    async fn create_chat(&self, req: &CreateChatRequest) -> Result<ChatId, ClientError> {
        let resp = self.http.post(self.url("/chats")?).json(req).send().await?;
        let resp = Self::check("/chats", resp).await?;
        Ok(resp.json::<CreateChatResponse>().await?.id)
    }

    async fn invite(&self, chat_id: ChatId, req: &InviteRequest) -> Result<(), ClientError> {
        let path = format!("/chats/{chat_id}/invite");
        let resp = self.http.post(self.url(&path)?).json(req).send().await?;
        Self::check(&path, resp).await?;
        Ok(())
    }

    async fn messages(&self, chat_id: ChatId) -> Result<Vec<MessageRecord>, ClientError> {
        self.get_list(&format!("/chats/{chat_id}/messages")).await
    }

    async fn participants(&self, chat_id: ChatId) -> Result<Vec<UserRecord>, ClientError> {
        self.get_list(&format!("/chats/{chat_id}/participants")).await
    }

    async fn remove_participant(&self, chat_id: ChatId, user_id: UserId) -> Result<(), ClientError> {
        self.delete(&format!("/chats/{chat_id}/participants/{user_id}")).await
    }

    async fn delete_chat(&self, chat_id: ChatId) -> Result<(), ClientError> {
        self.delete(&format!("/chats/{chat_id}")).await
    }

    async fn leave_chat(&self, chat_id: ChatId) -> Result<(), ClientError> {
        self.delete(&format!("/chats/{chat_id}/leave")).await
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserRecord>, ClientError> {
        let resp = self
            .http
            .get(self.url("/users/search")?)
            .query(&[("q", query)])
            .send()
            .await?;
        let resp = Self::check("/users/search", resp).await?;
        decode_list("/users/search", &resp.bytes().await?)
    }
}

/// Decode a JSON array body, reading `null` as an empty list.
fn decode_list<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<Vec<T>, ClientError> {
    let list = serde_json::from_slice::<Option<Vec<T>>>(body)
        .map_err(|e| ClientError::MalformedEnvelope(format!("{endpoint}: {e}")))?;
    Ok(list.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_list_is_empty() {
        let chats: Vec<ChatRecord> = decode_list("/chats", b"null").unwrap();
        assert!(chats.is_empty());
        let users: Vec<UserRecord> = decode_list("/users/search", b" null\n").unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn list_body_decodes() {
        let body = br#"[{"id":7,"name":"plans","owner_id":1,"encrypted_key":null}]"#;
        let chats: Vec<ChatRecord> = decode_list("/chats", body).unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, 7);
        assert!(chats[0].encrypted_key.is_none());
    }

    #[test]
    fn non_list_body_is_malformed() {
        let err = decode_list::<ChatRecord>("/chats", br#"{"error":"x"}"#).unwrap_err();
        assert!(matches!(err, ClientError::MalformedEnvelope(ref m) if m.starts_with("/chats")));
    }
}
