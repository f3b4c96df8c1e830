//! How a [`SessionContext`](crate::session::SessionContext) reaches the verifier.

use crate::chain::client::ChainReader;
use crate::error::AuthError;
use crate::request::SealedTokenRequest;
use crate::verifier::{SessionVerifier, Verifier};
use crate::wire::{
    AuthenticatedUser, ErrorResponse, SessionKeyRequest, SessionKeyResponse, SessionTokenResponse,
};
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;

/// Round trips to the verifier.
#[async_trait]
pub trait VerifierTransport: Send + Sync {
    async fn register_session_key(
        &self,
        request: &SessionKeyRequest,
    ) -> Result<SessionKeyResponse, AuthError>;

    async fn exchange_token(
        &self,
        request: &SealedTokenRequest,
    ) -> Result<SessionTokenResponse, AuthError>;
}

/// In-process transport: call the verifier directly.
#[async_trait]
impl<R: ChainReader> VerifierTransport for Verifier<R> {
    async fn register_session_key(
        &self,
        request: &SessionKeyRequest,
    ) -> Result<SessionKeyResponse, AuthError> {
        Ok(self.verify_session_key(request.clone()).await?)
    }

    async fn exchange_token(
        &self,
        request: &SealedTokenRequest,
    ) -> Result<SessionTokenResponse, AuthError> {
        Ok(self.issue_session_token(request).await?)
    }
}

/// JSON-over-HTTP transport to a `passport-verifier` server.
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /auth/me` with a bearer token.
    pub async fn me(&self, auth_token: &str) -> Result<AuthenticatedUser, AuthError> {
        let url = format!("{}/auth/me", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(auth_token)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, AuthError>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, AuthError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| AuthError::Transport(e.to_string()));
        }

        match resp.json::<ErrorResponse>().await {
            Ok(body) => Err(AuthError::from_error_code(&body.error, &body.message)),
            Err(_) => Err(AuthError::Transport(format!("HTTP {}", status))),
        }
    }
}

#[async_trait]
impl VerifierTransport for HttpTransport {
    async fn register_session_key(
        &self,
        request: &SessionKeyRequest,
    ) -> Result<SessionKeyResponse, AuthError> {
        self.post("/auth/session-key", request).await
    }

    async fn exchange_token(
        &self,
        request: &SealedTokenRequest,
    ) -> Result<SessionTokenResponse, AuthError> {
        self.post("/auth/session_token", request).await
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}
