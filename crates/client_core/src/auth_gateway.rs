//! Typed calls to the `/auth` endpoints.

use std::sync::Arc;

use shared::{
    domain::UserSummary,
    protocol::{LoginRequest, MessageResponse, RegisterRequest, TokenResponse},
};

use crate::{error::TransportError, transport::Transport};

#[derive(Clone)]
pub struct AuthGateway {
    transport: Arc<Transport>,
}

impl AuthGateway {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<TokenResponse, TransportError> {
        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        };
        self.transport.post("/auth/register", &request).await
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenResponse, TransportError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.transport.post("/auth/login", &request).await
    }

    /// Best-effort server notification; the server keeps no session state.
    /// Sent with `token` so it still works after the local store is cleared.
    pub async fn logout(&self, token: &str) -> Result<(), TransportError> {
        let _: MessageResponse = self
            .transport
            .post_empty_as("/auth/logout", token)
            .await?;
        Ok(())
    }

    pub async fn current_user(&self) -> Result<UserSummary, TransportError> {
        self.transport.get("/auth/me").await
    }

    /// Exchange a refresh token for a new access token. Not used by the
    /// session state machine, which treats expiry as a sign-out.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, TransportError> {
        self.transport
            .post_with_query("/auth/refresh", &[("refresh_token", refresh_token)])
            .await
    }
}
