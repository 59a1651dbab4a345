//! HTTP transport shared by every gateway.
//!
//! Outgoing requests pick up the stored bearer token. Incoming 401s on
//! anything other than the credential exchange endpoints clear the token
//! store and broadcast an [`ExpiryNotice`]; the session controller turns
//! that notice into a redirect.

use std::{sync::Arc, time::Duration};

use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Client, Method, RequestBuilder, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use shared::error::ApiErrorBody;
use storage::TokenStore;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use url::Url;

use crate::error::TransportError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";

/// Emitted once per rejected credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryNotice {
    /// The token the rejected request was sent with.
    pub token: String,
    pub path: String,
}

pub struct Transport {
    http: Client,
    base_url: Url,
    store: Arc<dyn TokenStore>,
    expiry_lock: Mutex<()>,
    expiry_tx: broadcast::Sender<ExpiryNotice>,
}

impl Transport {
    pub fn new(base_url: &str, store: Arc<dyn TokenStore>) -> Result<Arc<Self>, TransportError> {
        Self::with_timeout(base_url, store, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        store: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> Result<Arc<Self>, TransportError> {
        let mut parsed = Url::parse(base_url).map_err(|source| TransportError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        // Relative joins replace the last segment unless the base ends in '/'.
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;
        let (expiry_tx, _) = broadcast::channel(16);

        Ok(Arc::new(Self {
            http,
            base_url: parsed,
            store,
            expiry_lock: Mutex::new(()),
            expiry_tx,
        }))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn subscribe_expiry(&self) -> broadcast::Receiver<ExpiryNotice> {
        self.expiry_tx.subscribe()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let response = self.dispatch(Method::GET, path, |request| request).await?;
        decode(path, response).await
    }

    pub async fn get_with_query<Q, T>(&self, path: &str, query: &Q) -> Result<T, TransportError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .dispatch(Method::GET, path, |request| request.query(query))
            .await?;
        decode(path, response).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .dispatch(Method::POST, path, |request| request.json(body))
            .await?;
        decode(path, response).await
    }

    /// POST without a body, with optional query parameters.
    pub async fn post_with_query<Q, T>(&self, path: &str, query: &Q) -> Result<T, TransportError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .dispatch(Method::POST, path, |request| request.query(query))
            .await?;
        decode(path, response).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let response = self.dispatch(Method::POST, path, |request| request).await?;
        decode(path, response).await
    }

    /// POST without a body, authorized with `token` instead of the stored
    /// credential.
    pub async fn post_empty_as<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> Result<T, TransportError> {
        let response = self
            .send(Method::POST, path, Some(token.to_string()), |request| request)
            .await?;
        decode(path, response).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .dispatch(Method::PUT, path, |request| request.json(body))
            .await?;
        decode(path, response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), TransportError> {
        self.dispatch(Method::DELETE, path, |request| request)
            .await
            .map(|_| ())
    }

    /// Clear the token store if it still holds `token`.
    ///
    /// Shares a lock with the expiry reaction so a credential is revoked at
    /// most once and a newer credential is never cleared by a stale failure.
    pub async fn revoke_if_current(&self, token: &str) -> bool {
        let _guard = self.expiry_lock.lock().await;
        match self.store.token().await {
            Some(current) if current == token => self.store.clear().await,
            _ => false,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| TransportError::InvalidPath {
                path: path.to_string(),
                source,
            })
    }

    async fn dispatch<F>(
        &self,
        method: Method,
        path: &str,
        configure: F,
    ) -> Result<Response, TransportError>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let token = self.store.token().await;
        self.send(method, path, token, configure).await
    }

    async fn send<F>(
        &self,
        method: Method,
        path: &str,
        token: Option<String>,
        configure: F,
    ) -> Result<Response, TransportError>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let url = self.endpoint(path)?;
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }

        debug!(%method, path, authorized = token.is_some(), "sending request");
        let response = configure(request)
            .send()
            .await
            .map_err(|source| TransportError::Unreachable {
                path: path.to_string(),
                source,
            })?;

        self.inspect_response(path, token, response).await
    }

    async fn inspect_response(
        &self,
        path: &str,
        sent_with: Option<String>,
        response: Response,
    ) -> Result<Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response
            .json::<ApiErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message().map(str::to_owned));

        if status == StatusCode::UNAUTHORIZED && !is_credential_exchange(path) {
            if let Some(token) = sent_with {
                self.expire(path, token).await;
            } else {
                debug!(path, "401 on a request sent without credential");
            }
        }

        Err(TransportError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            detail,
        })
    }

    async fn expire(&self, path: &str, token: String) {
        if !self.revoke_if_current(&token).await {
            debug!(path, "credential already revoked or superseded");
            return;
        }
        warn!(path, "credential rejected by server; stored session cleared");
        let _ = self.expiry_tx.send(ExpiryNotice {
            token,
            path: path.to_string(),
        });
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, TransportError> {
    response
        .json::<T>()
        .await
        .map_err(|source| TransportError::Decode {
            path: path.to_string(),
            source,
        })
}

/// Login and registration answer 401 for bad credentials, not for an
/// expired session.
fn is_credential_exchange(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    let normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    normalized == LOGIN_PATH || normalized == REGISTER_PATH
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
