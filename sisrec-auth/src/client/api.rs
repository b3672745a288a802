//! Authenticated API client
//!
//! Attaches the bearer token to every request. A 401 from anything but the
//! login endpoint means the token is dead: the session is invalidated and the
//! caller is told to hard-redirect to login.

use super::{
    create_http_client, endpoint, handle_response_error, normalize_base_url, transport_error,
    LOGIN_PATH,
};
use crate::session::SessionStore;
use crate::{AuthError, AuthResult};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sisrec_core::BackendConfig;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    login_url: Url,
    store: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(config: &BackendConfig, store: Arc<SessionStore>) -> AuthResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            client: create_http_client(config)?,
            login_url: endpoint(&base_url, LOGIN_PATH)?,
            base_url,
            store,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> AuthResult<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> AuthResult<T> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> AuthResult<()> {
        self.send::<(), serde_json::Value>(Method::DELETE, path, None)
            .await
            .map(|_| ())
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> AuthResult<T> {
        let url = endpoint(&self.base_url, path)?;
        debug!("{} {}", method, url);

        let sent_token = self.store.token().await;
        let mut request = self.client.request(method, url.clone());
        if let Some(token) = &sent_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, "api_request"))?;

        if response.status() == StatusCode::UNAUTHORIZED
            && !is_login_endpoint(&url, &self.login_url)
        {
            warn!("Backend rejected credentials for {}", url);
            match &sent_token {
                Some(token) => self.store.invalidate_token(token).await,
                None => self.store.invalidate().await,
            }
            return Err(AuthError::SessionExpired {
                redirect_to: self.store.login_route().to_string(),
            });
        }

        if !response.status().is_success() {
            return Err(handle_response_error(response, "api_request").await);
        }

        // Empty bodies decode as JSON null
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, "api_request"))?;
        let payload = if bytes.is_empty() { &b"null"[..] } else { &bytes[..] };

        serde_json::from_slice(payload).map_err(|e| AuthError::Core(e.into()))
    }
}

fn is_login_endpoint(url: &Url, login_url: &Url) -> bool {
    url.path().trim_end_matches('/') == login_url.path().trim_end_matches('/')
}
