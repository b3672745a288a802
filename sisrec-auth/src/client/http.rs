//! REST implementation of the authentication endpoints

use super::{
    create_http_client, endpoint, handle_response_error, normalize_base_url, transport_error,
    AuthBackend, Credentials, LoginResponse, LOGIN_PATH, LOGOUT_PATH,
};
use crate::AuthResult;
use async_trait::async_trait;
use sisrec_core::BackendConfig;
use tracing::{debug, info};
use url::Url;

/// `AuthBackend` over the SISREC REST API
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpAuthBackend {
    pub fn new(config: &BackendConfig) -> AuthResult<Self> {
        Ok(Self {
            client: create_http_client(config)?,
            base_url: normalize_base_url(&config.base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, credentials: &Credentials) -> AuthResult<LoginResponse> {
        let url = endpoint(&self.base_url, LOGIN_PATH)?;
        debug!("POST {} for {}", url, credentials.email);

        let response = self
            .client
            .post(url)
            .json(credentials)
            .send()
            .await
            .map_err(|e| transport_error(e, "login"))?;

        if !response.status().is_success() {
            return Err(handle_response_error(response, "login").await);
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, "login"))?;

        info!("Backend accepted credentials for {}", credentials.email);
        Ok(body)
    }

    async fn logout(&self, token: &str) -> AuthResult<()> {
        let url = endpoint(&self.base_url, LOGOUT_PATH)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(e, "logout"))?;

        if !response.status().is_success() {
            return Err(handle_response_error(response, "logout").await);
        }

        Ok(())
    }
}
