//! Identity endpoint client (`POST /icp4d-api/v1/authorize`)
//!
//! Uses its own short-lived reqwest client so token refresh never competes
//! with pooled connections.

use async_trait::async_trait;
use cpdbatch_common::auth::{IdentityError, IdentityProvider};
use cpdbatch_domain::{ClientConfig, Secret};
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::http::HttpError;

pub const AUTHORIZE_PATH: &str = "/icp4d-api/v1/authorize";

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    token: Option<String>,
}

/// Exchanges username plus password or API key for a bearer token.
pub struct CpdIdentityProvider {
    client: ReqwestClient,
    url: String,
    username: String,
    secret: Secret,
}

impl std::fmt::Debug for CpdIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpdIdentityProvider")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("secret", &self.secret)
            .finish_non_exhaustive()
    }
}

impl CpdIdentityProvider {
    /// # Errors
    /// Returns [`HttpError::InvalidRequest`] if the secret for the configured
    /// auth mode is missing, or if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, HttpError> {
        let secret = config.secret().map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
        let mut builder = ReqwestClient::builder()
            .timeout(config.auth_timeout())
            .connect_timeout(config.connect_timeout())
            .no_proxy();
        if config.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(|e| HttpError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{AUTHORIZE_PATH}", config.base_url()),
            username: config.username.clone(),
            secret,
        })
    }

    fn payload(&self) -> AuthorizeRequest<'_> {
        let (password, api_key) = match &self.secret {
            Secret::Password(p) => (Some(p.as_str()), None),
            Secret::ApiKey(k) => (None, Some(k.as_str())),
        };
        AuthorizeRequest { username: &self.username, password, api_key }
    }
}

#[async_trait]
impl IdentityProvider for CpdIdentityProvider {
    #[instrument(skip(self), fields(url = %self.url, username = %self.username))]
    async fn authorize(&self) -> Result<String, IdentityError> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.payload())
            .send()
            .await
            .map_err(|e| IdentityError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() != 200 {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "identity endpoint rejected credentials");
            return Err(IdentityError::Rejected { status: status.as_u16(), message });
        }

        let body: AuthorizeResponse =
            response.json().await.map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IdentityError::InvalidResponse("response has no token".into()))?;
        info!("CPD token refreshed");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use cpdbatch_domain::AuthMode;

    fn config(server: &MockServer, mode: AuthMode) -> ClientConfig {
        ClientConfig {
            scheme: "http".into(),
            host: server.address().to_string(),
            username: "admin".into(),
            password: Some("pw".into()),
            api_key: Some("key".into()),
            auth_mode: mode,
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_password_mode_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AUTHORIZE_PATH))
            .and(body_json(json!({"username": "admin", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc"})))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            CpdIdentityProvider::from_config(&config(&server, AuthMode::Password)).unwrap();
        assert_eq!(provider.authorize().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_api_key_mode_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AUTHORIZE_PATH))
            .and(body_json(json!({"username": "admin", "api_key": "key"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "xyz"})))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            CpdIdentityProvider::from_config(&config(&server, AuthMode::ApiKey)).unwrap();
        assert_eq!(provider.authorize().await.unwrap(), "xyz");
    }

    #[tokio::test]
    async fn test_rejection_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let provider =
            CpdIdentityProvider::from_config(&config(&server, AuthMode::Password)).unwrap();
        let err = provider.authorize().await.unwrap_err();
        assert_eq!(err, IdentityError::Rejected { status: 403, message: "bad credentials".into() });
    }

    #[tokio::test]
    async fn test_missing_token_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .mount(&server)
            .await;

        let provider =
            CpdIdentityProvider::from_config(&config(&server, AuthMode::Password)).unwrap();
        assert!(matches!(provider.authorize().await, Err(IdentityError::InvalidResponse(_))));
    }

    #[test]
    fn debug_redacts_secret() {
        let cfg = ClientConfig {
            host: "cpd.example.com".into(),
            username: "admin".into(),
            password: Some("hunter2".into()),
            ..ClientConfig::default()
        };
        let provider = CpdIdentityProvider::from_config(&cfg).unwrap();
        assert!(!format!("{provider:?}").contains("hunter2"));
    }
}
