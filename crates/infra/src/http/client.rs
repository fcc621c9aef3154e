//! Authenticated request executor for the CPD REST API
//!
//! ```text
//! execute(method, path)
//!   ├─ pool.acquire()           PoolError::{Exhausted, Closed}
//!   ├─ tokens.current_token()   refreshes when stale
//!   ├─ send                     HttpError::Transport on network failure
//!   └─ 401?
//!        ├─ refresh_after_auth_failure(rejected)
//!        │     ok        -> reattach token, send once more
//!        │     throttled -> original 401 response
//!        └─ connection returns to the pool when the guard drops
//! ```

use std::sync::Arc;

use cpdbatch_common::auth::{IdentityProvider, TokenManager, TokenManagerError};
use cpdbatch_domain::constants::DEFAULT_SEARCH_AUTH_SCOPE;
use cpdbatch_domain::ClientConfig;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::connection::{Connection, ConnectionSettings, HttpConnectionManager};
use super::pool::{ConnectionPool, PoolConfig, PoolError, PoolStatus};
use crate::api::identity::CpdIdentityProvider;

/// Failures of the request executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HttpError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// No usable token could be obtained before sending
    #[error(transparent)]
    Auth(#[from] TokenManagerError),

    /// Network-level failure (connect, timeout, broken body)
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A response body did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Fully read HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    /// Returns [`HttpError::Decode`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

type TokenSource = TokenManager<Arc<dyn IdentityProvider>>;

/// Pooled, authenticated client for one CPD cluster.
pub struct CpdClient {
    pool: ConnectionPool<HttpConnectionManager>,
    tokens: Arc<TokenSource>,
}

impl std::fmt::Debug for CpdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpdClient").field("pool", &self.pool.status()).finish_non_exhaustive()
    }
}

impl CpdClient {
    /// Build a client from configuration, authenticating against the
    /// cluster's identity endpoint.
    ///
    /// The first token is fetched lazily by the first request.
    ///
    /// # Errors
    /// Returns [`HttpError::InvalidRequest`] for an invalid configuration and
    /// [`HttpError::Pool`] if the initial connections cannot be created.
    pub fn from_config(config: &ClientConfig) -> Result<Self, HttpError> {
        config.validate().map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
        let identity = CpdIdentityProvider::from_config(config)?;
        let tokens = TokenManager::new(
            Arc::new(identity) as Arc<dyn IdentityProvider>,
            config.max_token_age(),
            config.min_auth_retry_interval(),
        );
        Self::with_token_manager(config, Arc::new(tokens))
    }

    /// Build a client that obtains tokens from `tokens`.
    ///
    /// # Errors
    /// Returns [`HttpError::Pool`] if the base URL is invalid or the initial
    /// connections cannot be created.
    pub fn with_token_manager(
        config: &ClientConfig,
        tokens: Arc<TokenSource>,
    ) -> Result<Self, HttpError> {
        let manager =
            HttpConnectionManager::new(&config.base_url(), ConnectionSettings::from(config))?;
        let pool = ConnectionPool::new(
            manager,
            PoolConfig {
                capacity: config.pool_size,
                initial_size: config.initial_pool_fill(),
                acquire_timeout: config.pool_acquire_timeout(),
            },
        )?;
        info!(host = %config.host, pool_size = config.pool_size, "CPD client ready");
        Ok(Self { pool, tokens })
    }

    pub fn token_manager(&self) -> &Arc<TokenSource> {
        &self.tokens
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Issue an authenticated request.
    ///
    /// Non-2xx statuses are returned as ordinary responses. A 401 triggers
    /// one rate-limited token refresh and a single retry.
    ///
    /// # Errors
    /// - [`HttpError::Pool`] when no connection is available
    /// - [`HttpError::Auth`] when no token can be obtained before sending
    /// - [`HttpError::Transport`] on network failure
    #[instrument(skip(self, body, params))]
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse, HttpError> {
        let mut conn = self.pool.acquire().await?;
        let credential = self.tokens.current_token().await?;
        conn.set_bearer(&credential.token)?;

        let response = send(&conn, &method, path, body, params).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("request unauthorized, attempting token refresh");
        match self.tokens.refresh_after_auth_failure(&credential.token).await {
            Ok(fresh) => {
                conn.set_bearer(&fresh.token)?;
                let retried = send(&conn, &method, path, body, params).await?;
                if retried.status() == StatusCode::UNAUTHORIZED {
                    warn!("request still unauthorized after token refresh");
                } else {
                    let status = retried.status().as_u16();
                    info!(status, "request succeeded after token refresh");
                }
                Ok(retried)
            }
            Err(err) => {
                warn!(error = %err, "token refresh unavailable, returning original response");
                Ok(response)
            }
        }
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<ApiResponse, HttpError> {
        self.execute(Method::GET, path, None, params).await
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse, HttpError> {
        self.execute(Method::POST, path, Some(body), params).await
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn put(
        &self,
        path: &str,
        body: &Value,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse, HttpError> {
        self.execute(Method::PUT, path, Some(body), params).await
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn patch(
        &self,
        path: &str,
        body: &Value,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse, HttpError> {
        self.execute(Method::PATCH, path, Some(body), params).await
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn delete(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse, HttpError> {
        self.execute(Method::DELETE, path, None, params).await
    }

    /// Global search (`POST /v3/search`). `auth_scope` defaults to `category`.
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn search(
        &self,
        query: &Value,
        auth_scope: Option<&str>,
    ) -> Result<ApiResponse, HttpError> {
        let scope = auth_scope.unwrap_or(DEFAULT_SEARCH_AUTH_SCOPE);
        self.execute(Method::POST, "/v3/search", Some(query), &[("auth_scope", scope)]).await
    }

    /// Close every pooled connection; later requests fail with
    /// [`PoolError::Closed`].
    pub fn shutdown(&self) {
        self.pool.close_all();
    }
}

impl Drop for CpdClient {
    fn drop(&mut self) {
        self.pool.close_all();
    }
}

async fn send(
    conn: &Connection,
    method: &Method,
    path: &str,
    body: Option<&Value>,
    params: &[(&str, &str)],
) -> Result<ApiResponse, HttpError> {
    let mut request = conn.request(method.clone(), path)?;
    if !params.is_empty() {
        request = request.query(params);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request.send().await.map_err(HttpError::from)?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(HttpError::from)?.to_vec();
    debug!(
        status = status.as_u16(),
        bytes = body.len(),
        connection_id = conn.id(),
        "response received"
    );

    Ok(ApiResponse { status, headers, body })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cpdbatch_common::testing::MockIdentityProvider;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(host: String, pool_size: usize) -> ClientConfig {
        ClientConfig {
            scheme: "http".into(),
            host,
            username: "admin".into(),
            password: Some("secret".into()),
            pool_size,
            initial_pool_size: Some(1),
            pool_acquire_timeout_secs: 2,
            ..ClientConfig::default()
        }
    }

    fn client_with(server: &MockServer, identity: Arc<MockIdentityProvider>) -> CpdClient {
        let tokens = TokenManager::new(
            identity as Arc<dyn IdentityProvider>,
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );
        CpdClient::with_token_manager(&config(server.address().to_string(), 4), Arc::new(tokens))
            .unwrap()
    }

    #[tokio::test]
    async fn test_attaches_bearer_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/jobs"))
            .and(query_param("project_id", "p1"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with(&server, Arc::new(MockIdentityProvider::new()));
        let response = client.get("/v2/jobs", &[("project_id", "p1")]).await.unwrap();

        assert!(response.is_success());
        let body: Value = response.json().unwrap();
        assert_eq!(body["results"], json!([]));
        assert_eq!(client.pool_status().outstanding, 0);
    }

    /// Validates recovery from an expired token.
    ///
    /// Assertions:
    /// - Exactly two calls reach the server.
    /// - Exactly one token refresh happens after the initial fetch.
    #[tokio::test]
    async fn test_401_then_success_refreshes_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/jobs/j1/runs"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/jobs/j1/runs"))
            .and(header("authorization", "Bearer token-2"))
            .and(body_json(json!({"job_run": {"name": "job run"}})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let identity = Arc::new(MockIdentityProvider::new());
        let client = client_with(&server, identity.clone());
        let body = json!({"job_run": {"name": "job run"}});
        let response = client.post("/v2/jobs/j1/runs", &body, &[]).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(identity.calls(), 2);
        assert_eq!(client.token_manager().refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_second_401_inside_window_returns_original_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let identity = Arc::new(MockIdentityProvider::new());
        let client = client_with(&server, identity.clone());

        let first = client.get("/v2/assets/a", &[]).await.unwrap();
        assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
        // Initial token plus one failure-triggered refresh.
        assert_eq!(identity.calls(), 2);

        let second = client.get("/v2/assets/a", &[]).await.unwrap();
        assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(second.text(), "expired");
        assert_eq!(identity.calls(), 2);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_error_statuses_are_plain_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with(&server, Arc::new(MockIdentityProvider::new()));
        let response = client.get("/v2/jobs", &[]).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_search_uses_default_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/search"))
            .and(query_param("auth_scope", "category"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with(&server, Arc::new(MockIdentityProvider::new()));
        let response = client.search(&json!({"query": {"match_all": {}}}), None).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_shutdown_closes_pool() {
        let server = MockServer::start().await;
        let client = client_with(&server, Arc::new(MockIdentityProvider::new()));
        client.shutdown();

        let err = client.get("/v2/jobs", &[]).await.unwrap_err();
        assert_eq!(err, HttpError::Pool(PoolError::Closed));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // requests now fail with ECONNREFUSED
        let tokens = TokenManager::new(
            Arc::new(MockIdentityProvider::new()) as Arc<dyn IdentityProvider>,
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );
        let client =
            CpdClient::with_token_manager(&config(addr.to_string(), 1), Arc::new(tokens)).unwrap();

        let err = client.get("/v2/jobs", &[]).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_concurrent_requests_stay_within_pool() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(20)))
            .mount(&server)
            .await;

        let client = Arc::new(client_with(&server, Arc::new(MockIdentityProvider::new())));
        let calls: Vec<_> = (0..12)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    let response = client.get("/v2/jobs", &[]).await.unwrap();
                    assert!(client.pool_status().outstanding <= 4);
                    response.status()
                })
            })
            .collect();
        for call in calls {
            assert_eq!(call.await.unwrap(), StatusCode::OK);
        }

        let status = client.pool_status();
        assert_eq!(status.outstanding, 0);
        assert!(status.idle <= 4);
    }
}
