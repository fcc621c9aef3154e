//! One pooled HTTP session: a reqwest client bound to the cluster base URL
//! plus the headers sent with every request.

use std::time::Duration;

use cpdbatch_domain::ClientConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder};
use tracing::debug;
use url::Url;

use super::client::HttpError;
use super::pool::{ManageConnection, PoolError};

/// Transport settings shared by every connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub accept_invalid_certs: bool,
    pub user_agent: String,
}

impl From<&ClientConfig> for ConnectionSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            accept_invalid_certs: config.accept_invalid_certs,
            user_agent: concat!("cpdbatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP session with per-session headers.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    client: ReqwestClient,
    base_url: Url,
    headers: HeaderMap,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Attach `token` as the bearer credential for following requests.
    ///
    /// # Errors
    /// Returns [`HttpError::InvalidRequest`] if the token is not a valid
    /// header value.
    pub fn set_bearer(&mut self, token: &str) -> Result<(), HttpError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            HttpError::InvalidRequest(format!("token is not a valid header value: {e}"))
        })?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    pub fn clear_authorization(&mut self) {
        self.headers.remove(AUTHORIZATION);
    }

    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.headers.get(AUTHORIZATION)
    }

    /// Request builder for `path` (relative to the base URL) carrying the
    /// session headers.
    ///
    /// # Errors
    /// Returns [`HttpError::InvalidRequest`] if `path` does not form a URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, HttpError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| HttpError::InvalidRequest(format!("invalid path {path}: {e}")))?;
        Ok(self.client.request(method, url).headers(self.headers.clone()))
    }
}

/// Opens [`Connection`]s against one cluster.
#[derive(Debug)]
pub struct HttpConnectionManager {
    base_url: Url,
    settings: ConnectionSettings,
    next_id: std::sync::atomic::AtomicU64,
}

impl HttpConnectionManager {
    /// # Errors
    /// Returns [`PoolError::Connect`] if `base_url` is not a valid URL.
    pub fn new(base_url: &str, settings: ConnectionSettings) -> Result<Self, PoolError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| PoolError::Connect(format!("invalid base URL {base_url}: {e}")))?;
        // `Url::join` replaces the last segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url, settings, next_id: std::sync::atomic::AtomicU64::new(0) })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl ManageConnection for HttpConnectionManager {
    type Connection = Connection;

    fn connect(&self) -> Result<Connection, PoolError> {
        let mut builder = ReqwestClient::builder()
            .connect_timeout(self.settings.connect_timeout)
            .read_timeout(self.settings.read_timeout)
            .user_agent(self.settings.user_agent.clone())
            .no_proxy();
        if self.settings.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(|e| PoolError::Connect(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        debug!(connection_id = id, base_url = %self.base_url, "connection created");
        Ok(Connection { id, client, base_url: self.base_url.clone(), headers })
    }

    fn reset(&self, conn: &mut Connection) {
        conn.clear_authorization();
    }
}
