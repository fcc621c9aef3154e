//! CPD REST endpoints used by the batch engine
//!
//! - **[`identity`]**: token issuance for the token manager
//! - **[`jobs`]**: job run submission and polling ([`JobRunApi`](cpdbatch_core::jobs::JobRunApi))
//! - **[`catalog`]**: asset search, relationships and job creation
//!   ([`JobCatalog`](cpdbatch_core::catalog::JobCatalog))

pub mod catalog;
pub mod identity;
pub mod jobs;

pub use catalog::CatalogApi;
pub use identity::CpdIdentityProvider;
pub use jobs::JobsApi;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use cpdbatch_common::auth::{IdentityProvider, TokenManager};
    use cpdbatch_common::testing::MockIdentityProvider;
    use cpdbatch_domain::ClientConfig;
    use wiremock::MockServer;

    use crate::http::CpdClient;

    /// Client against `server` whose tokens come from a mock identity
    /// provider (`token-1`, `token-2`, ...).
    pub(crate) fn client_for(server: &MockServer) -> Arc<CpdClient> {
        let config = ClientConfig {
            scheme: "http".into(),
            host: server.address().to_string(),
            username: "admin".into(),
            password: Some("pw".into()),
            pool_size: 2,
            initial_pool_size: Some(1),
            ..ClientConfig::default()
        };
        let tokens = TokenManager::new(
            Arc::new(MockIdentityProvider::new()) as Arc<dyn IdentityProvider>,
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );
        match CpdClient::with_token_manager(&config, Arc::new(tokens)) {
            Ok(client) => Arc::new(client),
            Err(err) => panic!("test client: {err}"),
        }
    }
}
