//! Mocked key-distribution endpoint
//!
//! Serves a JWKS document from a wiremock server. The published key set can
//! be swapped mid-test to simulate rotation at the identity provider.

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the JWKS document is served on.
pub const JWKS_PATH: &str = "/realms/pms/protocol/openid-connect/certs";

/// A running mock JWKS endpoint.
pub struct MockJwks {
    server: MockServer,
}

impl MockJwks {
    /// Start serving `keys` as `{"keys": [...]}`.
    pub async fn start(keys: Vec<Value>) -> Self {
        let server = MockServer::start().await;
        mount_keys(&server, keys).await;
        Self { server }
    }

    /// Full URL of the JWKS document.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Replace the published key set.
    pub async fn rotate(&self, keys: Vec<Value>) {
        self.server.reset().await;
        mount_keys(&self.server, keys).await;
    }

    /// Make the endpoint fail with `status` until the next [`MockJwks::rotate`].
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of JWKS fetches received since the last reset.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

async fn mount_keys(server: &MockServer, keys: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
        .mount(server)
        .await;
}
