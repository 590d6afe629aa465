// # Direct Protection Client
//
// Talks to the AdGuard Home control API on the appliance itself, using
// static basic-auth credentials.
//
// ## Behavior
//
// - One HTTP request per call; the engine's poll interval is the retry
// - Per-request timeout from the endpoint configuration
// - Certificate validation is disabled: appliances sit on the local network
//   behind self-signed certificates
//
// ## Security Requirements
//
// - The password never appears in logs or Debug output
//
// ## API Reference
//
// - Read: `GET /control/status` -> `{"protection_enabled": bool, ...}`
// - Write (legacy): `POST /control/dns_config {"protection_enabled": bool}`
// - Write (newer): `POST /control/protection {"enabled": bool}`

use aghsync_core::config::{EndpointConfig, WriteEndpoint};
use aghsync_core::traits::{ClientFactory, ProtectionClient};
use aghsync_core::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// Direct-mode protection client
pub struct DirectClient {
    /// `scheme://host:port/control`
    control_url: String,

    username: String,

    /// ⚠️ NEVER log this value
    password: String,

    write_endpoint: WriteEndpoint,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for DirectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectClient")
            .field("control_url", &self.control_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("write_endpoint", &self.write_endpoint)
            .finish()
    }
}

impl DirectClient {
    /// Create a client for `config`
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            control_url: config.control_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            write_endpoint: config.write_endpoint,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.control_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.username.is_empty() && self.password.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| Error::unreachable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

/// Map a non-200 response to the failure taxonomy
fn status_error(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::unauthorized(format!("Credentials rejected. Status: {}", status))
        }
        s if s.is_server_error() => {
            Error::unreachable(format!("Appliance error (transient): {} - {}", status, body))
        }
        _ => Error::protocol(format!("Unexpected response: {} - {}", status, body)),
    }
}

/// Pull the protection flag out of a status document
fn protection_flag(status: &Value) -> Result<bool> {
    status
        .get("protection_enabled")
        .and_then(Value::as_bool)
        .ok_or_else(|| Error::protocol("Status response has no boolean protection_enabled"))
}

#[async_trait]
impl ProtectionClient for DirectClient {
    async fn read_status(&self) -> Result<bool> {
        let response = self.send(self.client.get(self.url("status"))).await?;

        let status: Value = response
            .json()
            .await
            .map_err(|e| Error::protocol(format!("Failed to parse status: {}", e)))?;

        protection_flag(&status)
    }

    async fn write_protection(&self, enabled: bool) -> Result<()> {
        let request = self
            .client
            .post(self.url(self.write_endpoint.path()))
            .json(&self.write_endpoint.body(enabled));

        self.send(request).await?;
        tracing::debug!("Protection set to {} via {}", enabled, self.write_endpoint.path());
        Ok(())
    }

    fn client_name(&self) -> &'static str {
        "direct"
    }
}

/// Factory for creating direct clients
pub struct DirectClientFactory;

impl ClientFactory for DirectClientFactory {
    fn create(&self, config: &EndpointConfig) -> Result<Box<dyn ProtectionClient>> {
        if config.router_mode {
            return Err(Error::config("Direct client cannot serve a router-mode endpoint"));
        }
        Ok(Box::new(DirectClient::new(config)?))
    }
}

/// Register the direct client with a registry
pub fn register(registry: &aghsync_core::ClientRegistry) {
    registry.register_client("direct", Box::new(DirectClientFactory));
}
