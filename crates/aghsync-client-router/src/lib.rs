// # Router Protection Client
//
// Reaches AdGuard Home through a GL.iNet router's JSON-RPC management plane.
//
// ## Flow
//
// 1. `challenge {username}` -> `{alg, salt, nonce}`
// 2. `login {username: "root", hash}` -> `{sid}` (cached for the session TTL)
// 3. `call [sid, "adguardhome", "get_config"]` -> `{enabled, dns_enabled}`
// 4. `call [sid, "adguardhome", "set_config", {enabled: true, dns_enabled}]`
//
// An Unauthorized answer to step 3 or 4 clears the cached session so the
// next call logs in again instead of reusing a dead id.
//
// ## Security Requirements
//
// - The password never appears in logs or Debug output
// - Certificate validation is disabled (self-signed router certificates)

pub mod rpc;
pub mod session;

use aghsync_core::config::EndpointConfig;
use aghsync_core::traits::{ClientFactory, ProtectionClient};
use aghsync_core::{Error, Result};
use async_trait::async_trait;
use rpc::{AdGuardConfig, RpcEndpoint};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use session::SessionManager;
use std::time::Duration;

pub use session::DEFAULT_SESSION_TTL;

/// Router module hosting AdGuard Home
const ADGUARD_MODULE: &str = "adguardhome";

/// Router-mode protection client
#[derive(Debug)]
pub struct RouterClient {
    rpc: RpcEndpoint,
    sessions: SessionManager,
}

impl RouterClient {
    /// Create a client for `config`
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        Self::with_session_ttl(config, config.session_ttl())
    }

    /// Create a client with an explicit session lifetime
    pub fn with_session_ttl(config: &EndpointConfig, ttl: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let rpc = RpcEndpoint::new(config.rpc_url(), client);
        let sessions = SessionManager::new(
            rpc.clone(),
            config.username.clone(),
            config.password.clone(),
            ttl,
        );

        Ok(Self { rpc, sessions })
    }

    /// The session manager
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    async fn call_adguard<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Option<Value>,
    ) -> Result<T> {
        let sid = self.sessions.get_session().await?;

        let mut params = vec![json!(sid), json!(ADGUARD_MODULE), json!(method)];
        params.extend(args);

        let result = self.rpc.call("call", params).await;
        if let Err(e) = &result {
            if e.is_unauthorized() {
                self.sessions.invalidate(&sid).await;
            }
        }
        result
    }
}

#[async_trait]
impl ProtectionClient for RouterClient {
    async fn read_status(&self) -> Result<bool> {
        let config: AdGuardConfig = self.call_adguard("get_config", None).await?;
        tracing::trace!(
            "Router reports AdGuard {} / DNS {}",
            config.enabled,
            config.dns_enabled
        );
        Ok(config.protection_enabled())
    }

    async fn write_protection(&self, enabled: bool) -> Result<()> {
        let args = json!({ "enabled": true, "dns_enabled": enabled });
        let _: IgnoredAny = self.call_adguard("set_config", Some(args)).await?;
        tracing::debug!("Protection set to {} via router", enabled);
        Ok(())
    }

    fn session_epoch(&self) -> u64 {
        self.sessions.epoch()
    }

    fn client_name(&self) -> &'static str {
        "router"
    }
}

/// Factory for creating router clients
pub struct RouterClientFactory;

impl ClientFactory for RouterClientFactory {
    fn create(&self, config: &EndpointConfig) -> Result<Box<dyn ProtectionClient>> {
        if !config.router_mode {
            return Err(Error::config("Router client requires a router-mode endpoint"));
        }
        Ok(Box::new(RouterClient::new(config)?))
    }
}

/// Register the router client with a registry
pub fn register(registry: &aghsync_core::ClientRegistry) {
    registry.register_client("router", Box::new(RouterClientFactory));
}
