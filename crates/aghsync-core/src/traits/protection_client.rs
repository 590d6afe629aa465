// # Protection Client Trait
//
// Defines the interface for reading and writing the appliance's protection
// flag.
//
// ## Implementations
//
// - Direct HTTP control API: `aghsync-client-direct` crate
// - Router JSON-RPC plane: `aghsync-client-router` crate
//
// ## Usage
//
// ```rust,ignore
// use aghsync_core::ProtectionClient;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let client = /* ProtectionClient implementation */;
//
//     if !client.read_status().await? {
//         client.write_protection(true).await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

/// Trait for remote control clients
///
/// A client carries transport configuration and, in router mode, a cached
/// session. It never touches [`DeviceState`](crate::DeviceState); callers
/// update state from the returned result.
///
/// # Failure taxonomy
///
/// - [`Error::Unreachable`](crate::Error::Unreachable): network error or timeout
/// - [`Error::Unauthorized`](crate::Error::Unauthorized): credentials or session rejected
/// - [`Error::Protocol`](crate::Error::Protocol): response did not have the expected shape
///
/// # No retries
///
/// Implementations perform a single attempt per call. The reconciliation
/// engine's next poll tick is the retry.
#[async_trait]
pub trait ProtectionClient: Send + Sync {
    /// Whether protection is currently enabled on the appliance
    async fn read_status(&self) -> Result<bool, crate::Error>;

    /// Ask the appliance to enable or disable protection
    async fn write_protection(&self, enabled: bool) -> Result<(), crate::Error>;

    /// Number of successful logins performed so far
    ///
    /// The engine compares this across polls to spot failures that directly
    /// follow a re-authentication. Clients without sessions keep the default.
    fn session_epoch(&self) -> u64 {
        0
    }

    /// Client name (for logging/debugging), e.g. "direct" or "router"
    fn client_name(&self) -> &'static str;
}

/// Helper trait for constructing protection clients from configuration
pub trait ClientFactory: Send + Sync {
    /// Create a ProtectionClient for the given endpoint
    fn create(
        &self,
        config: &crate::config::EndpointConfig,
    ) -> Result<Box<dyn ProtectionClient>, crate::Error>;
}
