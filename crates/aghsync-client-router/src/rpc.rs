//! JSON-RPC plumbing for the router management plane
//!
//! Every call is a `POST /rpc` with the envelope
//! `{"jsonrpc": "2.0", "method": ..., "params": ..., "id": 0}`. Success
//! carries `result`; failure omits it and carries `error.message`.

use aghsync_core::{Error, Result};
use md5::{Digest, Md5};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error code the router uses for a rejected session
pub const ACCESS_DENIED_CODE: i64 = -32000;

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u32,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

impl RpcError {
    fn into_error(self, method: &str) -> Error {
        if self.code == Some(ACCESS_DENIED_CODE) || self.message.contains("Access denied") {
            Error::unauthorized(format!("{} rejected: {}", method, self.message))
        } else {
            Error::protocol(format!("{} failed: {}", method, self.message))
        }
    }
}

/// Result of the `challenge` call
#[derive(Debug, Clone, Deserialize)]
pub struct Challenge {
    /// Password-hashing scheme id; the router sends a number, some firmware a string
    pub alg: Value,
    pub salt: String,
    pub nonce: String,
}

/// Result of the `login` call
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
    pub sid: String,
}

/// Result of `call [sid, "adguardhome", "get_config"]`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AdGuardConfig {
    pub enabled: bool,
    pub dns_enabled: bool,
}

impl AdGuardConfig {
    /// Protection counts as on only when the service and its DNS hook both are
    pub fn protection_enabled(&self) -> bool {
        self.enabled && self.dns_enabled
    }
}

/// Derive the login credential from a challenge
///
/// `hex(md5(username ":" crypt(password, "$alg$salt$") ":" nonce))`
pub fn login_hash(username: &str, password: &str, challenge: &Challenge) -> Result<String> {
    let alg = match &challenge.alg {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(Error::protocol(format!(
                "Challenge has unusable alg: {}",
                other
            )));
        }
    };

    let setting = format!("${}${}$", alg, challenge.salt);
    let cipher = pwhash::unix::crypt(password, &setting).map_err(|e| {
        Error::protocol(format!("Unsupported password scheme ${}$: {}", alg, e))
    })?;

    Ok(md5_hex(&format!("{}:{}:{}", username, cipher, challenge.nonce)))
}

fn md5_hex(data: &str) -> String {
    format!("{:x}", Md5::digest(data.as_bytes()))
}

/// Router RPC endpoint
#[derive(Debug, Clone)]
pub struct RpcEndpoint {
    url: String,
    client: reqwest::Client,
}

impl RpcEndpoint {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC call and decode its `result`
    pub async fn call<P, T>(&self, method: &str, params: P) -> Result<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 0,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::unreachable(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::unauthorized(format!("{} rejected. Status: {}", method, status))
                }
                s if s.is_server_error() => {
                    Error::unreachable(format!("Router error (transient): {}", status))
                }
                _ => Error::protocol(format!("{} failed. Status: {}", method, status)),
            });
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::protocol(format!("Failed to parse {} response: {}", method, e)))?;

        match (envelope.result, envelope.error) {
            (Some(result), _) if !result.is_null() => serde_json::from_value(result)
                .map_err(|e| Error::protocol(format!("Unexpected {} result: {}", method, e))),
            (_, Some(error)) => Err(error.into_error(method)),
            _ => Err(Error::protocol(format!("{} returned no result", method))),
        }
    }
}
