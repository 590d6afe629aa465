//! Router session management
//!
//! ```text
//! NoSession ──get_session──▶ Authenticating ──ok──▶ Authenticated
//!     ▲                            │                     │
//!     └─────────── error ──────────┘       TTL / Unauthorized
//!     ▲                                                  │
//!     └──────────────────────────────────────────────────┘
//! ```
//!
//! The session lives behind an async mutex that is held for the whole
//! login, so concurrent callers wait for one login and share its result.
//! Expiry is checked on access rather than by a background timer.

use crate::rpc::{Challenge, LoginResult, RpcEndpoint, login_hash};
use aghsync_core::Result;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Session lifetime used by the router's web UI
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(4 * 60);

/// Username the router expects at the login step
const LOGIN_USER: &str = "root";

#[derive(Debug)]
struct Session {
    sid: String,
    expires_at: Instant,
}

/// Cached router session with single-flight login
pub struct SessionManager {
    rpc: RpcEndpoint,
    username: String,
    password: String,
    ttl: Duration,
    session: Mutex<Option<Session>>,
    epoch: AtomicU64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("rpc", &self.rpc.url())
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("ttl", &self.ttl)
            .field("epoch", &self.epoch())
            .finish()
    }
}

impl SessionManager {
    pub fn new(
        rpc: RpcEndpoint,
        username: impl Into<String>,
        password: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            rpc,
            username: username.into(),
            password: password.into(),
            ttl,
            session: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Number of successful logins so far
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Whether a non-expired session is cached
    pub async fn is_authenticated(&self) -> bool {
        matches!(&*self.session.lock().await, Some(s) if Instant::now() < s.expires_at)
    }

    /// Return the cached session id, logging in first if there is none
    pub async fn get_session(&self) -> Result<String> {
        let mut session = self.session.lock().await;

        if let Some(current) = session.as_ref() {
            if Instant::now() < current.expires_at {
                return Ok(current.sid.clone());
            }
            debug!("Router session expired");
        }
        *session = None;

        let sid = self.login().await?;
        *session = Some(Session {
            sid: sid.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        self.epoch.fetch_add(1, Ordering::AcqRel);

        Ok(sid)
    }

    /// Drop the cached session if it is still `sid`
    ///
    /// A session obtained by another caller in the meantime is kept.
    pub async fn invalidate(&self, sid: &str) {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| s.sid == sid) {
            debug!("Router session rejected, clearing");
            *session = None;
        }
    }

    async fn login(&self) -> Result<String> {
        let challenge: Challenge = self
            .rpc
            .call("challenge", json!({ "username": self.username }))
            .await?;

        let hash = login_hash(&self.username, &self.password, &challenge)?;

        let login: LoginResult = self
            .rpc
            .call("login", json!({ "username": LOGIN_USER, "hash": hash }))
            .await?;

        debug!("Router login succeeded");
        Ok(login.sid)
    }
}
