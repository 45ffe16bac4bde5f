//! Server-side session store.
//!
//! A session maps an opaque random token, carried in the `parlor_session`
//! cookie, to the [`SessionUser`] that logged in. Sessions live in memory
//! and expire after a fixed TTL; a background loop sweeps the stale ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use rand::RngCore;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::info;

use parlor_types::models::SessionUser;

/// Name of the cookie holding the session token.
pub const SESSION_COOKIE: &str = "parlor_session";

struct SessionRecord {
    user: SessionUser,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Start a session for `user`. Returns the new token.
    pub async fn create(&self, user: SessionUser) -> String {
        let token = new_token();
        let record = SessionRecord {
            user,
            expires_at: Instant::now() + self.ttl,
        };
        self.sessions.write().await.insert(token.clone(), record);
        token
    }

    /// Resolve a token. Expired sessions are removed and resolve to `None`.
    pub async fn get(&self, token: &str) -> Option<SessionUser> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(record) if record.expires_at > Instant::now() => {
                    return Some(record.user.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().await.remove(token);
        None
    }

    /// Resolve the session named by the request's cookie, if any.
    pub async fn current_user(&self, jar: &CookieJar) -> Option<SessionUser> {
        let cookie = jar.get(SESSION_COOKIE)?;
        self.get(cookie.value()).await
    }

    /// Destroy a session. Returns whether it existed.
    pub async fn destroy(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.expires_at > now);
        before - sessions.len()
    }

    /// Background task that sweeps expired sessions on an interval.
    pub async fn run_purge_loop(self, every: Duration) {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;

            let count = self.purge_expired().await;
            if count > 0 {
                info!("Session sweep: removed {} expired sessions", count);
            }
        }
    }
}

/// Cookie that carries a freshly created session token.
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Cookie that clears the session token in the browser.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    B64.encode(bytes)
}
