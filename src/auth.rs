// src/auth.rs
use crate::error::{AppError, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";
const SESSION_TTL_SECS: i64 = 24 * 60 * 60;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Session(format!("failed to hash password: {}", e)))
}

/// False for a wrong password and for a hash that cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    sid: String,
    exp: usize,
}

#[derive(Debug, Clone)]
struct SessionData {
    user_id: i64,
    flash: Option<String>,
    expires_at: i64,
}

impl SessionData {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// Server-side sessions. The cookie holds a signed token naming a live session id;
/// removing the id from the store revokes the cookie.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionStore {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Starts a session for `user_id` and returns the signed cookie value.
    /// Expired sessions are dropped on the way in.
    pub async fn start(&self, user_id: i64) -> Result<String> {
        let now = Utc::now().timestamp();
        let expires_at = now + SESSION_TTL_SECS;
        let sid = Uuid::new_v4().to_string();
        let claims = Claims {
            sub: user_id,
            sid: sid.clone(),
            exp: expires_at as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Session(format!("failed to sign session: {}", e)))?;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, data| data.is_live(now));
        if sessions.len() < before {
            debug!("Pruned {} expired sessions", before - sessions.len());
        }
        sessions.insert(
            sid,
            SessionData {
                user_id,
                flash: None,
                expires_at,
            },
        );
        Ok(token)
    }

    /// The user id behind a cookie, if the token verifies and its session is live.
    pub async fn user_for(&self, token: &str) -> Option<i64> {
        let claims = self.claims(token)?;
        let sessions = self.sessions.read().await;
        sessions
            .get(&claims.sid)
            .filter(|data| data.user_id == claims.sub && data.is_live(Utc::now().timestamp()))
            .map(|data| data.user_id)
    }

    pub async fn end(&self, token: &str) {
        if let Some(claims) = self.claims(token) {
            self.sessions.write().await.remove(&claims.sid);
        }
    }

    pub async fn set_flash(&self, token: &str, message: impl Into<String>) {
        if let Some(claims) = self.claims(token) {
            if let Some(data) = self.sessions.write().await.get_mut(&claims.sid) {
                data.flash = Some(message.into());
            }
        }
    }

    /// Returns and clears the pending flash message.
    pub async fn take_flash(&self, token: &str) -> Option<String> {
        let claims = self.claims(token)?;
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&claims.sid)?.flash.take()
    }

    fn claims(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .ok()
    }
}

pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    )
}

pub fn expired_session_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-hash"));
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let store = SessionStore::new(b"test-secret");
        let token = store.start(7).await.unwrap();
        assert_eq!(store.user_for(&token).await, Some(7));

        store.set_flash(&token, "Bought 1 shares of IBM").await;
        assert_eq!(store.take_flash(&token).await.as_deref(), Some("Bought 1 shares of IBM"));
        assert_eq!(store.take_flash(&token).await, None);

        store.end(&token).await;
        assert_eq!(store.user_for(&token).await, None);
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped_on_start() {
        let store = SessionStore::new(b"test-secret");
        let live = store.start(1).await.unwrap();
        store.sessions.write().await.insert(
            "stale".to_string(),
            SessionData {
                user_id: 9,
                flash: None,
                expires_at: Utc::now().timestamp() - 1,
            },
        );
        assert_eq!(store.sessions.read().await.len(), 2);

        store.start(2).await.unwrap();
        let sessions = store.sessions.read().await;
        assert_eq!(sessions.len(), 2);
        assert!(!sessions.contains_key("stale"));
        drop(sessions);
        assert_eq!(store.user_for(&live).await, Some(1));
    }

    #[tokio::test]
    async fn expired_session_is_not_honoured() {
        let store = SessionStore::new(b"test-secret");
        let token = store.start(3).await.unwrap();
        for data in store.sessions.write().await.values_mut() {
            data.expires_at = Utc::now().timestamp() - 1;
        }
        assert_eq!(store.user_for(&token).await, None);
    }

    #[tokio::test]
    async fn foreign_tokens_are_rejected() {
        let ours = SessionStore::new(b"ours");
        let theirs = SessionStore::new(b"theirs");
        let token = theirs.start(1).await.unwrap();
        assert_eq!(ours.user_for(&token).await, None);
        assert_eq!(ours.user_for("garbage").await, None);
    }
}
