use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::http::{HttpError, RetryPolicy, get_json_with_bearer};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingToken,
    #[error("token rejected by userinfo endpoint")]
    Rejected,
    #[error("user is not on the allow list")]
    NotAllowed,
    #[error("userinfo endpoint unavailable: {0}")]
    Unavailable(String),
}

/// Verified userinfo keyed by token, each entry valid for `ttl`.
pub struct AuthCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl AuthCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, token: &str) -> Option<Value> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(token) {
            Some((verified_at, user)) if verified_at.elapsed() < self.ttl => Some(user.clone()),
            Some(_) => {
                entries.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, token: &str, user: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (verified_at, _)| verified_at.elapsed() < self.ttl);
            entries.insert(token.to_string(), (Instant::now(), user));
        }
    }
}

/// Checks bearer tokens against the OAuth userinfo endpoint and the phone
/// number allow list. Blocking; call from a blocking context.
pub struct Authenticator {
    config: AuthConfig,
    cache: AuthCache,
    policy: RetryPolicy,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Self {
        let cache = AuthCache::new(config.cache_ttl);
        Self {
            config,
            cache,
            policy: RetryPolicy::default(),
        }
    }

    pub fn verify(&self, authorization: Option<&str>) -> Result<Value, AuthError> {
        if self.config.dev {
            return Ok(json!({}));
        }

        let token = authorization
            .map(strip_bearer)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        if let Some(user) = self.cache.get(token) {
            debug!("authorization served from cache");
            return Ok(user);
        }

        let url = self
            .config
            .userinfo_url
            .as_deref()
            .ok_or_else(|| AuthError::Unavailable("no userinfo endpoint configured".into()))?;

        let user = match get_json_with_bearer(url, token, self.policy) {
            Ok(user) => user,
            Err(HttpError::Status { status, .. }) => {
                debug!(status, "userinfo rejected token");
                return Err(AuthError::Rejected);
            }
            Err(err) => {
                warn!(error = %err, "userinfo request failed");
                return Err(AuthError::Unavailable(err.to_string()));
            }
        };

        let phone = user.get("phone_number").and_then(Value::as_str);
        if !phone.is_some_and(|phone| self.config.allowed_numbers.iter().any(|n| n == phone)) {
            warn!(phone = phone.unwrap_or("<none>"), "user not on allow list");
            return Err(AuthError::NotAllowed);
        }

        self.cache.insert(token, user.clone());
        Ok(user)
    }
}

/// Clients send either the bare token or `Bearer <token>`.
fn strip_bearer(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.split_once(char::is_whitespace) {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => raw,
    }
}
