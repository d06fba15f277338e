//! Admin login sessions
//!
//! A successful login yields an opaque UUID v4 token; the token stays valid
//! until logout or process restart.

use std::collections::HashSet;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Shared-secret check plus the set of live session tokens
#[derive(Debug)]
pub struct SessionStore {
    admin_secret: String,
    tokens: RwLock<HashSet<Uuid>>,
}

impl SessionStore {
    pub fn new(admin_secret: impl Into<String>) -> Self {
        Self {
            admin_secret: admin_secret.into(),
            tokens: RwLock::new(HashSet::new()),
        }
    }

    /// Issue a token if `secret` matches the configured admin secret
    pub async fn login(&self, secret: &str) -> Option<Uuid> {
        if secret != self.admin_secret {
            return None;
        }

        let token = Uuid::new_v4();
        self.tokens.write().await.insert(token);
        Some(token)
    }

    /// Invalidate a token; returns whether it was live
    pub async fn logout(&self, token: &Uuid) -> bool {
        self.tokens.write().await.remove(token)
    }

    pub async fn is_valid(&self, token: &Uuid) -> bool {
        self.tokens.read().await.contains(token)
    }
}

/// Token from an `Authorization: Bearer <uuid>` header value
pub fn parse_bearer(header: &str) -> Option<Uuid> {
    let token = header.strip_prefix("Bearer ")?;
    Uuid::parse_str(token.trim()).ok()
}
