// ============================
// crates/backend-lib/src/auth/session.rs
// ============================
//! Anonymous bearer token registry.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use metrics::counter;
use roulette_common::{AnonymousSession, Uid};
use tracing::debug;
use uuid::Uuid;

use super::service::IdentityProvider;
use super::token_generator::bearer_token;
use crate::metrics::IDENTITY_ISSUED;

/// Identity bound to a token
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub uid: Uid,
    pub expires_at: DateTime<Utc>,
}

/// In-memory token store; every issued token gets a fresh uid
pub struct TokenIdentityProvider {
    tokens: DashMap<String, IdentityRecord>,
    ttl: TimeDelta,
}

impl TokenIdentityProvider {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<Uid> {
        let record = self.tokens.get(token)?;
        (now < record.expires_at).then(|| record.uid.clone())
    }

    fn purge_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, record| now < record.expires_at);
        before.saturating_sub(self.tokens.len())
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentityProvider {
    async fn issue_anonymous(&self) -> AnonymousSession {
        let uid = Uuid::new_v4().to_string();
        let token = bearer_token();
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.tokens.insert(
            token.clone(),
            IdentityRecord {
                uid: uid.clone(),
                expires_at,
            },
        );
        counter!(IDENTITY_ISSUED).increment(1);
        debug!(uid, "anonymous identity issued");
        AnonymousSession { uid, token }
    }

    async fn verify(&self, token: &str) -> Option<Uid> {
        self.verify_at(token, Utc::now())
    }

    async fn purge_expired(&self) -> usize {
        self.purge_at(Utc::now())
    }
}
