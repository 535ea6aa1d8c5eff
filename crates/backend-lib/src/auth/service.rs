use async_trait::async_trait;
use roulette_common::{AnonymousSession, Uid};

/// Resolves bearer tokens to caller identities
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Issue a fresh anonymous identity and its token
    async fn issue_anonymous(&self) -> AnonymousSession;
    /// Uid behind `token`, if it is known and unexpired
    async fn verify(&self, token: &str) -> Option<Uid>;
    /// Forget expired tokens; returns how many were dropped
    async fn purge_expired(&self) -> usize;
}
