// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Caller identity.

mod service;
pub mod session;
pub mod token_generator;

pub use service::IdentityProvider;
pub use session::{IdentityRecord, TokenIdentityProvider};
pub use token_generator::bearer_token;
