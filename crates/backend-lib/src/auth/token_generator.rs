// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
//! Random material for bearer tokens.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

/// Entropy per bearer token (256 bits)
const TOKEN_BYTES: usize = 32;

/// Fresh URL-safe bearer token from OS entropy
pub fn bearer_token() -> String {
    random_urlsafe(TOKEN_BYTES)
}

fn random_urlsafe(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}
