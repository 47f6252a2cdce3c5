use blake2::{Blake2b512, Digest};
use rand::RngCore;

/// Mint an opaque bearer token (session or action token): 32 random bytes, hex encoded.
pub fn new_auth_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

/// The digest we store in place of a token. Tokens are high-entropy, so a plain keyless hash
/// is enough to make a leaked database useless for session forgery.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(token.as_bytes());
    to_hex(&hasher.finalize())
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
