use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{db_types::OtpPurpose, helpers::tokens::to_hex};

type HmacSha256 = Hmac<Sha256>;

/// A fresh six-digit code, zero-padded.
pub fn generate_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{code:06}")
}

/// The keyed digest of a code that gets stored. The user id and purpose are bound into the
/// MAC, so a code issued to one user for one purpose never verifies anywhere else, and the
/// server-side pepper means database access alone is not enough to forge codes offline.
pub fn code_digest(pepper: &str, user_id: i64, purpose: OtpPurpose, code: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(pepper.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{user_id}:{purpose}:{code}").as_bytes());
    to_hex(&mac.finalize().into_bytes())
}

/// Constant-time digest comparison.
pub fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
