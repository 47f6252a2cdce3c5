use hmac::{Hmac, Mac};
use sha2::Sha512;

/// The signature Paystack attaches to webhook deliveries: HMAC-SHA512 over the raw body,
/// keyed with the account secret, hex encoded.
pub fn paystack_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod test {
    use super::paystack_signature;

    #[test]
    fn signature_is_hex_sha512() {
        let sig = paystack_signature("sk_test_secret", br#"{"event":"transfer.success"}"#);
        assert_eq!(sig.len(), 128);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_depends_on_the_key() {
        let body = br#"{"event":"transfer.failed"}"#;
        assert_ne!(paystack_signature("key-one", body), paystack_signature("key-two", body));
    }
}
