use chrono::Utc;
use rand::Rng;

/// Mint a public order id, e.g. `ORD-1724580000-a41bc9`.
pub fn new_order_id() -> String {
    let tag: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("ORD-{}-{tag:06x}", Utc::now().timestamp())
}

/// Mint a payout reference, e.g. `PYT-1724580000-9f2ab310`. References identify one provider
/// attempt, so retries mint a new one rather than reusing the old.
pub fn new_payout_reference() -> String {
    let tag: u32 = rand::thread_rng().gen();
    format!("PYT-{}-{tag:08x}", Utc::now().timestamp())
}
