use log::*;
use soko_common::Secret;

pub const DEFAULT_PAYSTACK_API_URL: &str = "https://api.paystack.co";

#[derive(Debug, Clone, Default)]
pub struct PaystackConfig {
    pub api_url: String,
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
}

impl PaystackConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("PAYSTACK_API_URL").unwrap_or_else(|_| {
            debug!("PAYSTACK_API_URL not set, using {DEFAULT_PAYSTACK_API_URL}");
            DEFAULT_PAYSTACK_API_URL.to_string()
        });
        let secret_key = Secret::new(std::env::var("PAYSTACK_SECRET_KEY").unwrap_or_else(|_| {
            warn!("PAYSTACK_SECRET_KEY not set, using (probably useless) default");
            "sk_test_00000000000000".to_string()
        }));
        // Paystack signs webhook events with the account secret key, but keeping a separate
        // variable lets deployments route events through a relay with its own key.
        let webhook_secret = Secret::new(std::env::var("PAYSTACK_WEBHOOK_SECRET").unwrap_or_else(|_| {
            std::env::var("PAYSTACK_SECRET_KEY").unwrap_or_else(|_| {
                warn!("PAYSTACK_WEBHOOK_SECRET not set, using (probably useless) default");
                "sk_test_00000000000000".to_string()
            })
        }));
        Self { api_url, secret_key, webhook_secret }
    }
}
