use std::env;

use chrono::Duration;
use log::*;
use paystack_tools::PaystackConfig;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use soko_common::Secret;
use soko_engine::se_api::auth_api::OtpSettings;

use crate::errors::ServerError;

const DEFAULT_SOKO_HOST: &str = "127.0.0.1";
const DEFAULT_SOKO_PORT: u16 = 8480;
/// 1.5% platform fee, in basis points.
const DEFAULT_FEE_BASIS_POINTS: i64 = 150;
const DEFAULT_DISPUTE_WINDOW: Duration = Duration::hours(48);
const DEFAULT_AUTO_COMPLETE_GRACE: Duration = Duration::hours(48);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 50;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Platform fee withheld from vendor sales, in basis points.
    pub fee_basis_points: i64,
    /// How long after delivery a buyer can raise a dispute. The auto-completion sweep uses
    /// its own grace period so deployments can keep the sweep slightly behind the window.
    pub dispute_window: Duration,
    pub auto_complete_grace: Duration,
    /// Bound of each event channel before producers start logging drops.
    pub event_buffer_size: usize,
    pub auth: AuthConfig,
    pub paystack: PaystackConfig,
    pub notifier: NotifierConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SOKO_HOST.to_string(),
            port: DEFAULT_SOKO_PORT,
            database_url: String::default(),
            fee_basis_points: DEFAULT_FEE_BASIS_POINTS,
            dispute_window: DEFAULT_DISPUTE_WINDOW,
            auto_complete_grace: DEFAULT_AUTO_COMPLETE_GRACE,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            auth: AuthConfig::default(),
            paystack: PaystackConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SOKO_HOST").ok().unwrap_or_else(|| DEFAULT_SOKO_HOST.into());
        let port = env::var("SOKO_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SOKO_PORT. {e} Using the default, {DEFAULT_SOKO_PORT}, \
                         instead."
                    );
                    DEFAULT_SOKO_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SOKO_PORT);
        let database_url = env::var("SOKO_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SOKO_DATABASE_URL is not set. Please set it to the URL for the Soko database.");
            String::default()
        });
        let fee_basis_points = env_i64("SOKO_FEE_BASIS_POINTS", DEFAULT_FEE_BASIS_POINTS);
        let dispute_window = env_hours("SOKO_DISPUTE_WINDOW_HOURS", DEFAULT_DISPUTE_WINDOW);
        let auto_complete_grace = env_hours("SOKO_AUTO_COMPLETE_HOURS", DEFAULT_AUTO_COMPLETE_GRACE);
        let event_buffer_size =
            env_i64("SOKO_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE as i64).unsigned_abs() as usize;
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to \
                 the default configuration."
            );
            AuthConfig::default()
        });
        let paystack = PaystackConfig::new_from_env_or_default();
        let notifier = NotifierConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            fee_basis_points,
            dispute_window,
            auto_complete_grace,
            event_buffer_size,
            auth,
            paystack,
            notifier,
        }
    }
}

fn env_i64(var: &str, default: i64) -> i64 {
    match env::var(var) {
        Ok(s) => s.parse::<i64>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn env_hours(var: &str, default: Duration) -> Duration {
    match env::var(var) {
        Ok(s) => s.parse::<i64>().map(Duration::hours).unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid hour count for {var}. {e} Using the default instead.");
            default
        }),
        Err(_) => default,
    }
}

//-----------------------------------------------  ServerOptions  ---------------------------------------------------

/// The subset of the server configuration that handlers need at request time. Kept small and
/// free of secrets so it can be dropped into the actix app data.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub fee_basis_points: i64,
    pub dispute_window: Duration,
    pub auto_complete_grace: Duration,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            fee_basis_points: config.fee_basis_points,
            dispute_window: config.dispute_window,
            auto_complete_grace: config.auto_complete_grace,
        }
    }
}

//-------------------------------------------------  AuthConfig  ----------------------------------------------------

/// Knobs for sessions and the OTP step-up flows. Everything except the pepper has a sane
/// default; the pepper MUST be set in production, since a random one invalidates all
/// outstanding codes on every restart.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub otp_pepper: Secret<String>,
    pub code_ttl: Duration,
    pub reissue_cooldown: Duration,
    pub max_attempts: i64,
    pub action_token_ttl: Duration,
    pub session_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let pepper: String = thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
        warn!(
            "🚨️🚨️🚨️ SOKO_OTP_PEPPER is not set. A random pepper was generated for this session. Any codes issued \
             before the last restart are now dead. If this is a production instance, you are doing it wrong! Set the \
             SOKO_OTP_PEPPER environment variable instead. 🚨️🚨️🚨️"
        );
        let defaults = OtpSettings::default();
        Self {
            otp_pepper: Secret::new(pepper),
            code_ttl: defaults.code_ttl,
            reissue_cooldown: defaults.reissue_cooldown,
            max_attempts: defaults.max_attempts,
            action_token_ttl: defaults.action_token_ttl,
            session_ttl: defaults.session_ttl,
        }
    }
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let pepper =
            env::var("SOKO_OTP_PEPPER").map_err(|e| ServerError::ConfigurationError(format!("{e} [SOKO_OTP_PEPPER]")))?;
        if pepper.len() < 16 {
            return Err(ServerError::ConfigurationError(
                "SOKO_OTP_PEPPER must be at least 16 characters long.".to_string(),
            ));
        }
        let defaults = OtpSettings::default();
        let session_ttl = env_hours("SOKO_SESSION_TTL_HOURS", defaults.session_ttl);
        Ok(Self {
            otp_pepper: Secret::new(pepper),
            code_ttl: defaults.code_ttl,
            reissue_cooldown: defaults.reissue_cooldown,
            max_attempts: defaults.max_attempts,
            action_token_ttl: defaults.action_token_ttl,
            session_ttl,
        })
    }

    /// The engine-side settings this configuration corresponds to.
    pub fn as_otp_settings(&self) -> OtpSettings {
        OtpSettings {
            pepper: self.otp_pepper.reveal().clone(),
            code_ttl: self.code_ttl,
            reissue_cooldown: self.reissue_cooldown,
            max_attempts: self.max_attempts,
            action_token_ttl: self.action_token_ttl,
            session_ttl: self.session_ttl,
        }
    }
}

//-----------------------------------------------  NotifierConfig  --------------------------------------------------

/// Endpoints for the SMS gateway and transactional email sender. A missing URL disables that
/// channel; the notifier logs and carries on, since in-app notifications are written either
/// way.
#[derive(Clone, Debug, Default)]
pub struct NotifierConfig {
    pub sms_url: Option<String>,
    pub sms_api_key: Secret<String>,
    pub email_url: Option<String>,
    pub email_api_key: Secret<String>,
    pub email_from: String,
}

impl NotifierConfig {
    pub fn from_env_or_default() -> Self {
        let sms_url = env::var("SOKO_SMS_API_URL").ok();
        if sms_url.is_none() {
            warn!("🪛️ SOKO_SMS_API_URL is not set. SMS delivery is disabled.");
        }
        let sms_api_key = Secret::new(env::var("SOKO_SMS_API_KEY").unwrap_or_default());
        let email_url = env::var("SOKO_EMAIL_API_URL").ok();
        if email_url.is_none() {
            warn!("🪛️ SOKO_EMAIL_API_URL is not set. Email delivery is disabled.");
        }
        let email_api_key = Secret::new(env::var("SOKO_EMAIL_API_KEY").unwrap_or_default());
        let email_from = env::var("SOKO_EMAIL_FROM").unwrap_or_else(|_| "no-reply@soko.example".to_string());
        Self { sms_url, sms_api_key, email_url, email_api_key, email_from }
    }
}
