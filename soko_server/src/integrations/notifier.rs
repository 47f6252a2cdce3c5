//! Outbound notifications.
//!
//! The engine publishes events; this module turns them into in-app notification rows, SMS
//! messages and emails. Delivery failures are logged and swallowed. A missed text must never
//! fail or roll back the state change that triggered it.

use log::*;
use reqwest::Client;
use serde_json::json;
use soko_common::Secret;
use soko_engine::{
    db_types::{NewNotification, OtpPurpose},
    events::{
        DisputeMessageEvent,
        DisputeOpenedEvent,
        DisputeSettledEvent,
        OrderDeliveredEvent,
        OtpIssuedEvent,
        PayoutUpdatedEvent,
    },
    traits::AccountManagement,
    SqliteDatabase,
};

use crate::config::NotifierConfig;
use crate::errors::ServerError;

/// A thin client for the SMS gateway. `None` url means the channel is disabled.
#[derive(Clone)]
struct SmsClient {
    client: Client,
    url: Option<String>,
    api_key: Secret<String>,
}

impl SmsClient {
    async fn send(&self, to: &str, message: &str) {
        let Some(url) = &self.url else {
            debug!("📬️ SMS delivery is disabled. Dropping message to {to}");
            return;
        };
        let body = json!({ "to": to, "message": message });
        let result = self
            .client
            .post(url)
            .bearer_auth(self.api_key.reveal())
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => debug!("📬️ SMS sent to {to}"),
            Err(e) => warn!("📬️ Could not deliver SMS to {to}: {e}"),
        }
    }
}

/// A thin client for the transactional email sender.
#[derive(Clone)]
struct EmailClient {
    client: Client,
    url: Option<String>,
    api_key: Secret<String>,
    from: String,
}

impl EmailClient {
    async fn send(&self, to: &str, subject: &str, body: &str) {
        let Some(url) = &self.url else {
            debug!("📬️ Email delivery is disabled. Dropping \"{subject}\" to {to}");
            return;
        };
        let payload = json!({ "from": self.from, "to": to, "subject": subject, "body": body });
        let result = self
            .client
            .post(url)
            .bearer_auth(self.api_key.reveal())
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => debug!("📬️ Email \"{subject}\" sent to {to}"),
            Err(e) => warn!("📬️ Could not deliver email to {to}: {e}"),
        }
    }
}

/// Fans engine events out to in-app notifications, SMS and email. Cheap to clone; one clone
/// is captured per event hook.
#[derive(Clone)]
pub struct Notifier {
    db: SqliteDatabase,
    sms: SmsClient,
    email: EmailClient,
}

impl Notifier {
    pub fn new(config: NotifierConfig, db: SqliteDatabase) -> Result<Self, ServerError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not build notifier HTTP client. {e}")))?;
        let sms = SmsClient { client: client.clone(), url: config.sms_url, api_key: config.sms_api_key };
        let email = EmailClient {
            client,
            url: config.email_url,
            api_key: config.email_api_key,
            from: config.email_from,
        };
        Ok(Self { db, sms, email })
    }

    /// Write an in-app notification row, logging rather than propagating failures.
    async fn notify_in_app(&self, user_id: i64, event: &str, body: String) {
        let notification = NewNotification::new(user_id, event, body);
        if let Err(e) = self.db.insert_notification(notification).await {
            warn!("📬️ Could not write in-app notification for user {user_id}: {e}");
        }
    }

    async fn email_user(&self, user_id: i64, subject: &str, body: &str) {
        match self.db.fetch_user(user_id).await {
            Ok(Some(user)) => self.email.send(&user.email, subject, body).await,
            Ok(None) => warn!("📬️ User {user_id} not found. Email \"{subject}\" dropped."),
            Err(e) => warn!("📬️ Could not look up user {user_id} for email delivery: {e}"),
        }
    }

    pub async fn order_delivered(&self, ev: OrderDeliveredEvent) {
        let order = &ev.order;
        info!("📬️ Notifying buyer {} that {order} was delivered", order.buyer_id);
        let body = format!(
            "Your order {} has been delivered. Confirm receipt from your orders page, or raise a dispute if \
             something is wrong. Unconfirmed orders complete automatically after the grace period.",
            order.order_id
        );
        self.notify_in_app(order.buyer_id, "order_delivered", body.clone()).await;
        self.email_user(order.buyer_id, "Your order has been delivered", &body).await;
    }

    pub async fn dispute_opened(&self, ev: DisputeOpenedEvent) {
        let dispute = &ev.dispute;
        info!("📬️ Notifying vendor {} about {dispute}", dispute.vendor_id);
        let body = format!(
            "A dispute has been opened on order {}: \"{}\". Funds for this order are frozen until the dispute is \
             settled. You can respond from your disputes page.",
            dispute.order_id, dispute.reason
        );
        self.notify_in_app(dispute.vendor_id, "dispute_opened", body.clone()).await;
        self.email_user(dispute.vendor_id, "A dispute was opened against one of your orders", &body).await;
    }

    pub async fn dispute_message(&self, ev: DisputeMessageEvent) {
        let body = format!("New message on dispute #{} (order {}).", ev.dispute.id, ev.dispute.order_id);
        for user_id in &ev.recipients {
            self.notify_in_app(*user_id, "dispute_message", body.clone()).await;
        }
    }

    pub async fn dispute_settled(&self, ev: DisputeSettledEvent) {
        let dispute = &ev.dispute;
        info!("📬️ Notifying parties that {dispute} was settled");
        let outcome = dispute.resolution.as_deref().unwrap_or("The dispute was closed.");
        let body = format!("Dispute #{} on order {} has been settled. {}", dispute.id, dispute.order_id, outcome);
        for user_id in [dispute.raised_by, dispute.vendor_id] {
            self.notify_in_app(user_id, "dispute_settled", body.clone()).await;
            self.email_user(user_id, "Your dispute has been settled", &body).await;
        }
    }

    pub async fn payout_updated(&self, ev: PayoutUpdatedEvent) {
        let payout = &ev.payout;
        info!("📬️ Notifying vendor {} that {payout} changed status", payout.vendor_id);
        let mut body = format!("Your payout of {} is now {}.", payout.amount, payout.status);
        if let Some(reason) = &payout.failure_reason {
            body.push_str(&format!(" Reason: {reason}"));
        }
        let event = format!("payout_{}", payout.status).to_lowercase();
        self.notify_in_app(payout.vendor_id, &event, body.clone()).await;
        self.email_user(payout.vendor_id, "Payout status update", &body).await;
    }

    /// The only place the plaintext code leaves the process. It goes to the SMS gateway when
    /// a phone is on file, otherwise to email, and is never logged or stored.
    pub async fn otp_issued(&self, ev: OtpIssuedEvent) {
        let subject = match ev.purpose {
            OtpPurpose::PayoutDestination => "Confirm your payout destination change",
            OtpPurpose::VerifyPhone => "Verify your phone number",
        };
        let message = format!("Your Soko verification code is {}. It expires in 10 minutes.", ev.code);
        match (&ev.phone, &ev.email) {
            (Some(phone), _) => self.sms.send(phone, &message).await,
            (None, Some(email)) => self.email.send(email, subject, &message).await,
            (None, None) => warn!("📬️ No delivery channel for the code issued to user {}", ev.user_id),
        }
    }
}
