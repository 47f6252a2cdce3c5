use log::*;
use soko_engine::{events::EventProducers, se_api::auth_api::OtpSettings, AuthApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the auth housekeeping worker. Do not await the returned JoinHandle, as it will run
/// indefinitely.
///
/// Expired sessions, OTP challenges and action tokens all deny access the moment they lapse;
/// this worker only scrubs the dead rows so the tables do not grow without bound.
pub fn start_housekeeping_worker(db: SqliteDatabase, settings: OtpSettings) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        let api = AuthApi::new(db, settings, EventProducers::default());
        info!("🕰️ Auth housekeeping worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running auth housekeeping job");
            match api.purge_expired().await {
                Ok(count) => {
                    if count > 0 {
                        info!("🕰️ Purged {count} expired sessions, codes and action tokens");
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running auth housekeeping job: {e}");
                },
            }
        }
    })
}
