use actix_web::{
    cookie::Cookie,
    http::StatusCode,
    test,
    web::ServiceConfig,
    App,
    HttpResponse,
};
use chrono::{Duration, Utc};
use soko_common::Cents;
use soko_engine::{
    db_types::{Dispute, DisputeStatusType, Order, OrderStatusType, Payout, PayoutStatusType, Role, SessionUser, User},
    events::EventProducers,
    se_api::auth_api::OtpSettings,
    AuthApi,
};

use super::mocks::MockBackend;
use crate::auth::SESSION_COOKIE;

/// The opaque token the test client presents. The mocked backend accepts any digest, so the
/// value itself is arbitrary.
pub const TEST_SESSION_TOKEN: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

pub fn buyer() -> SessionUser {
    SessionUser { user_id: 100, role: Role::Buyer, display_name: "Bisi".into(), email: "bisi@example.com".into() }
}

pub fn vendor() -> SessionUser {
    SessionUser {
        user_id: 200,
        role: Role::Vendor,
        display_name: "Nkechi Stores".into(),
        email: "nkechi@example.com".into(),
    }
}

pub fn admin() -> SessionUser {
    SessionUser { user_id: 1, role: Role::Admin, display_name: "Ops".into(), email: "ops@soko.example".into() }
}

pub fn user_fixture(session: &SessionUser) -> User {
    User {
        id: session.user_id,
        email: session.email.clone(),
        display_name: session.display_name.clone(),
        role: session.role,
        phone: Some("+2348012345678".into()),
        phone_verified: true,
        created_at: Utc::now() - Duration::days(30),
        updated_at: Utc::now(),
    }
}

pub fn payout_fixture(vendor_id: i64, status: PayoutStatusType) -> Payout {
    Payout {
        id: 41,
        vendor_id,
        bank_account_id: 7,
        amount: Cents::from(250_000),
        reference: "PYT-1724580000-9f2ab310".into(),
        recipient_code: "RCP_8xk2ao1".into(),
        transfer_code: (!matches!(status, PayoutStatusType::Pending)).then(|| "TRF_lkq9".to_string()),
        status,
        failure_reason: None,
        created_at: Utc::now() - Duration::hours(2),
        updated_at: Utc::now(),
    }
}

pub fn dispute_fixture(raised_by: i64, vendor_id: i64) -> Dispute {
    Dispute {
        id: 9,
        order_id: "ORD-17-4be1".into(),
        order_item_id: Some(23),
        raised_by,
        vendor_id,
        reason: "Carton arrived crushed".into(),
        status: DisputeStatusType::Open,
        resolution: None,
        resolved_by: None,
        created_at: Utc::now() - Duration::hours(5),
        updated_at: Utc::now(),
        closed_at: None,
    }
}

pub fn order_fixture(buyer_id: i64) -> Order {
    Order {
        id: 17,
        order_id: "ORD-17-4be1".into(),
        buyer_id,
        total_price: Cents::from(480_000),
        currency: "NGN".into(),
        status: OrderStatusType::Delivered,
        created_at: Utc::now() - Duration::days(2),
        updated_at: Utc::now(),
        delivered_at: Some(Utc::now() - Duration::hours(6)),
        completed_at: None,
    }
}

/// An `AuthApi` whose backend resolves every session token to `user` (or to nothing). Tests
/// register it as app data so the session middleware has something to ask.
pub fn session_auth_api(user: Option<SessionUser>) -> AuthApi<MockBackend> {
    let mut db = MockBackend::new();
    db.expect_fetch_session_user().returning(move |_| Ok(user.clone()));
    AuthApi::new(db, OtpSettings::default(), EventProducers::default())
}

pub fn session_cookie() -> Cookie<'static> {
    Cookie::new(SESSION_COOKIE, TEST_SESSION_TOKEN)
}

/// Build an app from `configure`, run `req` against it and return the status with the body
/// as text. Errors surfaced by middleware are rendered the way the server would render them.
pub async fn request(req: actix_web::test::TestRequest, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let _ = env_logger::try_init();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = String::from_utf8_lossy(&test::read_body(res).await).into_owned();
            (status, body)
        },
        Err(e) => {
            let res = HttpResponse::from_error(e);
            let status = res.status();
            let body = actix_web::body::to_bytes(res.into_body()).await.unwrap_or_default();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}
