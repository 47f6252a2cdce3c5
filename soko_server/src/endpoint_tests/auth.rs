use actix_web::{http::StatusCode, test::TestRequest, web};
use chrono::{Duration, Utc};
use serde_json::json;
use soko_engine::{helpers::passwords::hash_password, AccountApi, AuthApi};

use super::{helpers::*, mocks::MockBackend};
use crate::{
    auth::{CSRF_COOKIE, SESSION_COOKIE},
    middleware::SessionMiddlewareFactory,
    routes::{AuditLogRoute, LoginRoute, MyAccountRoute, VerifyPhoneRoute},
};

#[actix_web::test]
async fn login_sets_session_and_csrf_cookies() {
    let _ = env_logger::try_init();
    let user = user_fixture(&buyer());
    let hash = hash_password("correct horse battery staple").unwrap();
    let mut db = MockBackend::new();
    db.expect_fetch_user_with_credentials()
        .withf(|email| email == "bisi@example.com")
        .returning(move |_| Ok(Some((user.clone(), hash.clone()))));
    db.expect_create_session().returning(|_, _, _| Ok(Utc::now() + Duration::hours(24)));
    let auth_api = AuthApi::new(db, Default::default(), Default::default());

    let app = actix_web::App::new()
        .app_data(web::Data::new(auth_api))
        .service(LoginRoute::<MockBackend>::new());
    let service = actix_web::test::init_service(app).await;
    let req = TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": "bisi@example.com", "password": "correct horse battery staple" }))
        .to_request();
    let res = actix_web::test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookies: Vec<_> = res.response().cookies().collect();
    assert!(cookies.iter().any(|c| c.name() == SESSION_COOKIE && c.http_only() == Some(true)));
    assert!(cookies.iter().any(|c| c.name() == CSRF_COOKIE && c.http_only() != Some(true)));
    let body = String::from_utf8_lossy(&actix_web::test::read_body(res).await).into_owned();
    assert!(body.contains(r#""user_id":100"#), "was: {body}");
}

#[actix_web::test]
async fn a_bad_password_is_a_401() {
    let user = user_fixture(&buyer());
    let hash = hash_password("the real password").unwrap();
    let mut db = MockBackend::new();
    db.expect_fetch_user_with_credentials().returning(move |_| Ok(Some((user.clone(), hash.clone()))));
    let auth_api = AuthApi::new(db, Default::default(), Default::default());

    let req = TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": "bisi@example.com", "password": "a guess" }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(auth_api)).service(LoginRoute::<MockBackend>::new());
    })
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Invalid email or password"), "was: {body}");
}

#[actix_web::test]
async fn an_unknown_email_gets_the_same_error_as_a_bad_password() {
    let mut db = MockBackend::new();
    db.expect_fetch_user_with_credentials().returning(|_| Ok(None));
    let auth_api = AuthApi::new(db, Default::default(), Default::default());

    let req = TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": "nobody@example.com", "password": "whatever" }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(auth_api)).service(LoginRoute::<MockBackend>::new());
    })
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Invalid email or password"), "was: {body}");
}

#[actix_web::test]
async fn requests_without_a_session_cookie_are_401() {
    let accounts_api = AccountApi::new(MockBackend::new());
    let req = TestRequest::get().uri("/api/account");
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(None)))
            .app_data(web::Data::new(accounts_api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(MyAccountRoute::<MockBackend>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No valid session cookie"), "was: {body}");
}

#[actix_web::test]
async fn a_buyer_cannot_reach_admin_endpoints() {
    let accounts_api = AccountApi::new(MockBackend::new());
    let req = TestRequest::get().uri("/api/admin/audit-log").cookie(session_cookie());
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(buyer()))))
            .app_data(web::Data::new(accounts_api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(AuditLogRoute::<MockBackend>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("not available to buyers"), "was: {body}");
}

#[actix_web::test]
async fn verifying_a_phone_code_flips_the_flag() {
    let session = buyer();
    let mut verified = user_fixture(&session);
    verified.phone_verified = true;
    let mut db = MockBackend::new();
    db.expect_fetch_session_user().returning(move |_| Ok(Some(session.clone())));
    db.expect_verify_otp_challenge().returning(|_, _, _, _| Ok(()));
    db.expect_mark_phone_verified().withf(|id| *id == 100).returning(move |_| Ok(verified.clone()));
    let auth_api = AuthApi::new(db, Default::default(), Default::default());

    let req = TestRequest::post()
        .uri("/api/account/phone/verify")
        .cookie(session_cookie())
        .set_json(json!({ "code": "483920" }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(auth_api)).service(
            web::scope("/api")
                .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                .service(VerifyPhoneRoute::<MockBackend>::new()),
        );
    })
    .await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert!(body.contains(r#""phone_verified":true"#), "was: {body}");
}

#[actix_web::test]
async fn a_wrong_code_reports_the_attempts_left() {
    use soko_engine::traits::AuthApiError;
    let session = buyer();
    let mut db = MockBackend::new();
    db.expect_fetch_session_user().returning(move |_| Ok(Some(session.clone())));
    db.expect_verify_otp_challenge().returning(|_, _, _, _| Err(AuthApiError::OtpIncorrect(2)));
    let auth_api = AuthApi::new(db, Default::default(), Default::default());

    let req = TestRequest::post()
        .uri("/api/account/phone/verify")
        .cookie(session_cookie())
        .set_json(json!({ "code": "000000" }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(auth_api)).service(
            web::scope("/api")
                .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                .service(VerifyPhoneRoute::<MockBackend>::new()),
        );
    })
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("2 attempt(s) remaining"), "was: {body}");
}
