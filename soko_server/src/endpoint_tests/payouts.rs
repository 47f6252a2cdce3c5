use actix_web::{http::StatusCode, test::TestRequest, web};
use serde_json::json;
use soko_common::{Cents, Secret};
use soko_engine::{
    db_types::PayoutStatusType,
    payout_objects::BalanceSummary,
    traits::{PayoutError, RemoteTransferStatus, TransferAck},
    PayoutApi,
};

use super::{helpers::*, mocks::{MockBackend, MockGateway}};
use crate::{
    helpers::paystack_signature,
    middleware::{SessionMiddlewareFactory, WebhookSignatureMiddlewareFactory},
    routes::{CancelMyPayoutRoute, PaystackWebhookRoute, RequestWithdrawalRoute, VendorBalanceRoute},
};

fn payout_api(db: MockBackend, gateway: MockGateway) -> PayoutApi<MockBackend, MockGateway> {
    PayoutApi::new(db, gateway, 150, Default::default())
}

#[actix_web::test]
async fn a_vendor_sees_their_balance() {
    let mut db = MockBackend::new();
    db.expect_vendor_balance()
        .withf(|vendor_id, fee| *vendor_id == 200 && *fee == 150)
        .returning(|_, _| Ok(BalanceSummary::compute(Cents::from(1_000_000), Cents::from(100_000), Cents::from(50_000), 150)));
    let api = payout_api(db, MockGateway::new());

    let req = TestRequest::get().uri("/api/vendor/balance").cookie(session_cookie());
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(vendor()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(VendorBalanceRoute::<MockBackend, MockGateway>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    // 1.5% of 1,000,000 is 15,000; available = 1,000,000 - 15,000 - 100,000 - 50,000
    assert!(body.contains(r#""available":835000"#), "was: {body}");
}

#[actix_web::test]
async fn a_buyer_cannot_request_a_withdrawal() {
    let api = payout_api(MockBackend::new(), MockGateway::new());
    let req = TestRequest::post()
        .uri("/api/vendor/payouts")
        .cookie(session_cookie())
        .set_json(json!({ "amount": 50_000 }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(buyer()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(RequestWithdrawalRoute::<MockBackend, MockGateway>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("not available to buyers"), "was: {body}");
}

#[actix_web::test]
async fn overdrawing_the_balance_is_a_400() {
    let mut db = MockBackend::new();
    db.expect_create_payout().returning(|_, requested, _| {
        Err(PayoutError::InsufficientFunds { requested, available: Cents::from(10_000) })
    });
    let api = payout_api(db, MockGateway::new());

    let req = TestRequest::post()
        .uri("/api/vendor/payouts")
        .cookie(session_cookie())
        .set_json(json!({ "amount": 5_000_000 }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(vendor()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(RequestWithdrawalRoute::<MockBackend, MockGateway>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("only ₦100.00 is available"), "was: {body}");
}

#[actix_web::test]
async fn an_accepted_withdrawal_comes_back_processing() {
    let mut db = MockBackend::new();
    db.expect_create_payout().returning(|vendor_id, _, _| Ok(payout_fixture(vendor_id, PayoutStatusType::Pending)));
    db.expect_mark_payout_submitted()
        .withf(|id, code| *id == 41 && code == "TRF_accepted")
        .returning(|id, code| {
            let mut payout = payout_fixture(200, PayoutStatusType::Processing);
            payout.id = id;
            payout.transfer_code = Some(code.to_string());
            Ok(payout)
        });
    let mut gateway = MockGateway::new();
    gateway.expect_initiate_transfer().returning(|_| {
        Ok(TransferAck { transfer_code: "TRF_accepted".into(), status: RemoteTransferStatus::Pending })
    });
    let api = payout_api(db, gateway);

    let req = TestRequest::post()
        .uri("/api/vendor/payouts")
        .cookie(session_cookie())
        .set_json(json!({ "amount": 250_000 }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(vendor()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(RequestWithdrawalRoute::<MockBackend, MockGateway>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert!(body.contains(r#""id":41"#), "was: {body}");
    assert!(body.contains("TRF_accepted"), "was: {body}");
}

#[actix_web::test]
async fn cancelling_another_vendors_payout_is_forbidden() {
    let mut db = MockBackend::new();
    db.expect_cancel_payout().returning(|id, _| Err(PayoutError::NotYourPayout(id)));
    let api = payout_api(db, MockGateway::new());

    let req = TestRequest::post().uri("/api/vendor/payouts/41/cancel").cookie(session_cookie());
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(vendor()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(CancelMyPayoutRoute::<MockBackend, MockGateway>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("belongs to another vendor"), "was: {body}");
}

const WEBHOOK_BODY: &str = r#"{"event":"transfer.success","data":{"amount":250000,"currency":"NGN","reference":"PYT-1724580000-9f2ab310","status":"success","transfer_code":"TRF_lkq9"}}"#;

fn webhook_request(secret: &str, tamper: bool) -> TestRequest {
    let mut signature = paystack_signature(secret, WEBHOOK_BODY.as_bytes());
    if tamper {
        signature = signature.chars().rev().collect();
    }
    TestRequest::post()
        .uri("/webhook/paystack")
        .insert_header(("content-type", "application/json"))
        .insert_header(("x-paystack-signature", signature))
        .set_payload(WEBHOOK_BODY)
}

#[actix_web::test]
async fn a_signed_webhook_reconciles_the_payout() {
    let mut db = MockBackend::new();
    db.expect_reconcile_payout()
        .withf(|reference, status, _| reference == "PYT-1724580000-9f2ab310" && *status == PayoutStatusType::Completed)
        .returning(|_, status, _| Ok(payout_fixture(200, status)));
    let api = payout_api(db, MockGateway::new());

    let (status, body) = request(webhook_request("whsec_testing", false), |cfg| {
        cfg.app_data(web::Data::new(api)).service(
            web::scope("/webhook")
                .wrap(WebhookSignatureMiddlewareFactory::new(
                    "x-paystack-signature",
                    Secret::new("whsec_testing".to_string()),
                    true,
                ))
                .service(PaystackWebhookRoute::<MockBackend, MockGateway>::new()),
        );
    })
    .await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert!(body.contains(r#""success":true"#), "was: {body}");
}

#[actix_web::test]
async fn a_tampered_webhook_is_rejected() {
    let api = payout_api(MockBackend::new(), MockGateway::new());
    let (status, body) = request(webhook_request("whsec_testing", true), |cfg| {
        cfg.app_data(web::Data::new(api)).service(
            web::scope("/webhook")
                .wrap(WebhookSignatureMiddlewareFactory::new(
                    "x-paystack-signature",
                    Secret::new("whsec_testing".to_string()),
                    true,
                ))
                .service(PaystackWebhookRoute::<MockBackend, MockGateway>::new()),
        );
    })
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Invalid webhook signature"), "was: {body}");
}

#[actix_web::test]
async fn an_unmatchable_report_is_still_acknowledged() {
    let mut db = MockBackend::new();
    db.expect_reconcile_payout()
        .returning(|reference, _, _| Err(PayoutError::ReferenceNotFound(reference.to_string())));
    let api = payout_api(db, MockGateway::new());

    let (status, body) = request(webhook_request("whsec_testing", false), |cfg| {
        cfg.app_data(web::Data::new(api)).service(
            web::scope("/webhook")
                .wrap(WebhookSignatureMiddlewareFactory::new(
                    "x-paystack-signature",
                    Secret::new("whsec_testing".to_string()),
                    true,
                ))
                .service(PaystackWebhookRoute::<MockBackend, MockGateway>::new()),
        );
    })
    .await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert!(body.contains(r#""success":false"#), "was: {body}");
}
