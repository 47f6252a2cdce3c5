use actix_web::{http::StatusCode, test::TestRequest, web};
use chrono::{Duration, Utc};
use serde_json::json;
use soko_engine::{
    db_types::{DisputeMessage, DisputeStatusType, Role},
    traits::DisputeError,
    DisputeApi,
};

use super::{helpers::*, mocks::MockBackend};
use crate::{
    middleware::SessionMiddlewareFactory,
    routes::{DisputeByIdRoute, PostDisputeMessageRoute, RaiseDisputeRoute, ResolveDisputeRoute},
};

fn dispute_api(db: MockBackend) -> DisputeApi<MockBackend> {
    DisputeApi::new(db, Duration::hours(48), Default::default())
}

#[actix_web::test]
async fn the_raiser_can_read_the_thread() {
    let mut db = MockBackend::new();
    db.expect_fetch_dispute().returning(|_| Ok(Some(dispute_fixture(100, 200))));
    db.expect_fetch_dispute_messages().returning(|dispute_id| {
        Ok(vec![DisputeMessage {
            id: 1,
            dispute_id,
            author_id: 100,
            author_role: Role::Buyer,
            body: "The carton was crushed on arrival".into(),
            created_at: Utc::now(),
        }])
    });
    let api = dispute_api(db);

    let req = TestRequest::get().uri("/api/disputes/9").cookie(session_cookie());
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(buyer()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(DisputeByIdRoute::<MockBackend>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert!(body.contains("crushed on arrival"), "was: {body}");
}

#[actix_web::test]
async fn a_stranger_cannot_read_the_thread() {
    let mut db = MockBackend::new();
    // Dispute between buyer 100 and vendor 200; the caller is vendor 999.
    db.expect_fetch_dispute().returning(|_| Ok(Some(dispute_fixture(100, 200))));
    let api = dispute_api(db);
    let mut stranger = vendor();
    stranger.user_id = 999;

    let req = TestRequest::get().uri("/api/disputes/9").cookie(session_cookie());
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(stranger))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(DisputeByIdRoute::<MockBackend>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("not a party"), "was: {body}");
}

#[actix_web::test]
async fn an_empty_dispute_reason_is_rejected() {
    let api = dispute_api(MockBackend::new());
    let req = TestRequest::post()
        .uri("/api/disputes")
        .cookie(session_cookie())
        .set_json(json!({ "order_id": "ORD-17-4be1", "order_item_id": 23, "reason": "   " }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(buyer()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(RaiseDisputeRoute::<MockBackend>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
}

#[actix_web::test]
async fn posting_to_a_settled_thread_is_a_400() {
    let mut db = MockBackend::new();
    db.expect_add_dispute_message().returning(|id, _, _| Err(DisputeError::ThreadClosed(id)));
    let api = dispute_api(db);

    let req = TestRequest::post()
        .uri("/api/disputes/9/messages")
        .cookie(session_cookie())
        .set_json(json!({ "body": "one more thing" }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(buyer()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(PostDisputeMessageRoute::<MockBackend>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
}

#[actix_web::test]
async fn an_admin_resolves_a_dispute() {
    let mut db = MockBackend::new();
    db.expect_resolve_dispute()
        .withf(|id, admin_id, resolution| *id == 9 && *admin_id == 1 && resolution.contains("refund"))
        .returning(|id, admin_id, resolution| {
            let mut dispute = dispute_fixture(100, 200);
            dispute.id = id;
            dispute.status = DisputeStatusType::Resolved;
            dispute.resolution = Some(resolution);
            dispute.resolved_by = Some(admin_id);
            Ok(dispute)
        });
    let api = dispute_api(db);

    let req = TestRequest::post()
        .uri("/api/admin/disputes/9/resolve")
        .cookie(session_cookie())
        .set_json(json!({ "resolution": "Vendor to refund the damaged carton" }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(admin()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(ResolveDisputeRoute::<MockBackend>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert!(body.contains(r#""resolved""#) || body.contains("Resolved") || body.contains("resolved"), "was: {body}");
}

#[actix_web::test]
async fn a_vendor_cannot_resolve_disputes() {
    let api = dispute_api(MockBackend::new());
    let req = TestRequest::post()
        .uri("/api/admin/disputes/9/resolve")
        .cookie(session_cookie())
        .set_json(json!({ "resolution": "in my own favour" }));
    let (status, body) = request(req, |cfg| {
        cfg.app_data(web::Data::new(session_auth_api(Some(vendor()))))
            .app_data(web::Data::new(api))
            .service(
                web::scope("/api")
                    .wrap(SessionMiddlewareFactory::<MockBackend>::new())
                    .service(ResolveDisputeRoute::<MockBackend>::new()),
            );
    })
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("not available to vendors"), "was: {body}");
}
