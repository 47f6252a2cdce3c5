use chrono::Duration;
use cucumber::{given, then, when};
use soko_common::Cents;
use soko_engine::{
    db_types::{
        DisputeStatusType,
        ItemStatusType,
        NewDispute,
        NewOrder,
        NewOrderItem,
        OrderId,
        OrderStatusType,
        OtpPurpose,
        PayoutStatusType,
    },
    payout_objects::BalanceSummary,
    se_api::auth_api::OtpVerification,
    test_utils::fixtures::{deliver_order, SEED_PASSWORD},
    traits::{DisputeManagement, PayoutManagement, RemoteTransferStatus},
};

use crate::cucumber::{soko_world::TEST_FEE_BASIS_POINTS, SokoWorld};

//--------------------------------------  Shared outcomes  ---------------------------------------------

#[then(expr = "the request fails with {string}")]
fn request_fails_with(world: &mut SokoWorld, message: String) {
    let error = world.last_error.as_ref().expect("Expected the request to fail, but it succeeded");
    assert!(error.contains(&message), "Error \"{error}\" does not mention \"{message}\"");
}

#[then("the request succeeds")]
fn request_succeeds(world: &mut SokoWorld) {
    assert!(world.last_error.is_none(), "Request failed: {:?}", world.last_error);
}

//--------------------------------------  Order lifecycle  ---------------------------------------------

#[given(expr = "{word} placed order {word} with {int} x {int} kobo from {word}")]
#[when(expr = "{word} places order {word} with {int} x {int} kobo from {word}")]
async fn place_order(world: &mut SokoWorld, buyer: String, oid: String, quantity: i64, price: i64, vendor: String) {
    let buyer_id = world.user(&buyer).id;
    let order = NewOrder::new(buyer_id)
        .with_order_id(oid)
        .with_item(NewOrderItem::new(world.user(&vendor).id, "Ankara fabric", quantity, Cents::from(price)));
    world.sys().orders.place_order(buyer_id, order).await.expect("Error placing order");
}

#[given(expr = "{word} placed order {word} with {int} x {int} kobo from {word} and {int} x {int} kobo from {word}")]
#[when(expr = "{word} places order {word} with {int} x {int} kobo from {word} and {int} x {int} kobo from {word}")]
async fn place_two_vendor_order(
    world: &mut SokoWorld,
    buyer: String,
    oid: String,
    quantity_1: i64,
    price_1: i64,
    vendor_1: String,
    quantity_2: i64,
    price_2: i64,
    vendor_2: String,
) {
    let buyer_id = world.user(&buyer).id;
    let order = NewOrder::new(buyer_id)
        .with_order_id(oid)
        .with_item(NewOrderItem::new(world.user(&vendor_1).id, "Ankara fabric", quantity_1, Cents::from(price_1)))
        .with_item(NewOrderItem::new(world.user(&vendor_2).id, "Leather sandals", quantity_2, Cents::from(price_2)));
    world.sys().orders.place_order(buyer_id, order).await.expect("Error placing order");
}

#[when(expr = "{word} tries to place an empty order {word}")]
async fn place_empty_order(world: &mut SokoWorld, buyer: String, oid: String) {
    let buyer_id = world.user(&buyer).id;
    let order = NewOrder::new(buyer_id).with_order_id(oid);
    let res = world.sys().orders.place_order(buyer_id, order).await;
    world.note_result(res);
}

#[when(expr = "{word} tries to place order {word} with {int} x {int} kobo from {word}")]
async fn try_place_order(world: &mut SokoWorld, buyer: String, oid: String, quantity: i64, price: i64, vendor: String) {
    let buyer_id = world.user(&buyer).id;
    let order = NewOrder::new(buyer_id)
        .with_order_id(oid)
        .with_item(NewOrderItem::new(world.user(&vendor).id, "Ankara fabric", quantity, Cents::from(price)));
    let res = world.sys().orders.place_order(buyer_id, order).await;
    world.note_result(res);
}

#[when(expr = "{word} marks item {int} of order {word} as {word}")]
async fn mark_item(world: &mut SokoWorld, vendor: String, index: usize, oid: String, status: String) {
    let item = world.item(&OrderId::from(oid), index).await;
    let vendor_id = world.user(&vendor).id;
    let status = ItemStatusType::from(status);
    world.sys().orders.update_item_status(vendor_id, item.id, status).await.expect("Error updating item status");
}

#[when(expr = "{word} tries to mark item {int} of order {word} as {word}")]
async fn try_mark_item(world: &mut SokoWorld, vendor: String, index: usize, oid: String, status: String) {
    let item = world.item(&OrderId::from(oid), index).await;
    let vendor_id = world.user(&vendor).id;
    let status = ItemStatusType::from(status);
    let res = world.sys().orders.update_item_status(vendor_id, item.id, status).await;
    world.note_result(res);
}

#[given(expr = "every item of order {word} is delivered")]
async fn deliver_every_item(world: &mut SokoWorld, oid: String) {
    let items = world.items(&OrderId::from(oid)).await;
    deliver_order(world.db(), &items).await;
}

#[given(expr = "{word} confirmed receipt of order {word}")]
#[when(expr = "{word} confirms receipt of order {word}")]
async fn confirm_receipt(world: &mut SokoWorld, buyer: String, oid: String) {
    let buyer_id = world.user(&buyer).id;
    world.sys().orders.confirm_receipt(buyer_id, &OrderId::from(oid)).await.expect("Error confirming receipt");
}

#[when(expr = "{word} tries to confirm receipt of order {word}")]
async fn try_confirm_receipt(world: &mut SokoWorld, buyer: String, oid: String) {
    let buyer_id = world.user(&buyer).id;
    let res = world.sys().orders.confirm_receipt(buyer_id, &OrderId::from(oid)).await;
    world.note_result(res);
}

#[when(expr = "{word} tries to view order {word}")]
async fn try_view_order(world: &mut SokoWorld, name: String, oid: String) {
    let session = world.session(&name);
    let res = world.sys().orders.order_for_user(&OrderId::from(oid), &session).await;
    world.note_result(res);
}

#[then(expr = "{word} sees {int} line item(s) on order {word}")]
async fn sees_line_items(world: &mut SokoWorld, name: String, count: usize, oid: String) {
    let session = world.session(&name);
    let view = world.sys().orders.order_for_user(&OrderId::from(oid), &session).await.expect("Error fetching order");
    assert_eq!(view.items.len(), count, "Wrong number of visible items");
}

#[given(expr = "order {word} was delivered {int} days ago")]
async fn backdate_delivery(world: &mut SokoWorld, oid: String, days: i64) {
    sqlx::query("UPDATE orders SET delivered_at = datetime('now', '-' || $1 || ' days') WHERE order_id = $2")
        .bind(days)
        .bind(oid)
        .execute(world.db().pool())
        .await
        .expect("Error backdating delivery");
}

#[when(expr = "the auto-completion sweep runs with a grace period of {int} days")]
async fn run_sweep(world: &mut SokoWorld, days: i64) {
    let result = world.sys().orders.auto_complete_orders(Duration::days(days)).await.expect("Error running sweep");
    world.last_sweep = Some(result.count());
}

#[then(expr = "the sweep auto-completes {int} order(s)")]
fn orders_auto_completed(world: &mut SokoWorld, count: usize) {
    assert_eq!(world.last_sweep, Some(count), "Sweep completed a different number of orders");
}

#[then(expr = "the audit log records {string} for order {word}")]
async fn audit_records_order(world: &mut SokoWorld, action: String, oid: String) {
    let entries = world.sys().accounts.audit_log(50).await.expect("Error fetching audit log");
    let found = entries.iter().any(|e| e.action == action && e.details.contains(&oid));
    assert!(found, "No {action} audit entry for order {oid}");
}

#[then(expr = "order {word} has {word} of '{word}'")]
async fn order_field(world: &mut SokoWorld, oid: String, field: String, value: String) {
    let order = world.order(&OrderId::from(oid)).await;
    match field.as_str() {
        "status" => assert_eq!(order.status, OrderStatusType::from(value), "Status is incorrect"),
        "currency" => assert_eq!(order.currency, value, "Currency is incorrect"),
        "total_price" => {
            let price = value.parse::<i64>().expect("Invalid price");
            assert_eq!(order.total_price, Cents::from(price), "Total price is incorrect");
        },
        _ => panic!("Unknown field {field}"),
    }
}

#[then(expr = "order {word} has {int} line item(s)")]
async fn order_item_count(world: &mut SokoWorld, oid: String, count: usize) {
    let items = world.items(&OrderId::from(oid)).await;
    assert_eq!(items.len(), count, "Wrong number of line items");
}

#[then(expr = "order {word} has a delivery timestamp")]
async fn order_has_delivery_timestamp(world: &mut SokoWorld, oid: String) {
    let order = world.order(&OrderId::from(oid)).await;
    assert!(order.delivered_at.is_some(), "delivered_at is not set");
}

//--------------------------------------      Disputes      ---------------------------------------------

#[given(expr = "{word} opened a dispute on order {word} because {string}")]
#[when(expr = "{word} opens a dispute on order {word} because {string}")]
async fn open_dispute(world: &mut SokoWorld, name: String, oid: String, reason: String) {
    let session = world.session(&name);
    let dispute = NewDispute::new(oid, reason);
    world.sys().disputes.raise_dispute(&session, dispute).await.expect("Error opening dispute");
}

#[when(expr = "{word} tries to open a dispute on order {word} because {string}")]
async fn try_open_dispute(world: &mut SokoWorld, name: String, oid: String, reason: String) {
    let session = world.session(&name);
    let dispute = NewDispute::new(oid, reason);
    let res = world.sys().disputes.raise_dispute(&session, dispute).await;
    world.note_result(res);
}

#[when(expr = "{word} opens a dispute on item {int} of order {word} because {string}")]
async fn open_item_dispute(world: &mut SokoWorld, name: String, index: usize, oid: String, reason: String) {
    let order_id = OrderId::from(oid);
    let item = world.item(&order_id, index).await;
    let session = world.session(&name);
    let dispute = NewDispute::new(order_id, reason).with_item(item.id);
    world.sys().disputes.raise_dispute(&session, dispute).await.expect("Error opening dispute");
}

#[when(expr = "{word} resolves the dispute on order {word} with {string}")]
async fn resolve_dispute(world: &mut SokoWorld, admin: String, oid: String, resolution: String) {
    let session = world.session(&admin);
    let dispute = world.dispute_on(&OrderId::from(oid)).await;
    world.sys().disputes.resolve_dispute(&session, dispute.id, resolution).await.expect("Error resolving dispute");
}

#[when(expr = "{word} closes the dispute on order {word}")]
async fn close_dispute(world: &mut SokoWorld, name: String, oid: String) {
    let session = world.session(&name);
    let dispute = world.dispute_on(&OrderId::from(oid)).await;
    world.sys().disputes.close_dispute(&session, dispute.id).await.expect("Error closing dispute");
}

#[when(expr = "{word} tries to close the dispute on order {word}")]
async fn try_close_dispute(world: &mut SokoWorld, name: String, oid: String) {
    let session = world.session(&name);
    let dispute = world.dispute_on(&OrderId::from(oid)).await;
    let res = world.sys().disputes.close_dispute(&session, dispute.id).await;
    world.note_result(res);
}

#[when(expr = "{word} posts {string} on the dispute on order {word}")]
async fn post_dispute_message(world: &mut SokoWorld, name: String, body: String, oid: String) {
    let session = world.session(&name);
    let dispute = world.dispute_on(&OrderId::from(oid)).await;
    world.sys().disputes.post_message(dispute.id, &session, body).await.expect("Error posting message");
}

#[when(expr = "{word} tries to post {string} on the dispute on order {word}")]
async fn try_post_dispute_message(world: &mut SokoWorld, name: String, body: String, oid: String) {
    let session = world.session(&name);
    let dispute = world.dispute_on(&OrderId::from(oid)).await;
    let res = world.sys().disputes.post_message(dispute.id, &session, body).await;
    world.note_result(res);
}

#[then(expr = "the dispute on order {word} has status of '{word}'")]
async fn dispute_status(world: &mut SokoWorld, oid: String, value: String) {
    let dispute = world.dispute_on(&OrderId::from(oid)).await;
    assert_eq!(dispute.status, DisputeStatusType::from(value), "Dispute status is incorrect");
}

#[then(expr = "the dispute on order {word} has resolution {string}")]
async fn dispute_resolution(world: &mut SokoWorld, oid: String, resolution: String) {
    let dispute = world.dispute_on(&OrderId::from(oid)).await;
    assert_eq!(dispute.resolution.as_deref(), Some(resolution.as_str()), "Resolution is incorrect");
}

#[then(expr = "the dispute on order {word} has {int} message(s)")]
async fn dispute_message_count(world: &mut SokoWorld, oid: String, count: usize) {
    let dispute = world.dispute_on(&OrderId::from(oid)).await;
    let messages = world.db().fetch_dispute_messages(dispute.id).await.expect("Error fetching messages");
    assert_eq!(messages.len(), count, "Wrong number of messages");
}

//--------------------------------------       Payouts      ---------------------------------------------

#[when(expr = "{word} requests a withdrawal of {int} kobo")]
async fn request_withdrawal(world: &mut SokoWorld, name: String, amount: i64) {
    let vendor_id = world.user(&name).id;
    let payout =
        world.sys().payouts.request_withdrawal(vendor_id, Cents::from(amount)).await.expect("Error requesting payout");
    world.payout_ids.push(payout.id);
}

#[when(expr = "{word} tries to request a withdrawal of {int} kobo")]
async fn try_request_withdrawal(world: &mut SokoWorld, name: String, amount: i64) {
    let vendor_id = world.user(&name).id;
    let res = world.sys().payouts.request_withdrawal(vendor_id, Cents::from(amount)).await;
    if let Some(payout) = world.note_result(res) {
        world.payout_ids.push(payout.id);
    }
}

/// A payout accepted locally but not yet handed to the provider.
#[given(expr = "{word} has a pending payout of {int} kobo")]
async fn pending_payout(world: &mut SokoWorld, name: String, amount: i64) {
    let vendor_id = world.user(&name).id;
    let payout = world
        .db()
        .create_payout(vendor_id, Cents::from(amount), TEST_FEE_BASIS_POINTS)
        .await
        .expect("Error creating payout");
    world.payout_ids.push(payout.id);
}

#[given(expr = "the transfer provider rejects transfers with {string}")]
fn provider_rejects(world: &mut SokoWorld, reason: String) {
    world.sys().gateway.reject_transfers(&reason);
}

#[given("the transfer provider is offline")]
fn provider_offline(world: &mut SokoWorld) {
    world.sys().gateway.go_offline("connect timeout");
}

#[given("the transfer provider accepts transfers again")]
fn provider_accepts(world: &mut SokoWorld) {
    world.sys().gateway.accept_transfers();
}

#[given(expr = "the provider reports transfers as {word}")]
fn provider_reports_transfers(world: &mut SokoWorld, status: String) {
    world.sys().gateway.report_status(remote_status(&status));
}

#[when(expr = "{word} cancels the latest payout")]
async fn cancel_latest_payout(world: &mut SokoWorld, name: String) {
    let session = world.session(&name);
    let payout = world.latest_payout().await;
    world.sys().payouts.cancel_payout(&session, payout.id).await.expect("Error cancelling payout");
}

#[when(expr = "{word} tries to cancel the latest payout")]
async fn try_cancel_latest_payout(world: &mut SokoWorld, name: String) {
    let session = world.session(&name);
    let payout = world.latest_payout().await;
    let res = world.sys().payouts.cancel_payout(&session, payout.id).await;
    world.note_result(res);
}

#[when(expr = "{word} retries the latest payout")]
async fn retry_latest_payout(world: &mut SokoWorld, name: String) {
    let session = world.session(&name);
    let payout = world.latest_payout().await;
    world.sys().payouts.retry_payout(&session, payout.id).await.expect("Error retrying payout");
}

#[when(expr = "{word} tries to view the latest payout")]
async fn try_view_latest_payout(world: &mut SokoWorld, name: String) {
    let session = world.session(&name);
    let payout = world.latest_payout().await;
    let res = world.sys().payouts.payout_for_user(payout.id, &session).await;
    world.note_result(res);
}

#[when(expr = "{word} syncs the latest payout with the provider")]
async fn sync_latest_payout(world: &mut SokoWorld, _name: String) {
    let payout = world.latest_payout().await;
    world.sys().payouts.sync_with_provider(payout.id).await.expect("Error syncing payout");
}

#[when(expr = "{word} tries to sync the latest payout with the provider")]
async fn try_sync_latest_payout(world: &mut SokoWorld, _name: String) {
    let payout = world.latest_payout().await;
    let res = world.sys().payouts.sync_with_provider(payout.id).await;
    world.note_result(res);
}

#[when(expr = "the provider reports the latest payout as {word}")]
async fn provider_reports_payout(world: &mut SokoWorld, status: String) {
    let payout = world.latest_payout().await;
    let status = PayoutStatusType::from(status);
    world
        .sys()
        .payouts
        .apply_provider_report(&payout.reference, status, None)
        .await
        .expect("Error applying provider report");
}

#[then(expr = "the latest payout has {word} of '{word}'")]
async fn latest_payout_field(world: &mut SokoWorld, field: String, value: String) {
    let payout = world.latest_payout().await;
    match field.as_str() {
        "status" => assert_eq!(payout.status, PayoutStatusType::from(value), "Status is incorrect"),
        "amount" => {
            let kobo = value.parse::<i64>().expect("Invalid amount");
            assert_eq!(payout.amount, Cents::from(kobo), "Amount is incorrect");
        },
        _ => panic!("Unknown field {field}"),
    }
}

#[then("the latest payout has a transfer code")]
async fn latest_payout_has_transfer_code(world: &mut SokoWorld) {
    let payout = world.latest_payout().await;
    assert!(payout.transfer_code.is_some(), "No transfer code recorded");
}

#[then(expr = "the latest payout failure mentions {string}")]
async fn latest_payout_failure_mentions(world: &mut SokoWorld, text: String) {
    let payout = world.latest_payout().await;
    let reason = payout.failure_reason.expect("Payout has no failure reason");
    assert!(reason.contains(&text), "Failure reason \"{reason}\" does not mention \"{text}\"");
}

#[then(expr = "the latest payout has {int} recorded attempt(s)")]
async fn latest_payout_attempt_count(world: &mut SokoWorld, count: usize) {
    let payout = world.latest_payout().await;
    let attempts = world.db().fetch_payout_attempts(payout.id).await.expect("Error fetching attempts");
    assert_eq!(attempts.len(), count, "Wrong number of attempts");
}

#[then(expr = "the provider received {int} transfer instruction(s)")]
fn provider_received(world: &mut SokoWorld, count: usize) {
    assert_eq!(world.sys().gateway.transfer_count(), count, "Provider saw a different number of transfers");
}

#[then(expr = "the last transfer instruction is for {int} kobo")]
fn last_transfer_amount(world: &mut SokoWorld, kobo: i64) {
    let instruction = world.sys().gateway.last_transfer().expect("Provider received no transfers");
    assert_eq!(instruction.amount, Cents::from(kobo), "Transfer amount is incorrect");
}

async fn balance_of(world: &SokoWorld, name: &str) -> BalanceSummary {
    let vendor_id = world.user(name).id;
    world.sys().payouts.balance(vendor_id).await.expect("Error fetching balance")
}

#[then(expr = "{word}'s gross sales are {int} kobo")]
async fn gross_sales(world: &mut SokoWorld, name: String, kobo: i64) {
    let balance = balance_of(world, &name).await;
    assert_eq!(balance.gross_sales, Cents::from(kobo), "Gross sales are incorrect");
}

#[then(expr = "{word}'s platform fee is {int} kobo")]
async fn platform_fee(world: &mut SokoWorld, name: String, kobo: i64) {
    let balance = balance_of(world, &name).await;
    assert_eq!(balance.platform_fee, Cents::from(kobo), "Platform fee is incorrect");
}

#[then(expr = "{word}'s available balance is {int} kobo")]
async fn available_balance(world: &mut SokoWorld, name: String, kobo: i64) {
    let balance = balance_of(world, &name).await;
    assert_eq!(balance.available, Cents::from(kobo), "Available balance is incorrect");
}

#[then(expr = "{word}'s paid out total is {int} kobo")]
async fn paid_out_total(world: &mut SokoWorld, name: String, kobo: i64) {
    let balance = balance_of(world, &name).await;
    assert_eq!(balance.paid_out, Cents::from(kobo), "Paid out total is incorrect");
}

#[then(expr = "{word}'s pending payouts hold {int} kobo")]
async fn pending_payout_hold(world: &mut SokoWorld, name: String, kobo: i64) {
    let balance = balance_of(world, &name).await;
    assert_eq!(balance.pending_payouts, Cents::from(kobo), "Pending payout hold is incorrect");
}

fn remote_status(s: &str) -> RemoteTransferStatus {
    match s {
        "Pending" => RemoteTransferStatus::Pending,
        "Processing" => RemoteTransferStatus::Processing,
        "Success" => RemoteTransferStatus::Success,
        "Failed" => RemoteTransferStatus::Failed,
        "Reversed" => RemoteTransferStatus::Reversed,
        _ => panic!("Unknown remote status {s}"),
    }
}

//--------------------------------------  Login and codes   ---------------------------------------------

#[when(expr = "{word} logs in with the seed password")]
async fn login_seed_password(world: &mut SokoWorld, name: String) {
    let email = world.user(&name).email.clone();
    let session = world.sys().auth.login(&email, SEED_PASSWORD).await.expect("Error logging in");
    world.auth_session = Some(session);
}

#[when(expr = "{word} tries to log in with password {string}")]
async fn try_login(world: &mut SokoWorld, name: String, password: String) {
    let email = world.user(&name).email.clone();
    let res = world.sys().auth.login(&email, &password).await;
    if let Some(session) = world.note_result(res) {
        world.auth_session = Some(session);
    }
}

#[when(expr = "{word} logs out")]
async fn logout(world: &mut SokoWorld, _name: String) {
    let token = world.auth_session.as_ref().expect("No session is open").token.clone();
    world.sys().auth.logout(&token).await.expect("Error logging out");
}

#[then(expr = "the session belongs to {word}")]
async fn session_belongs_to(world: &mut SokoWorld, name: String) {
    let token = world.auth_session.as_ref().expect("No session is open").token.clone();
    let user = world
        .sys()
        .auth
        .session_user(&token)
        .await
        .expect("Error checking session")
        .expect("Session is not valid");
    assert_eq!(user.user_id, world.user(&name).id, "Session belongs to someone else");
}

#[then("the session token is no longer valid")]
async fn session_token_invalid(world: &mut SokoWorld) {
    let token = world.auth_session.as_ref().expect("No session is open").token.clone();
    let user = world.sys().auth.session_user(&token).await.expect("Error checking session");
    assert!(user.is_none(), "Session is still valid");
}

#[given(expr = "{word} requested a code to verify their phone")]
#[when(expr = "{word} requests a code to verify their phone")]
async fn request_phone_code(world: &mut SokoWorld, name: String) {
    request_code(world, &name, OtpPurpose::VerifyPhone).await;
}

#[when(expr = "{word} requests a code to change their payout destination")]
async fn request_destination_code(world: &mut SokoWorld, name: String) {
    request_code(world, &name, OtpPurpose::PayoutDestination).await;
}

#[when(expr = "{word} tries to request a code to verify their phone")]
async fn try_request_phone_code(world: &mut SokoWorld, name: String) {
    let user_id = world.user(&name).id;
    let res = world.sys().auth.request_otp(user_id, OtpPurpose::VerifyPhone).await;
    world.note_result(res);
}

async fn request_code(world: &mut SokoWorld, name: &str, purpose: OtpPurpose) {
    let user_id = world.user(name).id;
    world.sys().auth.request_otp(user_id, purpose).await.expect("Error requesting code");
    let event = world.wait_for_code(user_id, world.otp_codes.len() + 1).await;
    world.otp_codes.push(event);
}

#[then(expr = "a code is delivered to {word} by SMS")]
fn code_delivered_by_sms(world: &mut SokoWorld, name: String) {
    let user_id = world.user(&name).id;
    let event = world.otp_codes.last().expect("No code was requested");
    assert_eq!(event.user_id, user_id, "Code went to the wrong user");
    assert!(event.phone.is_some(), "Code was not sent to a phone");
}

#[when(expr = "{word} submits the delivered code to verify their phone")]
#[when(expr = "{word} tries to submit the delivered code to verify their phone")]
async fn submit_phone_code(world: &mut SokoWorld, name: String) {
    let code = world.otp_codes.last().expect("No code was requested").code.clone();
    submit_code(world, &name, OtpPurpose::VerifyPhone, &code).await;
}

#[when(expr = "{word} submits delivered code number {int} to verify their phone")]
async fn submit_numbered_code(world: &mut SokoWorld, name: String, number: usize) {
    let code = world.otp_codes.get(number - 1).expect("No such code").code.clone();
    submit_code(world, &name, OtpPurpose::VerifyPhone, &code).await;
}

#[when(expr = "{word} submits a wrong code to verify their phone")]
async fn submit_wrong_code(world: &mut SokoWorld, name: String) {
    let code = wrong_code(world);
    submit_code(world, &name, OtpPurpose::VerifyPhone, &code).await;
}

#[when(expr = "{word} submits a wrong code to verify their phone {int} times")]
async fn submit_wrong_code_repeatedly(world: &mut SokoWorld, name: String, times: usize) {
    for _ in 0..times {
        let code = wrong_code(world);
        submit_code(world, &name, OtpPurpose::VerifyPhone, &code).await;
        assert!(world.last_error.is_some(), "Expected the wrong code to be rejected");
    }
}

#[when(expr = "{word} submits the delivered code to change their payout destination")]
async fn submit_destination_code(world: &mut SokoWorld, name: String) {
    let code = world.otp_codes.last().expect("No code was requested").code.clone();
    submit_code(world, &name, OtpPurpose::PayoutDestination, &code).await;
}

async fn submit_code(world: &mut SokoWorld, name: &str, purpose: OtpPurpose, code: &str) {
    let user_id = world.user(name).id;
    let res = world.sys().auth.verify_otp(user_id, purpose, code).await;
    if let Some(OtpVerification::ActionToken { token, .. }) = world.note_result(res) {
        world.action_token = Some(token);
    }
}

/// Flip every digit so the guess is always wrong but stays a six-digit code.
fn wrong_code(world: &SokoWorld) -> String {
    let code = &world.otp_codes.last().expect("No code was requested").code;
    code.chars().map(|c| char::from(b'9' - (c as u8 - b'0'))).collect()
}

#[then(expr = "{word}'s phone is verified")]
async fn phone_is_verified(world: &mut SokoWorld, name: String) {
    let user_id = world.user(&name).id;
    let user = world.sys().accounts.profile(user_id).await.expect("Error fetching profile");
    assert!(user.phone_verified, "Phone is not verified");
}

#[then(expr = "{word} receives an action token")]
fn receives_action_token(world: &mut SokoWorld, _name: String) {
    assert!(world.action_token.is_some(), "No action token was issued");
}

#[when(expr = "{word} redeems the action token")]
#[when(expr = "{word} tries to redeem the action token again")]
async fn redeem_action_token(world: &mut SokoWorld, name: String) {
    let user_id = world.user(&name).id;
    let token = world.action_token.clone().expect("No action token was issued");
    let res = world.sys().auth.consume_action_token(user_id, OtpPurpose::PayoutDestination, &token).await;
    world.note_result(res);
}

#[given(expr = "the active code for {word} expired")]
async fn expire_active_code(world: &mut SokoWorld, name: String) {
    let user_id = world.user(&name).id;
    sqlx::query("UPDATE otp_challenges SET expires_at = datetime('now', '-60 seconds') WHERE user_id = $1")
        .bind(user_id)
        .execute(world.db().pool())
        .await
        .expect("Error expiring code");
}

#[given(expr = "the last code for {word} was issued {int} seconds ago")]
async fn backdate_code_issue(world: &mut SokoWorld, name: String, seconds: i64) {
    let user_id = world.user(&name).id;
    sqlx::query("UPDATE otp_challenges SET created_at = datetime('now', '-' || $1 || ' seconds') WHERE user_id = $2")
        .bind(seconds)
        .bind(user_id)
        .execute(world.db().pool())
        .await
        .expect("Error backdating code");
}
