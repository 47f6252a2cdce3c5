//! Canned data for integration tests: users in every role, payout-ready vendors, and orders at
//! various points in the lifecycle. Everything goes through the public trait methods so the
//! fixtures exercise the same paths production callers do.

use soko_common::Cents;

use crate::{
    db_types::{ItemStatusType, NewBankAccount, NewOrder, NewOrderItem, NewUser, Order, OrderItem, Role, User},
    helpers::passwords::hash_password,
    traits::{AccountManagement, AuthManagement, OrderManagement},
    SqliteDatabase,
};

pub const SEED_PASSWORD: &str = "correct-horse-battery-staple";

pub async fn seed_user(db: &SqliteDatabase, email: &str, name: &str, role: Role) -> User {
    let hash = hash_password(SEED_PASSWORD).expect("Error hashing seed password");
    db.create_user(NewUser::new(email, name, hash, role)).await.expect("Error creating seed user")
}

/// A vendor that can receive payouts: verified phone and a primary bank account with a
/// provider recipient attached.
pub async fn payout_ready_vendor(db: &SqliteDatabase, email: &str, name: &str) -> User {
    let vendor = seed_user(db, email, name, Role::Vendor).await;
    db.update_phone(vendor.id, "+2348012345678").await.expect("Error setting vendor phone");
    let vendor = db.mark_phone_verified(vendor.id).await.expect("Error verifying vendor phone");
    let account = NewBankAccount::new("058", "Guaranty Trust Bank", "0123456789", name)
        .with_recipient_code(format!("RCP_{}", vendor.id));
    db.add_bank_account(vendor.id, account).await.expect("Error adding vendor bank account");
    vendor
}

/// Place an order holding one line item per `(vendor_id, quantity, unit_price)` entry.
pub async fn place_order(db: &SqliteDatabase, buyer_id: i64, items: &[(i64, i64, Cents)]) -> (Order, Vec<OrderItem>) {
    let mut order = NewOrder::new(buyer_id);
    for (i, (vendor_id, quantity, unit_price)) in items.iter().enumerate() {
        order = order.with_item(NewOrderItem::new(*vendor_id, format!("Item {}", i + 1), *quantity, *unit_price));
    }
    db.insert_order(order).await.expect("Error inserting seed order")
}

/// Walk every item to `Delivered` through the normal vendor updates and return the order,
/// which is `Delivered` afterwards.
pub async fn deliver_order(db: &SqliteDatabase, items: &[OrderItem]) -> Order {
    let mut last = None;
    for item in items {
        let update = db
            .update_item_status(item.id, item.vendor_id, ItemStatusType::Delivered)
            .await
            .expect("Error delivering seed item");
        last = Some(update.order);
    }
    last.expect("deliver_order needs at least one item")
}

/// A confirmed single-item sale, leaving `vendor_id` with `quantity * unit_price` of gross
/// completed sales.
pub async fn completed_sale(
    db: &SqliteDatabase,
    buyer_id: i64,
    vendor_id: i64,
    quantity: i64,
    unit_price: Cents,
) -> Order {
    let (order, items) = place_order(db, buyer_id, &[(vendor_id, quantity, unit_price)]).await;
    deliver_order(db, &items).await;
    db.complete_order(&order.order_id, buyer_id).await.expect("Error completing seed order")
}
