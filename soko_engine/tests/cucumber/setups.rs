use cucumber::given;
use soko_engine::{
    db_types::Role,
    test_utils::fixtures::{payout_ready_vendor, seed_user},
    traits::AccountManagement,
};

use crate::cucumber::{soko_world::MarketplaceSystem, SokoWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut SokoWorld) {
    let system = MarketplaceSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a buyer called {word}")]
async fn seed_buyer(world: &mut SokoWorld, name: String) {
    seed(world, name, Role::Buyer).await;
}

#[given(expr = "a vendor called {word}")]
async fn seed_vendor(world: &mut SokoWorld, name: String) {
    seed(world, name, Role::Vendor).await;
}

#[given(expr = "an admin called {word}")]
async fn seed_admin(world: &mut SokoWorld, name: String) {
    seed(world, name, Role::Admin).await;
}

/// A vendor with a verified phone and a primary bank account, able to request payouts.
#[given(expr = "a payout-ready vendor called {word}")]
async fn seed_payout_ready_vendor(world: &mut SokoWorld, name: String) {
    let vendor = payout_ready_vendor(world.db(), &email_for(&name), &name).await;
    world.users.insert(name, vendor);
}

/// A vendor with a phone number on file that has not been verified yet.
#[given(expr = "a vendor called {word} with phone {word}")]
async fn seed_vendor_with_phone(world: &mut SokoWorld, name: String, phone: String) {
    let vendor = seed_user(world.db(), &email_for(&name), &name, Role::Vendor).await;
    let vendor = world.db().update_phone(vendor.id, &phone).await.expect("Error setting vendor phone");
    world.users.insert(name, vendor);
}

#[given(expr = "a vendor called {word} with a verified phone")]
async fn seed_vendor_with_verified_phone(world: &mut SokoWorld, name: String) {
    let vendor = seed_user(world.db(), &email_for(&name), &name, Role::Vendor).await;
    world.db().update_phone(vendor.id, "+2348012345678").await.expect("Error setting vendor phone");
    let vendor = world.db().mark_phone_verified(vendor.id).await.expect("Error verifying vendor phone");
    world.users.insert(name, vendor);
}

async fn seed(world: &mut SokoWorld, name: String, role: Role) {
    let user = seed_user(world.db(), &email_for(&name), &name, role).await;
    world.users.insert(name, user);
}

fn email_for(name: &str) -> String {
    format!("{}@test.soko.ng", name.to_lowercase())
}
