use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::Duration;
use cucumber::World;
use log::*;
use soko_engine::{
    db_types::{Dispute, Order, OrderId, OrderItem, Payout, SessionUser, User},
    dispute_objects::DisputeQueryFilter,
    events::{EventHandlers, EventHooks, OtpIssuedEvent},
    se_api::auth_api::{AuthSession, OtpSettings},
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    traits::{
        BankInfo,
        DisputeManagement,
        OrderManagement,
        PayoutManagement,
        RemoteTransferStatus,
        ResolvedDestination,
        TransferAck,
        TransferGateway,
        TransferGatewayError,
        TransferInstruction,
    },
    AccountApi,
    AuthApi,
    DisputeApi,
    OrderFlowApi,
    PayoutApi,
    SqliteDatabase,
};
use tokio::time::sleep;

/// Dispute window every scenario runs with.
pub const TEST_WINDOW_HOURS: i64 = 48;
/// 5% platform commission.
pub const TEST_FEE_BASIS_POINTS: i64 = 500;
pub const TEST_PEPPER: &str = "cucumber-pepper";

#[derive(Default, Debug, World)]
pub struct SokoWorld {
    pub system: Option<MarketplaceSystem>,
    /// Seeded users, keyed by first name.
    pub users: HashMap<String, User>,
    /// Ids of payouts created during the scenario, oldest first.
    pub payout_ids: Vec<i64>,
    /// Message of the most recent call that was allowed to fail.
    pub last_error: Option<String>,
    /// Codes requested during the scenario, in the order they were delivered.
    pub otp_codes: Vec<OtpIssuedEvent>,
    pub auth_session: Option<AuthSession>,
    pub action_token: Option<String>,
    pub last_sweep: Option<usize>,
}

#[derive(Debug)]
pub struct MarketplaceSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub disputes: DisputeApi<SqliteDatabase>,
    pub payouts: PayoutApi<SqliteDatabase, StubGateway>,
    pub auth: AuthApi<SqliteDatabase>,
    pub accounts: AccountApi<SqliteDatabase>,
    pub gateway: StubGateway,
    /// Codes the OTP delivery hook has captured, in issue order.
    pub otp_outbox: Arc<Mutex<Vec<OtpIssuedEvent>>>,
}

impl MarketplaceSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        sleep(std::time::Duration::from_millis(50)).await;
        let otp_outbox = Arc::new(Mutex::new(Vec::new()));
        let outbox = Arc::clone(&otp_outbox);
        let mut hooks = EventHooks::default();
        hooks.on_otp_issued(move |ev| {
            let outbox = Arc::clone(&outbox);
            Box::pin(async move {
                outbox.lock().unwrap().push(ev);
            })
        });
        let handlers = EventHandlers::new(8, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let gateway = StubGateway::default();
        let settings = OtpSettings { pepper: TEST_PEPPER.into(), ..OtpSettings::default() };
        let orders = OrderFlowApi::new(db.clone(), producers.clone());
        let disputes = DisputeApi::new(db.clone(), Duration::hours(TEST_WINDOW_HOURS), producers.clone());
        let payouts = PayoutApi::new(db.clone(), gateway.clone(), TEST_FEE_BASIS_POINTS, producers.clone());
        let auth = AuthApi::new(db.clone(), settings, producers.clone());
        let accounts = AccountApi::new(db.clone());
        Self { db_path: url, db, orders, disputes, payouts, auth, accounts, gateway, otp_outbox }
    }
}

impl SokoWorld {
    pub fn sys(&self) -> &MarketplaceSystem {
        self.system.as_ref().expect("Marketplace system not initialised")
    }

    pub fn db(&self) -> &SqliteDatabase {
        &self.sys().db
    }

    pub fn user(&self, name: &str) -> &User {
        self.users.get(name).unwrap_or_else(|| panic!("No seeded user called {name}"))
    }

    pub fn session(&self, name: &str) -> SessionUser {
        let user = self.user(name);
        SessionUser {
            user_id: user.id,
            role: user.role,
            display_name: user.display_name.clone(),
            email: user.email.clone(),
        }
    }

    pub async fn order(&self, order_id: &OrderId) -> Order {
        self.db()
            .fetch_order(order_id)
            .await
            .expect("Error fetching order")
            .unwrap_or_else(|| panic!("Order {order_id} does not exist"))
    }

    pub async fn items(&self, order_id: &OrderId) -> Vec<OrderItem> {
        self.db().fetch_order_items(order_id).await.expect("Error fetching order items")
    }

    /// The order's `index`th line item, 1-based, in insertion order.
    pub async fn item(&self, order_id: &OrderId, index: usize) -> OrderItem {
        self.items(order_id)
            .await
            .into_iter()
            .nth(index - 1)
            .unwrap_or_else(|| panic!("Order {order_id} has no item {index}"))
    }

    /// The newest dispute raised against the order.
    pub async fn dispute_on(&self, order_id: &OrderId) -> Dispute {
        let query = DisputeQueryFilter::default().with_order_id(order_id.clone());
        let disputes = self.db().search_disputes(query).await.expect("Error searching disputes");
        disputes.into_iter().max_by_key(|d| d.id).unwrap_or_else(|| panic!("No dispute on order {order_id}"))
    }

    pub async fn payout(&self, payout_id: i64) -> Payout {
        self.db()
            .fetch_payout(payout_id)
            .await
            .expect("Error fetching payout")
            .unwrap_or_else(|| panic!("Payout {payout_id} does not exist"))
    }

    pub async fn latest_payout(&self) -> Payout {
        let id = *self.payout_ids.last().expect("No payout created in this scenario");
        self.payout(id).await
    }

    /// Record the outcome of a call that a scenario is allowed to see fail. Errors land in
    /// `last_error` for the "fails with" assertion steps.
    pub fn note_result<T, E: std::fmt::Display>(&mut self, res: Result<T, E>) -> Option<T> {
        match res {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            },
            Err(e) => {
                self.last_error = Some(e.to_string());
                None
            },
        }
    }

    /// Wait for the user's `count`th code to come through the delivery hook. Delivery runs on
    /// the event channel, so a freshly requested code can trail the API call slightly.
    pub async fn wait_for_code(&self, user_id: i64, count: usize) -> OtpIssuedEvent {
        let outbox = Arc::clone(&self.sys().otp_outbox);
        for _ in 0..40 {
            {
                let events = outbox.lock().unwrap();
                let delivered = events.iter().filter(|ev| ev.user_id == user_id).collect::<Vec<_>>();
                if delivered.len() >= count {
                    return delivered[count - 1].clone();
                }
            }
            sleep(std::time::Duration::from_millis(25)).await;
        }
        panic!("No code delivered for user {user_id} after 1s");
    }
}

/// In-memory stand-in for the transfer provider. Scenarios flip the mode to script
/// acceptances, rejections and outages, and inspect the instructions it was handed.
#[derive(Clone, Debug, Default)]
pub struct StubGateway {
    state: Arc<Mutex<GatewayState>>,
}

#[derive(Debug, Default)]
struct GatewayState {
    mode: GatewayMode,
    remote_status: Option<RemoteTransferStatus>,
    transfers: Vec<TransferInstruction>,
}

#[derive(Clone, Debug, Default)]
enum GatewayMode {
    #[default]
    Accept,
    Reject(String),
    Unavailable(String),
}

impl StubGateway {
    pub fn accept_transfers(&self) {
        self.state.lock().unwrap().mode = GatewayMode::Accept;
    }

    pub fn reject_transfers(&self, reason: &str) {
        self.state.lock().unwrap().mode = GatewayMode::Reject(reason.into());
    }

    pub fn go_offline(&self, reason: &str) {
        self.state.lock().unwrap().mode = GatewayMode::Unavailable(reason.into());
    }

    /// What `verify_transfer` reports for every reference from now on.
    pub fn report_status(&self, status: RemoteTransferStatus) {
        self.state.lock().unwrap().remote_status = Some(status);
    }

    pub fn transfer_count(&self) -> usize {
        self.state.lock().unwrap().transfers.len()
    }

    pub fn last_transfer(&self) -> Option<TransferInstruction> {
        self.state.lock().unwrap().transfers.last().cloned()
    }
}

impl TransferGateway for StubGateway {
    async fn list_banks(&self) -> Result<Vec<BankInfo>, TransferGatewayError> {
        Ok(vec![BankInfo { name: "Guaranty Trust Bank".into(), code: "058".into() }])
    }

    async fn resolve_account(
        &self,
        _bank_code: &str,
        account_number: &str,
    ) -> Result<ResolvedDestination, TransferGatewayError> {
        if let GatewayMode::Unavailable(reason) = &self.state.lock().unwrap().mode {
            return Err(TransferGatewayError::Unavailable(reason.clone()));
        }
        Ok(ResolvedDestination { account_name: format!("Account {account_number}") })
    }

    async fn register_recipient(
        &self,
        _account_name: &str,
        _bank_code: &str,
        account_number: &str,
    ) -> Result<String, TransferGatewayError> {
        if let GatewayMode::Unavailable(reason) = &self.state.lock().unwrap().mode {
            return Err(TransferGatewayError::Unavailable(reason.clone()));
        }
        Ok(format!("RCP_{account_number}"))
    }

    async fn initiate_transfer(&self, instruction: &TransferInstruction) -> Result<TransferAck, TransferGatewayError> {
        let mut state = self.state.lock().unwrap();
        let mode = state.mode.clone();
        match mode {
            GatewayMode::Reject(reason) => Err(TransferGatewayError::Rejected(reason)),
            GatewayMode::Unavailable(reason) => Err(TransferGatewayError::Unavailable(reason)),
            GatewayMode::Accept => {
                state.transfers.push(instruction.clone());
                let transfer_code = format!("TRF_{}", state.transfers.len());
                Ok(TransferAck { transfer_code, status: RemoteTransferStatus::Pending })
            },
        }
    }

    async fn verify_transfer(&self, _reference: &str) -> Result<RemoteTransferStatus, TransferGatewayError> {
        let state = self.state.lock().unwrap();
        if let GatewayMode::Unavailable(reason) = &state.mode {
            return Err(TransferGatewayError::Unavailable(reason.clone()));
        }
        Ok(state.remote_status.unwrap_or(RemoteTransferStatus::Pending))
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
