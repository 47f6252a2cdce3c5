use chrono::{DateTime, Duration, Utc};
use mockall::mock;
use soko_common::Cents;
use soko_engine::{
    db_types::{
        AuditEntry,
        BankAccount,
        Dispute,
        DisputeMessage,
        ItemStatusType,
        ItemStatusUpdate,
        NewBankAccount,
        NewDispute,
        NewNotification,
        NewOrder,
        NewUser,
        Notification,
        Order,
        OrderId,
        OrderItem,
        OtpChallenge,
        OtpPurpose,
        Payout,
        PayoutAttempt,
        PayoutStatusType,
        SessionUser,
        User,
    },
    dispute_objects::DisputeQueryFilter,
    order_objects::OrderQueryFilter,
    payout_objects::{BalanceSummary, PayoutQueryFilter},
    traits::{
        AccountError,
        AccountManagement,
        AuthApiError,
        AuthManagement,
        BankInfo,
        DisputeError,
        DisputeManagement,
        OrderFlowError,
        OrderManagement,
        PayoutError,
        PayoutManagement,
        RemoteTransferStatus,
        ResolvedDestination,
        SweepResult,
        TransferAck,
        TransferGateway,
        TransferGatewayError,
        TransferInstruction,
    },
};

mock! {
    pub Backend {}

    impl Clone for Backend {
        fn clone(&self) -> Self;
    }

    impl AuthManagement for Backend {
        async fn create_user(&self, user: NewUser) -> Result<User, AuthApiError>;
        async fn fetch_user_with_credentials(&self, email: &str) -> Result<Option<(User, String)>, AuthApiError>;
        async fn create_session(&self, user_id: i64, token_hash: &str, ttl: Duration) -> Result<DateTime<Utc>, AuthApiError>;
        async fn fetch_session_user(&self, token_hash: &str) -> Result<Option<SessionUser>, AuthApiError>;
        async fn destroy_session(&self, token_hash: &str) -> Result<(), AuthApiError>;
        async fn create_otp_challenge(
            &self,
            user_id: i64,
            purpose: OtpPurpose,
            otp_hash: &str,
            ttl: Duration,
            cooldown: Duration,
        ) -> Result<OtpChallenge, AuthApiError>;
        async fn verify_otp_challenge(
            &self,
            user_id: i64,
            purpose: OtpPurpose,
            candidate_hash: &str,
            max_attempts: i64,
        ) -> Result<(), AuthApiError>;
        async fn issue_action_token(
            &self,
            user_id: i64,
            purpose: OtpPurpose,
            token_hash: &str,
            ttl: Duration,
        ) -> Result<DateTime<Utc>, AuthApiError>;
        async fn consume_action_token(&self, user_id: i64, purpose: OtpPurpose, token_hash: &str) -> Result<(), AuthApiError>;
        async fn purge_expired_auth_records(&self, now: DateTime<Utc>) -> Result<u64, AuthApiError>;
    }

    impl AccountManagement for Backend {
        async fn fetch_user(&self, user_id: i64) -> Result<Option<User>, AccountError>;
        async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, AccountError>;
        async fn update_phone(&self, user_id: i64, phone: &str) -> Result<User, AccountError>;
        async fn mark_phone_verified(&self, user_id: i64) -> Result<User, AccountError>;
        async fn fetch_bank_accounts(&self, vendor_id: i64) -> Result<Vec<BankAccount>, AccountError>;
        async fn fetch_primary_bank_account(&self, vendor_id: i64) -> Result<Option<BankAccount>, AccountError>;
        async fn add_bank_account(&self, vendor_id: i64, account: NewBankAccount) -> Result<BankAccount, AccountError>;
        async fn set_primary_bank_account(&self, vendor_id: i64, account_id: i64) -> Result<BankAccount, AccountError>;
        async fn remove_bank_account(&self, vendor_id: i64, account_id: i64) -> Result<BankAccount, AccountError>;
        async fn fetch_notifications(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>, AccountError>;
        async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, AccountError>;
        async fn mark_notification_read(&self, user_id: i64, notification_id: i64) -> Result<Notification, AccountError>;
        async fn fetch_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>, AccountError>;
    }

    impl OrderManagement for Backend {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewOrder) -> Result<(Order, Vec<OrderItem>), OrderFlowError>;
        async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;
        async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, OrderFlowError>;
        async fn fetch_orders_for_buyer(&self, buyer_id: i64) -> Result<Vec<Order>, OrderFlowError>;
        async fn fetch_items_for_vendor(&self, vendor_id: i64) -> Result<Vec<OrderItem>, OrderFlowError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;
        async fn update_item_status(
            &self,
            item_id: i64,
            vendor_id: i64,
            status: ItemStatusType,
        ) -> Result<ItemStatusUpdate, OrderFlowError>;
        async fn complete_order(&self, order_id: &OrderId, buyer_id: i64) -> Result<Order, OrderFlowError>;
        async fn auto_complete_orders(&self, grace_period: Duration) -> Result<SweepResult, OrderFlowError>;
    }

    impl DisputeManagement for Backend {
        async fn create_dispute(
            &self,
            raised_by: i64,
            dispute: NewDispute,
            window: Duration,
        ) -> Result<(Dispute, Order), DisputeError>;
        async fn fetch_dispute(&self, dispute_id: i64) -> Result<Option<Dispute>, DisputeError>;
        async fn search_disputes(&self, query: DisputeQueryFilter) -> Result<Vec<Dispute>, DisputeError>;
        async fn fetch_dispute_messages(&self, dispute_id: i64) -> Result<Vec<DisputeMessage>, DisputeError>;
        async fn add_dispute_message(&self, dispute_id: i64, author: &SessionUser, body: String) -> Result<DisputeMessage, DisputeError>;
        async fn resolve_dispute(&self, dispute_id: i64, admin_id: i64, resolution: String) -> Result<Dispute, DisputeError>;
        async fn close_dispute(&self, dispute_id: i64, actor: &SessionUser) -> Result<Dispute, DisputeError>;
    }

    impl PayoutManagement for Backend {
        async fn vendor_balance(&self, vendor_id: i64, fee_basis_points: i64) -> Result<BalanceSummary, PayoutError>;
        async fn create_payout(&self, vendor_id: i64, amount: Cents, fee_basis_points: i64) -> Result<Payout, PayoutError>;
        async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, PayoutError>;
        async fn fetch_payout_by_reference(&self, reference: &str) -> Result<Option<Payout>, PayoutError>;
        async fn search_payouts(&self, query: PayoutQueryFilter) -> Result<Vec<Payout>, PayoutError>;
        async fn fetch_payout_attempts(&self, payout_id: i64) -> Result<Vec<PayoutAttempt>, PayoutError>;
        async fn mark_payout_submitted(&self, payout_id: i64, transfer_code: &str) -> Result<Payout, PayoutError>;
        async fn mark_payout_failed(&self, payout_id: i64, reason: &str) -> Result<Payout, PayoutError>;
        async fn begin_payout_retry(&self, payout_id: i64, admin_id: i64) -> Result<Payout, PayoutError>;
        async fn cancel_payout(&self, payout_id: i64, actor: &SessionUser) -> Result<Payout, PayoutError>;
        async fn reconcile_payout(&self, reference: &str, status: PayoutStatusType, reason: Option<String>) -> Result<Payout, PayoutError>;
    }
}

mock! {
    pub Gateway {}

    impl Clone for Gateway {
        fn clone(&self) -> Self;
    }

    impl TransferGateway for Gateway {
        async fn list_banks(&self) -> Result<Vec<BankInfo>, TransferGatewayError>;
        async fn resolve_account(&self, bank_code: &str, account_number: &str) -> Result<ResolvedDestination, TransferGatewayError>;
        async fn register_recipient(
            &self,
            account_name: &str,
            bank_code: &str,
            account_number: &str,
        ) -> Result<String, TransferGatewayError>;
        async fn initiate_transfer(&self, instruction: &TransferInstruction) -> Result<TransferAck, TransferGatewayError>;
        async fn verify_transfer(&self, reference: &str) -> Result<RemoteTransferStatus, TransferGatewayError>;
    }
}
