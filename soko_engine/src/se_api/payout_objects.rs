use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use soko_common::Cents;

use crate::db_types::{BankAccount, Payout, PayoutAttempt, PayoutStatusType};

/// A vendor's money position. All figures are in kobo.
///
/// `available` is what a new payout may draw on:
/// `gross_sales - platform_fee - paid_out - pending_payouts`. Sales only count once their
/// order is `Completed`, so a freshly opened dispute shrinks `gross_sales` (and with it
/// `available`) until it settles. That can legitimately push `available` negative when
/// payouts are already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub gross_sales: Cents,
    pub platform_fee: Cents,
    pub net_sales: Cents,
    pub paid_out: Cents,
    pub pending_payouts: Cents,
    pub available: Cents,
}

impl BalanceSummary {
    /// Assemble the summary from the three stored aggregates. The fee is rounded down, in the
    /// vendor's favour.
    pub fn compute(gross_sales: Cents, paid_out: Cents, pending_payouts: Cents, fee_basis_points: i64) -> Self {
        let platform_fee = gross_sales.fee_portion(fee_basis_points);
        let net_sales = gross_sales - platform_fee;
        let available = net_sales - paid_out - pending_payouts;
        Self { gross_sales, platform_fee, net_sales, paid_out, pending_payouts, available }
    }

    pub fn can_cover(&self, amount: Cents) -> bool {
        amount.is_positive() && amount <= self.available
    }
}

impl Display for BalanceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "gross {}, fee {}, paid out {}, in flight {}, available {}",
            self.gross_sales, self.platform_fee, self.paid_out, self.pending_payouts, self.available
        )
    }
}

/// Everything the vendor dashboard needs in one round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutOverview {
    pub balance: BalanceSummary,
    pub payout_destination: Option<BankAccount>,
    pub recent_payouts: Vec<Payout>,
}

/// A payout with its full attempt history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutDetail {
    pub payout: Payout,
    pub attempts: Vec<PayoutAttempt>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayoutQueryFilter {
    pub vendor_id: Option<i64>,
    pub reference: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<PayoutStatusType>>,
    pub limit: Option<i64>,
}

impl PayoutQueryFilter {
    pub fn with_vendor_id(mut self, vendor_id: i64) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn with_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_status(mut self, status: PayoutStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vendor_id.is_none() &&
            self.reference.is_none() &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.status.is_none() &&
            self.limit.is_none()
    }
}

impl Display for PayoutQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(vendor_id) = &self.vendor_id {
            write!(f, "vendor_id: {vendor_id}. ")?;
        }
        if let Some(reference) = &self.reference {
            write!(f, "reference: {reference}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        if let Some(limit) = &self.limit {
            write!(f, "limit: {limit}. ")?;
        }
        Ok(())
    }
}
