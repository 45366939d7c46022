// Billing crate clippy configuration
#![allow(clippy::too_many_arguments)] // Ledger inserts carry every column explicitly
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! KnightCall Billing Module
//!
//! Prepaid credits, plans and per-call charging for calling organizations.
//!
//! ## Features
//!
//! - **Credit Ledger**: Add credits with an append-only transaction record
//! - **Plans**: Starter, professional and enterprise pricing
//! - **Subscriptions**: One synthesized subscription per organization
//! - **Auto-Recharge**: Top up organizations that fall below their threshold
//! - **Call Costs**: Settle finished calls through the database cost procedure
//! - **Invariants**: Read-only ledger consistency checks

pub mod auto_recharge;
pub mod call_costs;
pub mod credits;
pub mod error;
pub mod invariants;
pub mod plans;
pub mod subscriptions;

#[cfg(test)]
mod edge_case_tests;

// Auto-recharge
pub use auto_recharge::{AutoRechargeService, RechargeCandidate, RechargeOutcome};

// Call costs
pub use call_costs::{CallCostService, CallCostSettlement, UnbilledCall};

// Credits
pub use credits::{
    apply_amount, validate_credit_amount, CreditAddition, CreditAdditionResult, CreditLedgerEntry,
    CreditReference, CreditService, LedgerTotals, TransactionType, DEFAULT_ADDITION_DESCRIPTION,
    INITIAL_ALLOCATION_DESCRIPTION,
};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Plans
pub use plans::{Plan, DEFAULT_MONTHLY_CALL_LIMIT};

// Subscriptions
pub use subscriptions::{
    AutoRechargeUpdate, OrgBillingRow, Subscription, SubscriptionService, SubscriptionStatus,
    SubscriptionSummary,
};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub auto_recharge: AutoRechargeService,
    pub call_costs: CallCostService,
    pub credits: CreditService,
    pub subscriptions: SubscriptionService,
    pool: PgPool,
}

impl BillingService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            auto_recharge: AutoRechargeService::new(pool.clone()),
            call_costs: CallCostService::new(pool.clone()),
            credits: CreditService::new(pool.clone()),
            subscriptions: SubscriptionService::new(pool.clone()),
            pool,
        }
    }

    /// Checker sharing this service's pool
    pub fn invariants(&self) -> InvariantChecker {
        InvariantChecker::new(self.pool.clone())
    }
}
