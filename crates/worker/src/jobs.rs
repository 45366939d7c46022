//! Scheduled job bodies
//!
//! Each job logs its own results and never returns an error to the
//! scheduler; a failed run is retried on the next tick.

use knightcall_billing::{BillingError, BillingService, CallCostSettlement, RechargeOutcome};
use tracing::{error, info, warn};

/// Tally of one settlement sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettlementReport {
    pub settled: usize,
    pub already_billed: usize,
    pub insufficient_credits: usize,
    pub declined: usize,
    pub errors: usize,
}

impl SettlementReport {
    pub fn record(&mut self, result: &Result<CallCostSettlement, BillingError>) {
        match result {
            Ok(s) if s.success && s.already_billed => self.already_billed += 1,
            Ok(s) if s.success => self.settled += 1,
            Ok(s) if s.is_insufficient_credits() => self.insufficient_credits += 1,
            Ok(_) => self.declined += 1,
            Err(_) => self.errors += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.settled + self.already_billed + self.insufficient_credits + self.declined + self.errors
    }
}

/// Settle ended calls that have not been charged yet
pub async fn settle_unbilled_calls(billing: &BillingService, batch_size: i64) -> SettlementReport {
    let mut report = SettlementReport::default();

    let calls = match billing.call_costs.unbilled_calls(batch_size).await {
        Ok(calls) => calls,
        Err(e) => {
            error!(error = %e, "Failed to load unbilled calls");
            return report;
        }
    };

    if calls.is_empty() {
        return report;
    }

    for call in &calls {
        let result = billing.call_costs.settle(&call.external_call_id).await;
        if let Err(e) = &result {
            error!(
                call_id = %call.id,
                external_call_id = %call.external_call_id,
                error = %e,
                "Call settlement failed"
            );
        }
        report.record(&result);
    }

    info!(
        settled = report.settled,
        already_billed = report.already_billed,
        insufficient_credits = report.insufficient_credits,
        declined = report.declined,
        errors = report.errors,
        "Call settlement cycle complete"
    );
    report
}

/// Counts of recharged and failed organizations
pub fn summarize_recharges(outcomes: &[RechargeOutcome]) -> (usize, usize) {
    outcomes.iter().fold((0, 0), |(ok, failed), outcome| match outcome {
        RechargeOutcome::Recharged { .. } => (ok + 1, failed),
        RechargeOutcome::Failed { .. } => (ok, failed + 1),
    })
}

pub async fn run_auto_recharge(billing: &BillingService) {
    match billing.auto_recharge.run().await {
        Ok(outcomes) => {
            let (recharged, failed) = summarize_recharges(&outcomes);
            if recharged + failed > 0 {
                info!(recharged, failed, "Auto-recharge cycle complete");
            }
        }
        Err(e) => error!(error = %e, "Auto-recharge cycle failed"),
    }
}

pub async fn check_ledger_invariants(billing: &BillingService) {
    match billing.invariants().run_all_checks().await {
        Ok(summary) if summary.healthy => {
            info!(checks_run = summary.checks_run, "Ledger invariants hold");
        }
        Ok(summary) => {
            for violation in &summary.violations {
                warn!(
                    invariant = %violation.invariant,
                    severity = %violation.severity,
                    org_ids = ?violation.org_ids,
                    "{}",
                    violation.description
                );
            }
            error!(
                checks_failed = summary.checks_failed,
                violations = summary.violations.len(),
                "Ledger invariant violations detected"
            );
        }
        Err(e) => error!(error = %e, "Ledger invariant check failed to run"),
    }
}
