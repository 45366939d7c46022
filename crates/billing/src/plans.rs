//! Billing plans
//!
//! Organizations are on one of three plans. The plan drives the synthesized
//! subscription price and the default monthly call limit for new orgs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BillingError;

/// Monthly call limit applied when an organization has none set
pub const DEFAULT_MONTHLY_CALL_LIMIT: i32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Starter,
    Professional,
    Enterprise,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Starter, Plan::Professional, Plan::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Starter => "starter",
            Plan::Professional => "professional",
            Plan::Enterprise => "enterprise",
        }
    }

    /// Flat monthly subscription price in USD
    pub fn monthly_price_usd(&self) -> f64 {
        match self {
            Plan::Starter => 29.0,
            Plan::Professional => 99.0,
            Plan::Enterprise => 299.0,
        }
    }

    pub fn default_monthly_call_limit(&self) -> i32 {
        match self {
            Plan::Starter => DEFAULT_MONTHLY_CALL_LIMIT,
            Plan::Professional => 10_000,
            Plan::Enterprise => 100_000,
        }
    }

    /// Interpret a plan column value.
    ///
    /// Rows predate the enum and may hold null or legacy strings. Only the
    /// exact column values count; anything else is treated as starter.
    /// Use [`FromStr`] for user input, which is forgiving about case.
    pub fn from_db(value: Option<&str>) -> Plan {
        match value {
            Some("professional") => Plan::Professional,
            Some("enterprise") => Plan::Enterprise,
            _ => Plan::Starter,
        }
    }
}

impl FromStr for Plan {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starter" => Ok(Plan::Starter),
            "professional" => Ok(Plan::Professional),
            "enterprise" => Ok(Plan::Enterprise),
            other => Err(BillingError::InvalidPlan(format!(
                "'{}' (expected starter, professional or enterprise)",
                other
            ))),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prices() {
        assert_eq!(Plan::Starter.monthly_price_usd(), 29.0);
        assert_eq!(Plan::Professional.monthly_price_usd(), 99.0);
        assert_eq!(Plan::Enterprise.monthly_price_usd(), 299.0);
    }

    #[test]
    fn test_plan_parse_is_case_insensitive() {
        assert_eq!("Enterprise".parse::<Plan>().unwrap(), Plan::Enterprise);
        assert_eq!(" professional ".parse::<Plan>().unwrap(), Plan::Professional);
    }

    #[test]
    fn test_plan_parse_rejects_unknown() {
        let err = "gold".parse::<Plan>().unwrap_err();
        assert!(matches!(err, BillingError::InvalidPlan(_)));
    }

    #[test]
    fn test_from_db_defaults_to_starter() {
        assert_eq!(Plan::from_db(None), Plan::Starter);
        assert_eq!(Plan::from_db(Some("legacy_pro")), Plan::Starter);
        assert_eq!(Plan::from_db(Some("enterprise")), Plan::Enterprise);
    }

    #[test]
    fn test_from_db_is_exact() {
        assert_eq!(Plan::from_db(Some("Enterprise")), Plan::Starter);
        assert_eq!(Plan::from_db(Some(" professional")), Plan::Starter);
        assert_eq!(Plan::from_db(Some("Enterprise")).monthly_price_usd(), 29.0);
    }

    #[test]
    fn test_plan_serde_lowercase() {
        let json = serde_json::to_string(&Plan::Professional).unwrap();
        assert_eq!(json, "\"professional\"");
        let plan: Plan = serde_json::from_str("\"starter\"").unwrap();
        assert_eq!(plan, Plan::Starter);
    }
}
