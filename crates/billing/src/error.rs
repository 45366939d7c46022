//! Billing errors

use uuid::Uuid;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Organization not found: {0}")]
    OrganizationNotFound(Uuid),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient credits for organization {0}")]
    InsufficientCredits(Uuid),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Unexpected stored procedure result: {0}")]
    UnexpectedResult(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BillingError {
    /// True when the error was caused by caller input rather than the backend
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BillingError::OrganizationNotFound(_)
                | BillingError::InvalidPlan(_)
                | BillingError::InvalidAmount(_)
                | BillingError::InsufficientCredits(_)
                | BillingError::CallNotFound(_)
        )
    }
}
