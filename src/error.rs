use rust_decimal::Decimal;
use thiserror::Error;

/// Crate-wide error type covering domain failures and infrastructure faults.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("'{voter}' has already voted on '{applicant}'")]
    AlreadyVoted { voter: String, applicant: String },

    #[error("'{sender}' has already given a strike to '{receiver}'")]
    AlreadyStruck { sender: String, receiver: String },

    #[error("'{delegator}' has already delegated their endorsing power")]
    AlreadyDelegated { delegator: String },

    #[error("delegating to '{delegatee}' would create a cycle")]
    CycleDetected { delegatee: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("'{member}' is not a member of group '{group}'")]
    NotAMember { member: String, group: String },

    #[error("no usable exchange route: {0}")]
    InvalidRoute(String),

    #[error("{0} has expired")]
    Expired(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// True for errors that are caller mistakes rather than system faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            AppError::Database(_) | AppError::Serialization(_) | AppError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_funds_message() {
        let err = AppError::InsufficientFunds {
            requested: dec!(105),
            available: dec!(100),
        };
        assert_eq!(
            err.to_string(),
            "insufficient funds: requested 105, available 100"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(AppError::InvalidInput("fee".into()).is_client_error());
        assert!(AppError::NotFound("coupon".into()).is_client_error());
        let db = AppError::Database(sqlx::Error::RowNotFound);
        assert!(!db.is_client_error());
    }
}
