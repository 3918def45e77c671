// error.rs — Storage errors and their retry classification.

use em_model::{CompanyId, ModelError};
use thiserror::Error;

/// Errors from entity-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Period and value-object writes require the company row to exist;
    /// the persistence stage upserts the company before anything else.
    #[error("company {0} not found")]
    CompanyNotFound(CompanyId),

    /// The data violates a model invariant and can never be stored.
    #[error("constraint violation: {0}")]
    Constraint(#[from] ModelError),

    /// The store could not be reached.
    #[error("transport: {0}")]
    Transport(String),

    /// The store answered with a non-success status.
    #[error("entity API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned: {0}")]
    Lock(String),
}

impl StoreError {
    /// Whether a retry has any chance of succeeding. Transport failures
    /// and server-side errors are worth retrying; everything else is a
    /// caller bug or a constraint violation and will fail identically.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_server_errors_are_transient() {
        assert!(StoreError::Transport("connection refused".into()).is_transient());
        assert!(StoreError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
    }

    #[test]
    fn client_errors_and_constraints_are_not() {
        assert!(!StoreError::Api {
            status: 422,
            message: "bad category".into()
        }
        .is_transient());
        assert!(!StoreError::Constraint(ModelError::EmptyScope2).is_transient());
        assert!(
            !StoreError::CompanyNotFound(CompanyId::new("Q1").unwrap()).is_transient()
        );
    }
}
