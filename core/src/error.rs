use thiserror::Error;

/// Failures the dose and reconciliation layer reports to the caller.
///
/// `DivisionByZero` and `SchemaMismatch` are warnings: the operation is
/// skipped and nothing is written, but the session can carry on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BolusError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store unreachable: {0}")]
    ConnectionFailure(String),

    #[error("Division by zero: {field} must be greater than 0")]
    DivisionByZero { field: &'static str },

    #[error("Schema mismatch in '{table}': header has {expected} columns but row has {found}")]
    SchemaMismatch {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl BolusError {
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            BolusError::DivisionByZero { .. } | BolusError::SchemaMismatch { .. }
        )
    }

    /// Find a `BolusError` anywhere in an `anyhow` chain.
    #[must_use]
    pub fn find(err: &anyhow::Error) -> Option<&BolusError> {
        err.chain().find_map(|e| e.downcast_ref::<BolusError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_warning_classification() {
        assert!(BolusError::DivisionByZero { field: "ISF" }.is_warning());
        assert!(
            BolusError::SchemaMismatch {
                table: "log".into(),
                expected: 12,
                found: 10
            }
            .is_warning()
        );
        assert!(!BolusError::InvalidInput("x".into()).is_warning());
        assert!(!BolusError::ConnectionFailure("down".into()).is_warning());
    }

    #[test]
    fn test_find_through_context() {
        let res: anyhow::Result<()> = Err(BolusError::DivisionByZero { field: "C/I" })
            .context("Failed to compute dose");
        let err = res.unwrap_err();
        assert_eq!(
            BolusError::find(&err),
            Some(&BolusError::DivisionByZero { field: "C/I" })
        );
    }
}
