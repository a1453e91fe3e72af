use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LboError {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Degenerate input in {context}")]
    DegenerateInput { context: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LboError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        LboError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Map a `checked_*` Decimal result to `DegenerateInput` on overflow.
pub(crate) trait OrOverflow {
    fn or_overflow(self, context: &str) -> Result<Decimal, LboError>;
}

impl OrOverflow for Option<Decimal> {
    fn or_overflow(self, context: &str) -> Result<Decimal, LboError> {
        self.ok_or_else(|| LboError::DegenerateInput {
            context: format!("{context} (decimal overflow)"),
        })
    }
}

impl From<serde_json::Error> for LboError {
    fn from(e: serde_json::Error) -> Self {
        LboError::SerializationError(e.to_string())
    }
}
