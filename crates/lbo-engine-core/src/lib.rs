pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "pe")]
pub mod pe;

#[cfg(feature = "scenarios")]
pub mod scenarios;

pub use error::LboError;
pub use types::*;

/// Standard result type for all LBO engine operations
pub type LboResult<T> = Result<T, LboError>;
