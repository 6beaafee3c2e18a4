use thiserror::Error;

/// Malformed, missing or non-finite input. Always fatal for the call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvalidInputError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("{field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be > -100%, got {value}")]
    RateOutOfRange { field: &'static str, value: f64 },
    #[error("{field} must span at least one period, got {periods}")]
    NonPositiveHorizon { field: &'static str, periods: i64 },
    #[error("{field} out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },
    #[error("duplicate debt id {0:?}")]
    DuplicateDebtId(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub(crate) fn require_finite(field: &'static str, value: f64) -> Result<f64, InvalidInputError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InvalidInputError::NonFinite { field, value })
    }
}

pub(crate) fn require_non_negative(
    field: &'static str,
    value: f64,
) -> Result<f64, InvalidInputError> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(InvalidInputError::Negative { field, value });
    }
    Ok(value)
}

pub(crate) fn require_rate(field: &'static str, value: f64) -> Result<f64, InvalidInputError> {
    require_finite(field, value)?;
    if value <= -1.0 {
        return Err(InvalidInputError::RateOutOfRange { field, value });
    }
    Ok(value)
}
