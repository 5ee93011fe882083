//! Error types.
//!
//! Two layers:
//!
//! - [`ModelError`]: fatal conditions raised by the modeling kernel (units,
//!   mixer, convolution, solver). Soft conditions such as insufficient warmup
//!   or a non-converged fit are *not* errors; they travel in result payloads.
//! - [`AppError`]: the CLI boundary error, carrying a process exit code.

use thiserror::Error;

/// Result alias for kernel operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Fatal errors raised by the modeling kernel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A unit received a missing, non-finite or out-of-domain parameter.
    #[error("unit '{unit}': parameter '{key}' {reason}")]
    ParameterDomain {
        unit: String,
        key: String,
        reason: String,
    },

    /// Fractions do not sum to 1, a fraction is invalid, or a unit is unknown.
    #[error("invalid composition: {0}")]
    Composition(String),

    /// Input series, transit-time axis and sample times disagree on sampling.
    #[error("sampling mismatch: {0}")]
    SamplingMismatch(String),

    /// A time series is unordered, has duplicate timestamps or bad values.
    #[error("invalid series: {0}")]
    InvalidSeries(String),

    /// The solver could not start (bounds violated or first evaluation failed).
    #[error("invalid start: {0}")]
    InvalidStart(String),
}

impl ModelError {
    pub(crate) fn domain(unit: &str, key: &str, reason: impl Into<String>) -> Self {
        ModelError::ParameterDomain {
            unit: unit.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        let exit_code = match &err {
            ModelError::InvalidSeries(_) | ModelError::SamplingMismatch(_) => 2,
            ModelError::ParameterDomain { .. }
            | ModelError::Composition(_)
            | ModelError::InvalidStart(_) => 3,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_map_to_exit_codes() {
        let err: AppError = ModelError::Composition("fractions sum to 0.9".into()).into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("fractions sum to 0.9"));

        let err: AppError = ModelError::SamplingMismatch("step".into()).into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn domain_error_names_unit_and_key() {
        let err = ModelError::domain("epm", "eta", "must be in [0, 1), got 1.2");
        assert_eq!(
            err.to_string(),
            "unit 'epm': parameter 'eta' must be in [0, 1), got 1.2"
        );
    }
}
