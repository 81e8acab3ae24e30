//! Error types.
//!
//! The library reports [`FitError`]; the binary converts it into [`AppError`],
//! which carries the process exit code.

use thiserror::Error;

/// Errors raised by parameter resolution, simulation, and fitting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// A fixed/derived/free spec names something outside the five parameters.
    #[error("unknown parameter '{0}' (expected one of cp, cair, rin, rout, rair)")]
    UnknownParameter(String),

    /// A parameter is constrained twice (e.g. both fixed and free).
    #[error("parameter '{name}' is overconstrained: {reason}")]
    OverconstrainedParameter { name: String, reason: String },

    /// Array lengths or dimensions are inconsistent.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Dataset values are unusable (non-finite samples, non-increasing time).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The minimizer stopped without meeting its convergence criterion.
    #[error(
        "optimization did not converge after {iterations} iterations \
         (last objective {last_objective:.6e}): {message}"
    )]
    NonConvergence {
        last_objective: f64,
        iterations: u64,
        message: String,
    },

    /// A parameter value is non-positive or non-finite.
    #[error("parameter '{name}' must be positive and finite, got {value}")]
    Domain { name: String, value: f64 },

    /// The numerical backend failed outright.
    #[error("minimizer failed: {0}")]
    Minimizer(String),

    /// Invalid run or minimizer configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FitError {
    /// Configuration errors are raised before any optimization work starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FitError::UnknownParameter(_)
                | FitError::OverconstrainedParameter { .. }
                | FitError::ShapeMismatch(_)
                | FitError::InvalidData(_)
                | FitError::Config(_)
        )
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

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let code = if err.is_configuration() { 2 } else { 4 };
        AppError::new(code, err.to_string())
    }
}
