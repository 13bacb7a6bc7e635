use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvectionError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The finest multigrid stage exhausted its iteration budget.
    #[error("CG failed to converge to {tolerance:e}")]
    ConvergenceFailure { tolerance: f64 },

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConvectionError {
    /// Tolerance carried by a convergence failure, if this is one.
    pub fn violated_tolerance(&self) -> Option<f64> {
        match self {
            ConvectionError::ConvergenceFailure { tolerance } => Some(*tolerance),
            _ => None,
        }
    }
}

pub type ConvectionResult<T> = Result<T, ConvectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_failure_reports_tolerance() {
        let err = ConvectionError::ConvergenceFailure { tolerance: 1e-18 };
        assert_eq!(err.violated_tolerance(), Some(1e-18));
        assert!(err.to_string().contains("1e-18"));
    }

    #[test]
    fn test_other_errors_carry_no_tolerance() {
        let err = ConvectionError::ConfigError("dt must be positive".to_string());
        assert!(err.violated_tolerance().is_none());
    }
}
