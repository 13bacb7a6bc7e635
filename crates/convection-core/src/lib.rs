//! Driver and snapshot output of the drift-wave convection solver.

pub mod driver;
pub mod output;

use convection_types::error::ConvectionError;

/// Process exit status for an error reaching the top level.
///
/// - 1: configuration or I/O failure
/// - 2: malformed invocation
/// - 3: polarization convergence failure
pub fn exit_status(error: &ConvectionError) -> u8 {
    match error {
        ConvectionError::Usage(_) => 2,
        ConvectionError::ConvergenceFailure { .. } => 3,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_mapping() {
        assert_eq!(exit_status(&ConvectionError::Usage("np".into())), 2);
        assert_eq!(exit_status(&ConvectionError::ConvergenceFailure { tolerance: 1e-6 }), 3);
        assert_eq!(exit_status(&ConvectionError::ConfigError("dt".into())), 1);
    }
}
