//! Domain error types.
//!
//! Numeric degeneracies (short history, zero denominators) are not errors:
//! transforms turn them into `None`. Only structural problems surface here.

/// Top-level error type for equifactor.
#[derive(Debug, thiserror::Error)]
pub enum FactorError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("malformed panel: {reason}")]
    MalformedPanel { reason: String },

    #[error("missing column: {column}")]
    MissingColumn { column: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("csv error: {reason}")]
    Csv { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&FactorError> for std::process::ExitCode {
    fn from(err: &FactorError) -> Self {
        let code: u8 = match err {
            FactorError::Io(_) | FactorError::Csv { .. } => 1,
            FactorError::ConfigParse { .. }
            | FactorError::ConfigMissing { .. }
            | FactorError::ConfigInvalid { .. } => 2,
            FactorError::Database { .. } | FactorError::DatabaseQuery { .. } => 3,
            FactorError::MalformedPanel { .. } | FactorError::MissingColumn { .. } => 4,
            FactorError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = FactorError::ConfigInvalid {
            section: "factors".into(),
            key: "var_confidence".into(),
            reason: "must be between 0 and 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value [factors] var_confidence: must be between 0 and 1"
        );
    }

    #[test]
    fn exit_codes_group_by_kind() {
        use std::process::ExitCode;

        let cases = [
            (FactorError::Csv { reason: "x".into() }, ExitCode::from(1)),
            (
                FactorError::ConfigMissing {
                    section: "pipeline".into(),
                    key: "store".into(),
                },
                ExitCode::from(2),
            ),
            (FactorError::Database { reason: "x".into() }, ExitCode::from(3)),
            (
                FactorError::MalformedPanel { reason: "x".into() },
                ExitCode::from(4),
            ),
            (FactorError::NoData { symbol: "AAPL".into() }, ExitCode::from(5)),
        ];

        for (err, expected) in &cases {
            assert_eq!(ExitCode::from(err), *expected, "{err}");
        }
    }
}
