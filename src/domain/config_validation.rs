//! Configuration validation.
//!
//! Checks the `[pipeline]` and `[factors]` sections before any data is read.

use crate::domain::error::FactorError;
use crate::domain::family::parse_families;
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const STORES: [&str; 3] = ["sqlite", "postgres", "csv"];

pub fn validate_pipeline_config(config: &dyn ConfigPort) -> Result<(), FactorError> {
    validate_store(config)?;
    validate_symbols(config)?;
    validate_families(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_factor_config(config: &dyn ConfigPort) -> Result<(), FactorError> {
    validate_var_capital(config)?;
    validate_var_confidence(config)?;
    validate_var_window(config, "var_horizon", 1)?;
    validate_var_window(config, "var_lookback", 252)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FactorError {
    FactorError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_store(config: &dyn ConfigPort) -> Result<(), FactorError> {
    let store = config
        .get_string("pipeline", "store")
        .unwrap_or_else(|| "sqlite".to_string());
    if !STORES.contains(&store.trim().to_lowercase().as_str()) {
        return Err(invalid(
            "pipeline",
            "store",
            format!("store must be one of {}", STORES.join(", ")),
        ));
    }
    Ok(())
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), FactorError> {
    match config.get_string("pipeline", "symbols") {
        Some(s) if !s.trim().is_empty() => {
            parse_symbols(&s)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_families(config: &dyn ConfigPort) -> Result<(), FactorError> {
    if let Some(s) = config.get_string("pipeline", "families") {
        let families = parse_families(&s).map_err(|e| invalid("pipeline", "families", e))?;
        if families.is_empty() {
            return Err(invalid("pipeline", "families", "at least one family is required"));
        }
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), FactorError> {
    let start = parse_optional_date(config, "start_date")?;
    let end = parse_optional_date(config, "end_date")?;

    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(invalid(
                "pipeline",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

/// Read an optional `YYYY-MM-DD` date from `[pipeline]`.
pub fn parse_optional_date(
    config: &dyn ConfigPort,
    field: &str,
) -> Result<Option<NaiveDate>, FactorError> {
    match config.get_string("pipeline", field) {
        Some(s) if !s.trim().is_empty() => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid(
                    "pipeline",
                    field,
                    format!("invalid {} format, expected YYYY-MM-DD", field),
                )
            }),
        _ => Ok(None),
    }
}

fn validate_var_capital(config: &dyn ConfigPort) -> Result<(), FactorError> {
    let value = config.get_int("factors", "var_capital", 10_000);
    if value <= 0 {
        return Err(invalid("factors", "var_capital", "var_capital must be positive"));
    }
    Ok(())
}

fn validate_var_confidence(config: &dyn ConfigPort) -> Result<(), FactorError> {
    let value = config.get_double("factors", "var_confidence", 0.95);
    if value <= 0.0 || value >= 1.0 {
        return Err(invalid(
            "factors",
            "var_confidence",
            "var_confidence must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_var_window(config: &dyn ConfigPort, key: &str, default: i64) -> Result<(), FactorError> {
    let value = config.get_int("factors", key, default);
    if value < 1 {
        return Err(invalid("factors", key, format!("{} must be at least 1", key)));
    }
    Ok(())
}
