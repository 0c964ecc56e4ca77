//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;

use crate::domain::error::FactorError;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::factor_store_port::FactorStorePort;

/// A backend that both serves the OHLCV panel and persists factor tables.
pub trait Store: DataPort + FactorStorePort {
    fn data(&self) -> &dyn DataPort;
    fn sink(&self) -> &dyn FactorStorePort;
}

impl<T: DataPort + FactorStorePort> Store for T {
    fn data(&self) -> &dyn DataPort {
        self
    }

    fn sink(&self) -> &dyn FactorStorePort {
        self
    }
}

/// Backend name from `[pipeline] store`, defaulting to sqlite.
pub fn store_name(config: &dyn ConfigPort) -> String {
    config
        .get_string("pipeline", "store")
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "sqlite".to_string())
}

/// Open the backend named by `[pipeline] store`.
pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn Store>, FactorError> {
    let name = store_name(config);
    tracing::debug!(store = %name, "opening store");

    match name.as_str() {
        "csv" => Ok(Box::new(csv_adapter::CsvAdapter::from_config(config)?)),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Box::new(sqlite_adapter::SqliteAdapter::from_config(config)?)),
        #[cfg(feature = "postgres")]
        "postgres" => Ok(Box::new(postgres_adapter::PostgresAdapter::from_config(
            config,
        )?)),
        "sqlite" | "postgres" => Err(FactorError::ConfigInvalid {
            section: "pipeline".into(),
            key: "store".into(),
            reason: format!("store '{name}' requires the {name} feature"),
        }),
        other => Err(FactorError::ConfigInvalid {
            section: "pipeline".into(),
            key: "store".into(),
            reason: format!("unknown store '{other}'"),
        }),
    }
}
