//! Persistence port for raw bars and computed factor tables.

use crate::domain::error::FactorError;
use crate::domain::family::FactorTable;
use crate::domain::ohlcv::OhlcvBar;

/// Idempotent writes keyed by (symbol, date): re-running with the same input
/// leaves the store unchanged.
pub trait FactorStorePort {
    /// Returns the number of rows written.
    fn upsert_ohlcv(&self, bars: &[OhlcvBar]) -> Result<usize, FactorError>;

    /// Returns the number of rows written.
    fn upsert_factors(&self, table: &FactorTable) -> Result<usize, FactorError>;
}
