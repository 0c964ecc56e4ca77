//! OHLCV read port.

use crate::domain::error::FactorError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbols` between the optional inclusive bounds, ordered by
    /// (symbol, date).
    fn fetch_panel(
        &self,
        symbols: &[String],
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FactorError>;

    fn list_symbols(&self) -> Result<Vec<String>, FactorError>;

    /// (first date, last date, bar count), or `None` when nothing is stored.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorError>;

    /// Most recent stored date across all symbols.
    fn latest_date(&self) -> Result<Option<NaiveDate>, FactorError>;
}
