#![allow(dead_code)]

use chrono::NaiveDate;
use equifactor::domain::error::FactorError;
use equifactor::domain::family::FactorTable;
pub use equifactor::domain::ohlcv::OhlcvBar;
use equifactor::ports::data_port::DataPort;
use equifactor::ports::factor_store_port::FactorStorePort;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_panel(
        &self,
        symbols: &[String],
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FactorError> {
        let mut sorted: Vec<&String> = symbols.iter().collect();
        sorted.sort();

        let mut bars = Vec::new();
        for symbol in sorted {
            if let Some(reason) = self.errors.get(symbol) {
                return Err(FactorError::Database {
                    reason: reason.clone(),
                });
            }
            bars.extend(
                self.data
                    .get(symbol)
                    .into_iter()
                    .flatten()
                    .filter(|b| start_date.is_none_or(|s| b.date >= s))
                    .filter(|b| end_date.is_none_or(|e| b.date <= e))
                    .cloned(),
            );
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(FactorError::Database {
                reason: reason.clone(),
            });
        }
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }

    fn latest_date(&self) -> Result<Option<NaiveDate>, FactorError> {
        Ok(self.data.values().flatten().map(|b| b.date).max())
    }
}

/// Keeps every upserted table in memory.
#[derive(Default)]
pub struct RecordingStore {
    pub ohlcv: RefCell<Vec<OhlcvBar>>,
    pub tables: RefCell<Vec<FactorTable>>,
}

impl FactorStorePort for RecordingStore {
    fn upsert_ohlcv(&self, bars: &[OhlcvBar]) -> Result<usize, FactorError> {
        self.ohlcv.borrow_mut().extend_from_slice(bars);
        Ok(bars.len())
    }

    fn upsert_factors(&self, table: &FactorTable) -> Result<usize, FactorError> {
        self.tables.borrow_mut().push(table.clone());
        Ok(table.len())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(symbol: &str, date: &str, close: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000,
    }
}

/// One daily bar per close, starting at `start_date`.
pub fn bars_from_closes(symbol: &str, start_date: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            symbol: symbol.to_string(),
            date: start + chrono::Duration::days(i as i64),
            open: close,
            high: close + 1.0,
            low: (close - 1.0).max(0.01),
            close,
            volume: 1000 + (i as i64 % 10) * 100,
        })
        .collect()
}

pub fn generate_bars(
    symbol: &str,
    start_date: &str,
    count: usize,
    start_price: f64,
) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| start_price + i as f64 + if i % 3 == 0 { -2.0 } else { 0.0 })
        .collect();
    bars_from_closes(symbol, start_date, &closes)
}
