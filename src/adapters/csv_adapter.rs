//! CSV file adapter.
//!
//! Reads `<SYMBOL>.csv` files (`date,open,high,low,close,volume`) from an
//! input directory and writes `<family>_factors.csv` tables to an output
//! directory. Both directions merge on (symbol, date), so repeated writes of
//! the same rows leave the files unchanged.

use crate::domain::error::FactorError;
use crate::domain::family::{FactorFamily, FactorTable};
use crate::domain::ohlcv::{normalize_volume, OhlcvBar};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::factor_store_port::FactorStorePort;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const OHLCV_HEADER: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl CsvAdapter {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            input_dir,
            output_dir,
        }
    }

    /// `[csv] input_dir` is required; `output_dir` defaults to it.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FactorError> {
        let input_dir = config
            .get_string("csv", "input_dir")
            .ok_or_else(|| FactorError::ConfigMissing {
                section: "csv".into(),
                key: "input_dir".into(),
            })?;
        let output_dir = config
            .get_string("csv", "output_dir")
            .unwrap_or_else(|| input_dir.clone());
        Ok(Self::new(input_dir.into(), output_dir.into()))
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.input_dir.join(format!("{}.csv", symbol))
    }

    fn table_path(&self, table: &FactorTable) -> PathBuf {
        self.output_dir
            .join(format!("{}.csv", table.family.table_name()))
    }

    /// Every bar stored for `symbol`, normalized and sorted by date.
    pub fn read_symbol(&self, symbol: &str) -> Result<Vec<OhlcvBar>, FactorError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(FactorError::NoData {
                symbol: symbol.to_string(),
            });
        }
        read_ohlcv_file(&path, symbol)
    }
}

fn csv_error(path: &Path, e: csv::Error) -> FactorError {
    FactorError::Csv {
        reason: format!("{}: {}", path.display(), e),
    }
}

fn parse_field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    path: &Path,
) -> Result<&'r str, FactorError> {
    record.get(idx).map(str::trim).ok_or_else(|| FactorError::Csv {
        reason: format!(
            "{}: missing {} column on line {}",
            path.display(),
            OHLCV_HEADER[idx],
            record.position().map_or(0, |p| p.line())
        ),
    })
}

/// Empty cells read as NaN; the panel rejects a non-finite close.
fn parse_price(value: &str, column: &str, path: &Path) -> Result<f64, FactorError> {
    if value.is_empty() {
        return Ok(f64::NAN);
    }
    value.parse().map_err(|e| FactorError::Csv {
        reason: format!("{}: invalid {} value {:?}: {}", path.display(), column, value, e),
    })
}

/// Read one OHLCV file. Unlike prices, an unparseable volume is coerced to 0.
pub fn read_ohlcv_file(path: &Path, symbol: &str) -> Result<Vec<OhlcvBar>, FactorError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| csv_error(path, e))?;

        let date_str = parse_field(&record, 0, path)?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
            FactorError::Csv {
                reason: format!("{}: invalid date {:?}: {}", path.display(), date_str, e),
            }
        })?;

        let open = parse_price(parse_field(&record, 1, path)?, "open", path)?;
        let high = parse_price(parse_field(&record, 2, path)?, "high", path)?;
        let low = parse_price(parse_field(&record, 3, path)?, "low", path)?;
        let close = parse_price(parse_field(&record, 4, path)?, "close", path)?;
        let volume = normalize_volume(parse_field(&record, 5, path)?.parse::<f64>().ok());

        bars.push(
            OhlcvBar {
                symbol: symbol.to_string(),
                date,
                open,
                high,
                low,
                close,
                volume,
            }
            .normalized(),
        );
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn write_ohlcv_file(path: &Path, bars: &BTreeMap<NaiveDate, OhlcvBar>) -> Result<(), FactorError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    wtr.write_record(OHLCV_HEADER)
        .map_err(|e| csv_error(path, e))?;
    for bar in bars.values() {
        wtr.write_record([
            bar.date.format("%Y-%m-%d").to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])
        .map_err(|e| csv_error(path, e))?;
    }
    wtr.flush()?;
    Ok(())
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl DataPort for CsvAdapter {
    fn fetch_panel(
        &self,
        symbols: &[String],
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FactorError> {
        let mut bars = Vec::new();
        for symbol in symbols {
            bars.extend(self.read_symbol(symbol)?.into_iter().filter(|b| {
                start_date.is_none_or(|s| b.date >= s) && end_date.is_none_or(|e| b.date <= e)
            }));
        }
        bars.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorError> {
        let entries = fs::read_dir(&self.input_dir)?;

        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    let stem = stem.to_string_lossy();
                    // factor tables share the directory when output_dir is unset
                    if FactorFamily::ALL.iter().any(|f| f.table_name() == stem) {
                        continue;
                    }
                    symbols.push(stem.into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Ok(None);
        }
        let bars = read_ohlcv_file(&path, symbol)?;
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Ok(Some((first.date, last.date, bars.len()))),
            _ => Ok(None),
        }
    }

    fn latest_date(&self) -> Result<Option<NaiveDate>, FactorError> {
        let mut latest = None;
        for symbol in self.list_symbols()? {
            if let Some((_, last, _)) = self.get_data_range(&symbol)? {
                latest = latest.max(Some(last));
            }
        }
        Ok(latest)
    }
}

impl FactorStorePort for CsvAdapter {
    fn upsert_ohlcv(&self, bars: &[OhlcvBar]) -> Result<usize, FactorError> {
        let mut by_symbol: BTreeMap<&str, Vec<&OhlcvBar>> = BTreeMap::new();
        for bar in bars {
            by_symbol.entry(bar.symbol.as_str()).or_default().push(bar);
        }

        fs::create_dir_all(&self.input_dir)?;
        for (symbol, new_bars) in by_symbol {
            let path = self.csv_path(symbol);
            let mut merged: BTreeMap<NaiveDate, OhlcvBar> = if path.exists() {
                read_ohlcv_file(&path, symbol)?
                    .into_iter()
                    .map(|b| (b.date, b))
                    .collect()
            } else {
                BTreeMap::new()
            };
            for bar in new_bars {
                merged.insert(bar.date, bar.clone());
            }
            write_ohlcv_file(&path, &merged)?;
            tracing::debug!(symbol, rows = merged.len(), path = %path.display(), "wrote ohlcv file");
        }

        Ok(bars.len())
    }

    fn upsert_factors(&self, table: &FactorTable) -> Result<usize, FactorError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.table_path(table);

        let mut header = vec!["symbol".to_string(), "price_date".to_string()];
        header.extend(table.column_names().iter().map(|c| c.to_string()));

        let mut merged: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        if path.exists() {
            let mut rdr = csv::Reader::from_path(&path).map_err(|e| csv_error(&path, e))?;
            let existing = rdr.headers().map_err(|e| csv_error(&path, e))?.clone();
            if existing.iter().ne(header.iter().map(String::as_str)) {
                return Err(FactorError::Csv {
                    reason: format!(
                        "{}: header does not match the {} column set",
                        path.display(),
                        table.family
                    ),
                });
            }
            for result in rdr.records() {
                let record = result.map_err(|e| csv_error(&path, e))?;
                let fields: Vec<String> = record.iter().map(str::to_string).collect();
                if fields.len() < 2 {
                    continue;
                }
                merged.insert((fields[0].clone(), fields[1].clone()), fields[2..].to_vec());
            }
        }

        for row in &table.rows {
            merged.insert(
                (row.symbol.clone(), row.date.format("%Y-%m-%d").to_string()),
                row.values.iter().copied().map(format_value).collect(),
            );
        }

        let mut wtr = csv::Writer::from_path(&path).map_err(|e| csv_error(&path, e))?;
        wtr.write_record(&header).map_err(|e| csv_error(&path, e))?;
        for ((symbol, date), values) in &merged {
            let mut record = vec![symbol.as_str(), date.as_str()];
            record.extend(values.iter().map(String::as_str));
            wtr.write_record(&record).map_err(|e| csv_error(&path, e))?;
        }
        wtr.flush()?;

        tracing::debug!(
            table = table.family.table_name(),
            rows = table.len(),
            path = %path.display(),
            "wrote factor table"
        );
        Ok(table.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::factor::FactorContext;
    use crate::domain::family::{compute_family, FactorFamily, FactorSettings};
    use crate::domain::panel::Panel;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "date,open,high,low,close,volume\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000\n\
            2024-01-15,100.0,110.0,90.0,105.123456,50000\n\
            2024-01-17,110.0,120.0,105.0,115.0,-5\n";

        fs::write(path.join("AAPL.csv"), csv_content).unwrap();
        fs::write(path.join("MSFT.csv"), "date,open,high,low,close,volume\n").unwrap();
        fs::write(path.join("notes.txt"), "ignored").unwrap();

        (dir, path)
    }

    fn adapter(path: &Path) -> CsvAdapter {
        CsvAdapter::new(path.to_path_buf(), path.join("out"))
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn fetch_panel_normalizes_and_sorts() {
        let (_dir, path) = setup_test_data();
        let bars = adapter(&path)
            .fetch_panel(&["AAPL".to_string()], None, None)
            .unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, date(15));
        assert_eq!(bars[0].close, 105.1235);
        assert_eq!(bars[0].volume, 50000);
        // negative volume clamps to zero
        assert_eq!(bars[2].volume, 0);
    }

    #[test]
    fn fetch_panel_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let bars = adapter(&path)
            .fetch_panel(&["AAPL".to_string()], Some(date(16)), Some(date(16)))
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, date(16));
    }

    #[test]
    fn fetch_panel_missing_symbol() {
        let (_dir, path) = setup_test_data();
        let result = adapter(&path).fetch_panel(&["XYZ".to_string()], None, None);
        assert!(matches!(result, Err(FactorError::NoData { symbol }) if symbol == "XYZ"));
    }

    #[test]
    fn list_symbols_only_csv_files() {
        let (_dir, path) = setup_test_data();
        assert_eq!(adapter(&path).list_symbols().unwrap(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn list_symbols_skips_factor_tables_in_shared_dir() {
        let (_dir, path) = setup_test_data();
        let shared = CsvAdapter::new(path.clone(), path.clone());
        fs::write(path.join("risk_factors.csv"), "symbol,price_date\n").unwrap();

        assert_eq!(shared.list_symbols().unwrap(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn data_range_and_latest_date() {
        let (_dir, path) = setup_test_data();
        let a = adapter(&path);
        assert_eq!(
            a.get_data_range("AAPL").unwrap(),
            Some((date(15), date(17), 3))
        );
        assert_eq!(a.get_data_range("MSFT").unwrap(), None);
        assert_eq!(a.get_data_range("XYZ").unwrap(), None);
        assert_eq!(a.latest_date().unwrap(), Some(date(17)));
    }

    #[test]
    fn invalid_price_is_csv_error() {
        let (_dir, path) = setup_test_data();
        fs::write(
            path.join("BAD.csv"),
            "date,open,high,low,close,volume\n2024-01-15,1,2,0.5,abc,10\n",
        )
        .unwrap();
        let result = adapter(&path).fetch_panel(&["BAD".to_string()], None, None);
        assert!(matches!(result, Err(FactorError::Csv { .. })));
    }

    #[test]
    fn upsert_ohlcv_merges_by_date() {
        let (_dir, path) = setup_test_data();
        let a = adapter(&path);

        let mut bars = a.read_symbol("AAPL").unwrap();
        bars[2].close = 116.0;
        bars.push(OhlcvBar {
            date: date(18),
            ..bars[2].clone()
        });
        assert_eq!(a.upsert_ohlcv(&bars[2..]).unwrap(), 2);

        let stored = a.read_symbol("AAPL").unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[2].close, 116.0);
        assert_eq!(stored[3].date, date(18));
    }

    #[test]
    fn upsert_factors_is_idempotent() {
        let (_dir, path) = setup_test_data();
        let a = adapter(&path);
        let panel = Panel::new(a.read_symbol("AAPL").unwrap()).unwrap();
        let mut ctx = FactorContext::new(&panel);
        let table = compute_family(&mut ctx, FactorFamily::Trend, &FactorSettings::default());

        assert_eq!(a.upsert_factors(&table).unwrap(), 3);
        let out = path.join("out").join("trend_factors.csv");
        let first = fs::read_to_string(&out).unwrap();
        a.upsert_factors(&table).unwrap();
        let second = fs::read_to_string(&out).unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with("symbol,price_date,ma200,ma150,ma100,adx14,"));
        assert_eq!(first.lines().count(), 4);
    }
}
