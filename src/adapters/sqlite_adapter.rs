//! SQLite store adapter: OHLCV history in, factor tables out.

use crate::domain::error::FactorError;
use crate::domain::family::{FactorFamily, FactorSettings, FactorTable};
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::factor_store_port::FactorStorePort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use rusqlite::types::Value;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> FactorError {
    FactorError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> FactorError {
    FactorError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, FactorError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| FactorError::Database {
        reason: format!("invalid stored date {:?}: {}", value, e),
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FactorError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| FactorError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, FactorError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FactorError> {
        self.pool.get().map_err(pool_err)
    }

    /// Create the OHLCV table and one table per factor family if missing.
    pub fn initialize_schema(&self) -> Result<(), FactorError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS daily_ohlcv (
                symbol TEXT NOT NULL,
                price_date TEXT NOT NULL,
                open_price REAL,
                high_price REAL,
                low_price REAL,
                close_price REAL NOT NULL,
                volume INTEGER NOT NULL,
                PRIMARY KEY (symbol, price_date)
            );
            CREATE INDEX IF NOT EXISTS idx_ohlcv_date ON daily_ohlcv(price_date);",
        )
        .map_err(query_err)?;

        let settings = FactorSettings::default();
        for family in FactorFamily::ALL {
            let columns: Vec<String> = family
                .columns(&settings)
                .iter()
                .map(|c| format!("{} REAL", c.name))
                .collect();
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    symbol TEXT NOT NULL,
                    price_date TEXT NOT NULL,
                    {columns},
                    PRIMARY KEY (symbol, price_date)
                );",
                table = family.table_name(),
                columns = columns.join(",\n                    "),
            );
            conn.execute_batch(&ddl).map_err(query_err)?;
        }

        Ok(())
    }

    /// Stored values of one factor column for `symbol`, ordered by date.
    pub fn fetch_factor_column(
        &self,
        family: FactorFamily,
        column: &str,
        symbol: &str,
    ) -> Result<Vec<(NaiveDate, Option<f64>)>, FactorError> {
        let settings = FactorSettings::default();
        if !family.columns(&settings).iter().any(|c| c.name == column) {
            return Err(FactorError::MissingColumn {
                column: format!("{}.{}", family.table_name(), column),
            });
        }

        let conn = self.conn()?;
        let query = format!(
            "SELECT price_date, {} FROM {} WHERE symbol = ?1 ORDER BY price_date ASC",
            column,
            family.table_name()
        );
        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt
            .query_map(params![symbol], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?))
            })
            .map_err(query_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (date, value) = row.map_err(query_err)?;
            out.push((parse_date(&date)?, value));
        }
        Ok(out)
    }

    /// Row count of a family table.
    pub fn count_rows(&self, family: FactorFamily) -> Result<usize, FactorError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", family.table_name()),
                [],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        Ok(count as usize)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_panel(
        &self,
        symbols: &[String],
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FactorError> {
        let conn = self.conn()?;

        let start_str = start_date.map(format_date);
        let end_str = end_date.map(format_date);

        let query = "SELECT symbol, price_date, open_price, high_price, low_price, close_price, volume
                     FROM daily_ohlcv
                     WHERE symbol = ?1
                       AND (?2 IS NULL OR price_date >= ?2)
                       AND (?3 IS NULL OR price_date <= ?3)
                     ORDER BY price_date ASC";

        let mut stmt = conn.prepare(query).map_err(query_err)?;

        let mut sorted: Vec<&String> = symbols.iter().collect();
        sorted.sort();

        let mut bars = Vec::new();
        for symbol in sorted {
            let rows = stmt
                .query_map(params![symbol, start_str, end_str], |row| {
                    let date_str: String = row.get(1)?;
                    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            date_str.len(),
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(OhlcvBar {
                        symbol: row.get(0)?,
                        date,
                        open: row.get::<_, Option<f64>>(2)?.unwrap_or(f64::NAN),
                        high: row.get::<_, Option<f64>>(3)?.unwrap_or(f64::NAN),
                        low: row.get::<_, Option<f64>>(4)?.unwrap_or(f64::NAN),
                        close: row.get(5)?,
                        volume: row.get(6)?,
                    })
                })
                .map_err(query_err)?;

            for row in rows {
                bars.push(row.map_err(query_err)?);
            }
        }

        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM daily_ohlcv ORDER BY symbol")
            .map_err(query_err)?;

        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(query_err)?);
        }

        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorError> {
        let conn = self.conn()?;

        let query =
            "SELECT MIN(price_date), MAX(price_date), COUNT(*) FROM daily_ohlcv WHERE symbol = ?1";

        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(query, params![symbol], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(query_err)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => Ok(Some((
                parse_date(&min_str)?,
                parse_date(&max_str)?,
                count as usize,
            ))),
            _ => Ok(None),
        }
    }

    fn latest_date(&self) -> Result<Option<NaiveDate>, FactorError> {
        let conn = self.conn()?;
        let latest: Option<String> = conn
            .query_row("SELECT MAX(price_date) FROM daily_ohlcv", [], |row| row.get(0))
            .map_err(query_err)?;
        latest.as_deref().map(parse_date).transpose()
    }
}

impl FactorStorePort for SqliteAdapter {
    fn upsert_ohlcv(&self, bars: &[OhlcvBar]) -> Result<usize, FactorError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO daily_ohlcv
                        (symbol, price_date, open_price, high_price, low_price, close_price, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (symbol, price_date) DO UPDATE SET
                        open_price = excluded.open_price,
                        high_price = excluded.high_price,
                        low_price = excluded.low_price,
                        close_price = excluded.close_price,
                        volume = excluded.volume",
                )
                .map_err(query_err)?;

            for bar in bars {
                stmt.execute(params![
                    bar.symbol,
                    format_date(bar.date),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ])
                .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        Ok(bars.len())
    }

    fn upsert_factors(&self, table: &FactorTable) -> Result<usize, FactorError> {
        let names = table.column_names();
        let placeholders: Vec<String> = (1..=names.len() + 2).map(|i| format!("?{}", i)).collect();
        let updates: Vec<String> = names
            .iter()
            .map(|n| format!("{n} = excluded.{n}"))
            .collect();
        let sql = format!(
            "INSERT INTO {table} (symbol, price_date, {columns}) VALUES ({placeholders})
             ON CONFLICT (symbol, price_date) DO UPDATE SET {updates}",
            table = table.family.table_name(),
            columns = names.join(", "),
            placeholders = placeholders.join(", "),
            updates = updates.join(", "),
        );

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        {
            let mut stmt = tx.prepare(&sql).map_err(query_err)?;
            for row in &table.rows {
                let mut values = Vec::with_capacity(row.values.len() + 2);
                values.push(Value::Text(row.symbol.clone()));
                values.push(Value::Text(format_date(row.date)));
                values.extend(row.values.iter().map(|v| match v {
                    Some(x) => Value::Real(*x),
                    None => Value::Null,
                }));
                stmt.execute(rusqlite::params_from_iter(values))
                    .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        Ok(table.len())
    }
}
