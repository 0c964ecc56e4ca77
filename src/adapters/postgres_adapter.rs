//! PostgreSQL store adapter.
//!
//! Prices and factors live as NUMERIC/BIGINT columns under a single schema;
//! every value crosses the wire as `float8` and is cast on the server.

use crate::domain::error::FactorError;
use crate::domain::family::{FactorFamily, FactorSettings, FactorTable};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::window::finite;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::factor_store_port::FactorStorePort;
use chrono::NaiveDate;
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use std::cell::RefCell;

pub const DEFAULT_SCHEMA: &str = "systematic_equity";

pub struct PostgresAdapter {
    client: RefCell<Client>,
    schema: String,
}

fn query_err(e: postgres::Error) -> FactorError {
    FactorError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FactorError> {
        // [postgres] connection_string wins over [database] conninfo
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| FactorError::ConfigMissing {
                section: "database".into(),
                key: "conninfo".into(),
            })?;

        let schema = config
            .get_string("postgres", "schema")
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        if schema.is_empty() || !schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FactorError::ConfigInvalid {
                section: "postgres".into(),
                key: "schema".into(),
                reason: format!("invalid schema name: {schema:?}"),
            });
        }

        let client =
            Client::connect(&connection_string, NoTls).map_err(|e| FactorError::Database {
                reason: e.to_string(),
            })?;

        let adapter = Self {
            client: RefCell::new(client),
            schema,
        };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{}", self.schema, name)
    }

    pub fn initialize_schema(&self) -> Result<(), FactorError> {
        let mut ddl = format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
            CREATE TABLE IF NOT EXISTS {ohlcv} (
                id SERIAL PRIMARY KEY,
                symbol VARCHAR(10) NOT NULL,
                price_date DATE NOT NULL,
                open_price NUMERIC(14, 4),
                high_price NUMERIC(14, 4),
                low_price NUMERIC(14, 4),
                close_price NUMERIC(14, 4),
                volume BIGINT,
                UNIQUE (symbol, price_date)
            );
            CREATE INDEX IF NOT EXISTS idx_ohlcv_symbol_date
                ON {ohlcv} (symbol, price_date DESC);",
            schema = self.schema,
            ohlcv = self.table("daily_ohlcv"),
        );

        let settings = FactorSettings::default();
        for family in FactorFamily::ALL {
            let columns: Vec<String> = family
                .columns(&settings)
                .iter()
                .map(|c| format!("{} {}", c.name, c.sql_type))
                .collect();
            ddl.push_str(&format!(
                "
            CREATE TABLE IF NOT EXISTS {table} (
                id SERIAL PRIMARY KEY,
                symbol VARCHAR(10) NOT NULL,
                price_date DATE NOT NULL,
                {columns},
                UNIQUE (symbol, price_date)
            );
            CREATE INDEX IF NOT EXISTS idx_{family}_symbol_date
                ON {table} (symbol, price_date DESC);",
                table = self.table(family.table_name()),
                columns = columns.join(",\n                "),
                family = family.name(),
            ));
        }

        self.client
            .borrow_mut()
            .batch_execute(&ddl)
            .map_err(query_err)
    }
}

impl DataPort for PostgresAdapter {
    fn fetch_panel(
        &self,
        symbols: &[String],
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FactorError> {
        let query = format!(
            "SELECT symbol, price_date,
                    open_price::float8, high_price::float8,
                    low_price::float8, close_price::float8,
                    volume
             FROM {}
             WHERE symbol = ANY($1)
               AND ($2::date IS NULL OR price_date >= $2)
               AND ($3::date IS NULL OR price_date <= $3)
             ORDER BY symbol, price_date ASC",
            self.table("daily_ohlcv")
        );

        let params: &[&(dyn ToSql + Sync)] = &[&symbols, &start_date, &end_date];
        let rows = self
            .client
            .borrow_mut()
            .query(&query, params)
            .map_err(query_err)?;

        let bars = rows
            .into_iter()
            .map(|row| OhlcvBar {
                symbol: row.get(0),
                date: row.get(1),
                open: row.get::<_, Option<f64>>(2).unwrap_or(f64::NAN),
                high: row.get::<_, Option<f64>>(3).unwrap_or(f64::NAN),
                low: row.get::<_, Option<f64>>(4).unwrap_or(f64::NAN),
                close: row.get::<_, Option<f64>>(5).unwrap_or(f64::NAN),
                volume: row.get::<_, Option<i64>>(6).unwrap_or(0),
            })
            .collect();

        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorError> {
        let query = format!(
            "SELECT DISTINCT symbol FROM {} ORDER BY symbol",
            self.table("daily_ohlcv")
        );

        let rows = self
            .client
            .borrow_mut()
            .query(&query, &[])
            .map_err(query_err)?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorError> {
        let query = format!(
            "SELECT MIN(price_date), MAX(price_date), COUNT(*) FROM {} WHERE symbol = $1",
            self.table("daily_ohlcv")
        );

        let row = self
            .client
            .borrow_mut()
            .query_one(&query, &[&symbol])
            .map_err(query_err)?;

        let min: Option<NaiveDate> = row.get(0);
        let max: Option<NaiveDate> = row.get(1);
        let count: i64 = row.get(2);

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }

    fn latest_date(&self) -> Result<Option<NaiveDate>, FactorError> {
        let query = format!("SELECT MAX(price_date) FROM {}", self.table("daily_ohlcv"));
        let row = self
            .client
            .borrow_mut()
            .query_one(&query, &[])
            .map_err(query_err)?;
        Ok(row.get(0))
    }
}

impl FactorStorePort for PostgresAdapter {
    fn upsert_ohlcv(&self, bars: &[OhlcvBar]) -> Result<usize, FactorError> {
        let query = format!(
            "INSERT INTO {} (symbol, price_date, open_price, high_price, low_price, close_price, volume)
             VALUES ($1, $2, $3::float8, $4::float8, $5::float8, $6::float8, $7)
             ON CONFLICT (symbol, price_date) DO UPDATE SET
                open_price = EXCLUDED.open_price,
                high_price = EXCLUDED.high_price,
                low_price = EXCLUDED.low_price,
                close_price = EXCLUDED.close_price,
                volume = EXCLUDED.volume",
            self.table("daily_ohlcv")
        );

        let mut client = self.client.borrow_mut();
        let mut tx = client.transaction().map_err(query_err)?;
        let stmt = tx.prepare(&query).map_err(query_err)?;

        for bar in bars {
            let open = finite(bar.open);
            let high = finite(bar.high);
            let low = finite(bar.low);
            let close = finite(bar.close);
            tx.execute(
                &stmt,
                &[&bar.symbol, &bar.date, &open, &high, &low, &close, &bar.volume],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(bars.len())
    }

    fn upsert_factors(&self, table: &FactorTable) -> Result<usize, FactorError> {
        let names = table.column_names();
        let placeholders: Vec<String> = (3..names.len() + 3)
            .map(|i| format!("${}::float8", i))
            .collect();
        let updates: Vec<String> = names
            .iter()
            .map(|n| format!("{n} = EXCLUDED.{n}"))
            .collect();
        let query = format!(
            "INSERT INTO {table} (symbol, price_date, {columns})
             VALUES ($1, $2, {placeholders})
             ON CONFLICT (symbol, price_date) DO UPDATE SET {updates}",
            table = self.table(table.family.table_name()),
            columns = names.join(", "),
            placeholders = placeholders.join(", "),
            updates = updates.join(", "),
        );

        let mut client = self.client.borrow_mut();
        let mut tx = client.transaction().map_err(query_err)?;
        let stmt = tx.prepare(&query).map_err(query_err)?;

        for row in &table.rows {
            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(row.values.len() + 2);
            params.push(&row.symbol);
            params.push(&row.date);
            for value in &row.values {
                params.push(value);
            }
            tx.execute(&stmt, &params).map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        tracing::debug!(table = table.family.table_name(), rows = table.len(), "factors upserted");
        Ok(table.len())
    }
}
