//! Factor families: the persisted column sets and the table they produce.
//!
//! A family maps each of its output columns to a [`FactorKey`]. Computing a
//! family pulls those keys through a shared [`FactorContext`], so columns
//! reused across families (1-day return, annualised volatility) are derived
//! once per run.

use crate::domain::error::FactorError;
use crate::domain::factor::momentum::TRADING_DAYS_PER_MONTH;
use crate::domain::factor::{FactorContext, FactorKey, VarParams};
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactorFamily {
    Liquidity,
    Trend,
    Momentum,
    Risk,
    MeanReversion,
}

impl FactorFamily {
    pub const ALL: [FactorFamily; 5] = [
        FactorFamily::Liquidity,
        FactorFamily::Trend,
        FactorFamily::Momentum,
        FactorFamily::Risk,
        FactorFamily::MeanReversion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FactorFamily::Liquidity => "liquidity",
            FactorFamily::Trend => "trend",
            FactorFamily::Momentum => "momentum",
            FactorFamily::Risk => "risk",
            FactorFamily::MeanReversion => "mean_reversion",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            FactorFamily::Liquidity => "liquidity_factors",
            FactorFamily::Trend => "trend_factors",
            FactorFamily::Momentum => "momentum_factors",
            FactorFamily::Risk => "risk_factors",
            FactorFamily::MeanReversion => "mean_reversion_factors",
        }
    }

    /// Output columns in persisted order.
    pub fn columns(&self, settings: &FactorSettings) -> Vec<FactorColumn> {
        let var = settings.var;
        match self {
            FactorFamily::Liquidity => vec![
                FactorColumn::new("volume", FactorKey::Volume, "BIGINT"),
                FactorColumn::new("dollar_volume", FactorKey::DollarVolume, "NUMERIC(18, 2)"),
                FactorColumn::new("adv_20d", FactorKey::AvgVolume(20), "BIGINT"),
                FactorColumn::new("adv_60d", FactorKey::AvgVolume(60), "BIGINT"),
                FactorColumn::new("mdv_20d", FactorKey::MedianVolume(20), "BIGINT"),
                FactorColumn::new("mdv_60d", FactorKey::MedianVolume(60), "BIGINT"),
                FactorColumn::new("addv_20d", FactorKey::AvgDollarVolume(20), "NUMERIC(18, 2)"),
                FactorColumn::new("addv_60d", FactorKey::AvgDollarVolume(60), "NUMERIC(18, 2)"),
                FactorColumn::new("mddv_20d", FactorKey::MedianDollarVolume(20), "NUMERIC(18, 2)"),
                FactorColumn::new("mddv_60d", FactorKey::MedianDollarVolume(60), "NUMERIC(18, 2)"),
                FactorColumn::new("amihud_illiquidity_20d", FactorKey::Amihud(20), "NUMERIC(20, 10)"),
                FactorColumn::new("amihud_illiquidity_60d", FactorKey::Amihud(60), "NUMERIC(20, 10)"),
            ],
            FactorFamily::Trend => vec![
                FactorColumn::new("ma200", FactorKey::Ema(200), "NUMERIC(14, 4)"),
                FactorColumn::new("ma150", FactorKey::Ema(150), "NUMERIC(14, 4)"),
                FactorColumn::new("ma100", FactorKey::Ema(100), "NUMERIC(14, 4)"),
                FactorColumn::new("adx14", FactorKey::Adx(14), "NUMERIC(6, 2)"),
                FactorColumn::new("donchian_high_55", FactorKey::DonchianHigh(55), "NUMERIC(14, 4)"),
                FactorColumn::new("donchian_high_120", FactorKey::DonchianHigh(120), "NUMERIC(14, 4)"),
                FactorColumn::new("price_to_52w_high", FactorKey::PriceToHigh(252), "NUMERIC(6, 4)"),
            ],
            FactorFamily::Momentum => vec![
                FactorColumn::new("mom_12m", lagged(12), "NUMERIC(10, 6)"),
                FactorColumn::new("mom_6m", lagged(6), "NUMERIC(10, 6)"),
                FactorColumn::new("mom_3m", lagged(3), "NUMERIC(10, 6)"),
                FactorColumn::new("ret_1m", months_return(1), "NUMERIC(10, 6)"),
                FactorColumn::new("ret_3m", months_return(3), "NUMERIC(10, 6)"),
                FactorColumn::new("ret_6m", months_return(6), "NUMERIC(10, 6)"),
                FactorColumn::new("ret_12m", months_return(12), "NUMERIC(10, 6)"),
                FactorColumn::new(
                    "risk_adj_mom_12m",
                    FactorKey::RiskAdjMomentum {
                        months: 11,
                        vol_window: 252,
                    },
                    "NUMERIC(14, 6)",
                ),
                FactorColumn::new(
                    "risk_adj_ret_6m",
                    FactorKey::RiskAdjReturn {
                        months: 6,
                        vol_window: 126,
                    },
                    "NUMERIC(14, 6)",
                ),
                FactorColumn::new("positive_ret_pct_60d", FactorKey::PositiveReturnPct(60), "NUMERIC(8, 6)"),
                FactorColumn::new("positive_ret_pct_120d", FactorKey::PositiveReturnPct(120), "NUMERIC(8, 6)"),
            ],
            FactorFamily::Risk => vec![
                FactorColumn::new("vol_20d", FactorKey::AnnualizedVolatility(20), "NUMERIC(10, 6)"),
                FactorColumn::new("vol_60d", FactorKey::AnnualizedVolatility(60), "NUMERIC(10, 6)"),
                FactorColumn::new("vol_120d", FactorKey::AnnualizedVolatility(120), "NUMERIC(10, 6)"),
                FactorColumn::new("downside_vol_60d", FactorKey::DownsideVolatility(60), "NUMERIC(10, 6)"),
                FactorColumn::new("max_drawdown_6m", FactorKey::MaxDrawdown(126), "NUMERIC(10, 6)"),
                FactorColumn::new("max_drawdown_1y", FactorKey::MaxDrawdown(252), "NUMERIC(10, 6)"),
                FactorColumn::new("historical_var_95_1d", FactorKey::HistoricalVar(var), "NUMERIC(20, 4)"),
                FactorColumn::new("historical_cvar_95_1d", FactorKey::HistoricalCvar(var), "NUMERIC(20, 4)"),
                FactorColumn::new(
                    "worst_day_ret_1y",
                    FactorKey::WorstReturn {
                        horizon: 1,
                        lookback: 252,
                    },
                    "NUMERIC(10, 6)",
                ),
                FactorColumn::new(
                    "worst_week_ret_1y",
                    FactorKey::WorstReturn {
                        horizon: 5,
                        lookback: 252,
                    },
                    "NUMERIC(10, 6)",
                ),
            ],
            FactorFamily::MeanReversion => vec![
                FactorColumn::new("rsi_2d", FactorKey::Rsi(2), "NUMERIC(6, 2)"),
                FactorColumn::new("rsi_5d", FactorKey::Rsi(5), "NUMERIC(6, 2)"),
                FactorColumn::new("rsi_14d", FactorKey::Rsi(14), "NUMERIC(6, 2)"),
                FactorColumn::new(
                    "bollinger_pct_20d",
                    FactorKey::BollingerPctB {
                        period: 20,
                        stddev_mult_x100: 200,
                    },
                    "NUMERIC(10, 6)",
                ),
                FactorColumn::new("ret_5d", FactorKey::Return(5), "NUMERIC(10, 6)"),
                FactorColumn::new("ret_10d", FactorKey::Return(10), "NUMERIC(10, 6)"),
            ],
        }
    }
}

fn lagged(total_months: usize) -> FactorKey {
    FactorKey::LaggedMomentum {
        total_months,
        lag_months: 1,
    }
}

fn months_return(months: usize) -> FactorKey {
    FactorKey::Return(months * TRADING_DAYS_PER_MONTH)
}

impl fmt::Display for FactorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FactorFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "liquidity" => Ok(FactorFamily::Liquidity),
            "trend" => Ok(FactorFamily::Trend),
            "momentum" => Ok(FactorFamily::Momentum),
            "risk" => Ok(FactorFamily::Risk),
            "mean_reversion" | "meanreversion" => Ok(FactorFamily::MeanReversion),
            other => Err(format!("unknown factor family: {other}")),
        }
    }
}

/// Parse a comma-separated family list, dropping repeats and keeping the
/// canonical order.
pub fn parse_families(input: &str) -> Result<Vec<FactorFamily>, String> {
    let mut families = Vec::new();
    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let family: FactorFamily = token.parse()?;
        if !families.contains(&family) {
            families.push(family);
        }
    }
    families.sort();
    Ok(families)
}

/// Run-wide parameters that feed family columns.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FactorSettings {
    pub var: VarParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactorColumn {
    pub name: &'static str,
    pub key: FactorKey,
    /// Column type in the relational schema.
    pub sql_type: &'static str,
}

impl FactorColumn {
    fn new(name: &'static str, key: FactorKey, sql_type: &'static str) -> Self {
        Self {
            name,
            key,
            sql_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactorRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

/// One family's output: a row per panel row, values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorTable {
    pub family: FactorFamily,
    pub columns: Vec<FactorColumn>,
    pub rows: Vec<FactorRow>,
}

impl FactorTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, FactorError> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| FactorError::MissingColumn {
                column: format!("{}.{}", self.family.table_name(), name),
            })
    }

    /// Whole column by name, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<Option<f64>>, FactorError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Drop rows outside `[start, end]`; an open bound keeps that side.
    pub fn retain_dates(&mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) {
        self.rows.retain(|r| {
            start.is_none_or(|s| r.date >= s) && end.is_none_or(|e| r.date <= e)
        });
    }

    /// Single cell lookup by (symbol, date, column).
    pub fn value(
        &self,
        symbol: &str,
        date: NaiveDate,
        name: &str,
    ) -> Result<Option<f64>, FactorError> {
        let idx = self.column_index(name)?;
        Ok(self
            .rows
            .iter()
            .find(|r| r.symbol == symbol && r.date == date)
            .and_then(|r| r.values[idx]))
    }
}

/// Compute every column of `family` through the shared context.
pub fn compute_family(
    ctx: &mut FactorContext<'_>,
    family: FactorFamily,
    settings: &FactorSettings,
) -> FactorTable {
    let columns = family.columns(settings);
    let values: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|c| ctx.column(c.key).clone())
        .collect();

    let panel = ctx.panel();
    let rows = panel
        .bars()
        .iter()
        .enumerate()
        .map(|(i, bar)| FactorRow {
            symbol: bar.symbol.clone(),
            date: bar.date,
            values: values.iter().map(|col| col[i]).collect(),
        })
        .collect();

    tracing::debug!(
        family = family.name(),
        columns = columns.len(),
        cached = ctx.cached_len(),
        "family computed"
    );

    FactorTable {
        family,
        columns,
        rows,
    }
}
