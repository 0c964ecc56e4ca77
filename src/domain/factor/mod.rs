//! Factor transforms and the memoized computation context.
//!
//! - `FactorKey`: transform identity + parameters (serves as the cache key)
//! - `FactorContext`: owns the cache of computed columns for one pass over a
//!   panel; dependencies are computed on first use and reused afterwards.

pub mod liquidity;
pub mod mean_reversion;
pub mod momentum;
pub mod returns;
pub mod risk;
pub mod trend;

use crate::domain::error::FactorError;
use crate::domain::panel::{Column, Panel};
use std::collections::HashMap;
use std::fmt;

/// Parameters of a historical VaR / CVaR computation.
///
/// Confidence is stored in basis points so the key stays hashable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarParams {
    pub capital: u64,
    pub confidence_bp: u32,
    pub horizon: usize,
    pub lookback: usize,
}

impl VarParams {
    pub fn confidence(&self) -> f64 {
        self.confidence_bp as f64 / 10_000.0
    }

    /// Tail probability, 1 - confidence.
    pub fn alpha(&self) -> f64 {
        1.0 - self.confidence()
    }
}

impl Default for VarParams {
    fn default() -> Self {
        Self {
            capital: 10_000,
            confidence_bp: 9_500,
            horizon: 1,
            lookback: 252,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactorKey {
    Return(usize),
    AnnualizedReturn(usize),
    Volatility(usize),
    AnnualizedVolatility(usize),
    DownsideVolatility(usize),
    Volume,
    AvgVolume(usize),
    MedianVolume(usize),
    DollarVolume,
    AvgDollarVolume(usize),
    MedianDollarVolume(usize),
    Amihud(usize),
    Sma(usize),
    Ema(usize),
    Adx(usize),
    DonchianHigh(usize),
    DonchianLow(usize),
    DonchianMedian(usize),
    PriceToHigh(usize),
    LaggedMomentum {
        total_months: usize,
        lag_months: usize,
    },
    RiskAdjMomentum {
        months: usize,
        vol_window: usize,
    },
    RiskAdjReturn {
        months: usize,
        vol_window: usize,
    },
    PositiveReturnPct(usize),
    MaxDrawdown(usize),
    HistoricalVar(VarParams),
    HistoricalCvar(VarParams),
    WorstReturn {
        horizon: usize,
        lookback: usize,
    },
    Rsi(usize),
    BollingerPctB {
        period: usize,
        stddev_mult_x100: u32,
    },
}

impl fmt::Display for FactorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorKey::Return(h) => write!(f, "RETURN({})", h),
            FactorKey::AnnualizedReturn(h) => write!(f, "ANN_RETURN({})", h),
            FactorKey::Volatility(w) => write!(f, "VOL({})", w),
            FactorKey::AnnualizedVolatility(w) => write!(f, "ANN_VOL({})", w),
            FactorKey::DownsideVolatility(w) => write!(f, "DOWNSIDE_VOL({})", w),
            FactorKey::Volume => write!(f, "VOLUME"),
            FactorKey::AvgVolume(w) => write!(f, "ADV({})", w),
            FactorKey::MedianVolume(w) => write!(f, "MDV({})", w),
            FactorKey::DollarVolume => write!(f, "DOLLAR_VOLUME"),
            FactorKey::AvgDollarVolume(w) => write!(f, "ADDV({})", w),
            FactorKey::MedianDollarVolume(w) => write!(f, "MDDV({})", w),
            FactorKey::Amihud(w) => write!(f, "AMIHUD({})", w),
            FactorKey::Sma(w) => write!(f, "SMA({})", w),
            FactorKey::Ema(w) => write!(f, "EMA({})", w),
            FactorKey::Adx(w) => write!(f, "ADX({})", w),
            FactorKey::DonchianHigh(w) => write!(f, "DONCHIAN_HIGH({})", w),
            FactorKey::DonchianLow(w) => write!(f, "DONCHIAN_LOW({})", w),
            FactorKey::DonchianMedian(w) => write!(f, "DONCHIAN_MEDIAN({})", w),
            FactorKey::PriceToHigh(w) => write!(f, "PRICE_TO_HIGH({})", w),
            FactorKey::LaggedMomentum {
                total_months,
                lag_months,
            } => write!(f, "MOMENTUM({},{})", total_months, lag_months),
            FactorKey::RiskAdjMomentum { months, vol_window } => {
                write!(f, "RISK_ADJ_MOMENTUM({},{})", months, vol_window)
            }
            FactorKey::RiskAdjReturn { months, vol_window } => {
                write!(f, "RISK_ADJ_RETURN({},{})", months, vol_window)
            }
            FactorKey::PositiveReturnPct(w) => write!(f, "POSITIVE_RETURN_PCT({})", w),
            FactorKey::MaxDrawdown(w) => write!(f, "MAX_DRAWDOWN({})", w),
            FactorKey::HistoricalVar(p) => write!(
                f,
                "VAR({},{},{},{})",
                p.capital,
                p.confidence(),
                p.horizon,
                p.lookback
            ),
            FactorKey::HistoricalCvar(p) => write!(
                f,
                "CVAR({},{},{},{})",
                p.capital,
                p.confidence(),
                p.horizon,
                p.lookback
            ),
            FactorKey::WorstReturn { horizon, lookback } => {
                write!(f, "WORST_RETURN({},{})", horizon, lookback)
            }
            FactorKey::Rsi(w) => write!(f, "RSI({})", w),
            FactorKey::BollingerPctB {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER_PCT_B({},{})", period, mult)
            }
        }
    }
}

/// Memoized computation context for one pass over a panel.
pub struct FactorContext<'a> {
    panel: &'a Panel,
    cache: HashMap<FactorKey, Column>,
}

impl<'a> FactorContext<'a> {
    pub fn new(panel: &'a Panel) -> Self {
        Self {
            panel,
            cache: HashMap::new(),
        }
    }

    pub fn panel(&self) -> &'a Panel {
        self.panel
    }

    pub fn is_cached(&self, key: &FactorKey) -> bool {
        self.cache.contains_key(key)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Seed the cache with a column computed elsewhere, e.g. a symbol
    /// partition computed on another thread.
    pub fn provide(&mut self, key: FactorKey, column: Column) -> Result<(), FactorError> {
        if column.len() != self.panel.len() {
            return Err(FactorError::MalformedPanel {
                reason: format!(
                    "column {} has {} rows, panel has {}",
                    key,
                    column.len(),
                    self.panel.len()
                ),
            });
        }
        self.cache.insert(key, column);
        Ok(())
    }

    /// Return the column for `key`, computing it (and its dependencies) on
    /// first request.
    pub fn column(&mut self, key: FactorKey) -> &Column {
        self.ensure(key);
        &self.cache[&key]
    }

    fn ensure(&mut self, key: FactorKey) {
        if self.cache.contains_key(&key) {
            tracing::trace!(factor = %key, "reusing cached column");
            return;
        }
        let column = self.compute(key);
        tracing::debug!(factor = %key, rows = column.len(), "computed column");
        self.cache.insert(key, column);
    }

    fn cached(&self, key: FactorKey) -> &Column {
        &self.cache[&key]
    }

    fn compute(&mut self, key: FactorKey) -> Column {
        let panel = self.panel;
        match key {
            FactorKey::Return(h) => returns::log_return(panel, h),
            FactorKey::AnnualizedReturn(h) => {
                returns::annualized_return(self.column(FactorKey::Return(h)), h)
            }
            FactorKey::Volatility(w) => {
                returns::volatility(panel, self.column(FactorKey::Return(1)), w)
            }
            FactorKey::AnnualizedVolatility(w) => {
                returns::annualized_volatility(self.column(FactorKey::Volatility(w)))
            }
            FactorKey::DownsideVolatility(w) => {
                returns::downside_volatility(panel, self.column(FactorKey::Return(1)), w)
            }
            FactorKey::Volume => panel.volume(),
            FactorKey::AvgVolume(w) => {
                liquidity::avg_volume(panel, self.column(FactorKey::Volume), w)
            }
            FactorKey::MedianVolume(w) => {
                liquidity::median_volume(panel, self.column(FactorKey::Volume), w)
            }
            FactorKey::DollarVolume => liquidity::dollar_volume(panel),
            FactorKey::AvgDollarVolume(w) => {
                liquidity::avg_dollar_volume(panel, self.column(FactorKey::DollarVolume), w)
            }
            FactorKey::MedianDollarVolume(w) => {
                liquidity::median_dollar_volume(panel, self.column(FactorKey::DollarVolume), w)
            }
            FactorKey::Amihud(w) => {
                self.ensure(FactorKey::Return(1));
                self.ensure(FactorKey::DollarVolume);
                liquidity::amihud(
                    panel,
                    self.cached(FactorKey::Return(1)),
                    self.cached(FactorKey::DollarVolume),
                    w,
                )
            }
            FactorKey::Sma(w) => trend::sma(panel, w),
            FactorKey::Ema(w) => trend::ema(panel, w),
            FactorKey::Adx(w) => trend::adx(panel, w),
            FactorKey::DonchianHigh(w) => trend::donchian_high(panel, w),
            FactorKey::DonchianLow(w) => trend::donchian_low(panel, w),
            FactorKey::DonchianMedian(w) => {
                self.ensure(FactorKey::DonchianHigh(w));
                self.ensure(FactorKey::DonchianLow(w));
                trend::donchian_median(
                    self.cached(FactorKey::DonchianHigh(w)),
                    self.cached(FactorKey::DonchianLow(w)),
                )
            }
            FactorKey::PriceToHigh(w) => trend::price_to_high(panel, w),
            FactorKey::LaggedMomentum {
                total_months,
                lag_months,
            } => momentum::lagged_momentum(panel, total_months, lag_months),
            FactorKey::RiskAdjMomentum { months, vol_window } => {
                let mom = FactorKey::LaggedMomentum {
                    total_months: months + 1,
                    lag_months: 1,
                };
                let vol = FactorKey::AnnualizedVolatility(vol_window);
                self.ensure(mom);
                self.ensure(vol);
                momentum::risk_adjusted(self.cached(mom), self.cached(vol))
            }
            FactorKey::RiskAdjReturn { months, vol_window } => {
                let ret = FactorKey::AnnualizedReturn(months * momentum::TRADING_DAYS_PER_MONTH);
                let vol = FactorKey::AnnualizedVolatility(vol_window);
                self.ensure(ret);
                self.ensure(vol);
                momentum::risk_adjusted(self.cached(ret), self.cached(vol))
            }
            FactorKey::PositiveReturnPct(w) => {
                momentum::positive_return_pct(panel, self.column(FactorKey::Return(1)), w)
            }
            FactorKey::MaxDrawdown(w) => risk::max_drawdown(panel, w),
            FactorKey::HistoricalVar(p) => {
                risk::historical_var(panel, self.column(FactorKey::Return(p.horizon)), &p)
            }
            FactorKey::HistoricalCvar(p) => {
                risk::historical_cvar(panel, self.column(FactorKey::Return(p.horizon)), &p)
            }
            FactorKey::WorstReturn { horizon, lookback } => {
                risk::worst_return(panel, self.column(FactorKey::Return(horizon)), lookback)
            }
            FactorKey::Rsi(w) => mean_reversion::rsi(panel, w),
            FactorKey::BollingerPctB {
                period,
                stddev_mult_x100,
            } => mean_reversion::bollinger_pct_b(panel, period, stddev_mult_x100),
        }
    }
}
