//! Multi-symbol daily panel and its per-symbol partition.
//!
//! Rows are ordered by symbol, then by ascending date. Every windowed
//! operation runs against one [`SymbolGroup`] slice at a time, so no window
//! ever reaches across a symbol boundary.

use crate::domain::error::FactorError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::window::finite;
use std::ops::Range;

/// A derived value per panel row, aligned to the panel's row order.
pub type Column = Vec<Option<f64>>;

/// One symbol's contiguous run of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolGroup {
    pub symbol: String,
    pub range: Range<usize>,
}

impl SymbolGroup {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Panel {
    bars: Vec<OhlcvBar>,
    groups: Vec<SymbolGroup>,
}

impl Panel {
    /// Sort rows by (symbol, date) and partition them by symbol.
    ///
    /// Fails on a duplicate (symbol, date) key or a non-finite close.
    pub fn new(mut bars: Vec<OhlcvBar>) -> Result<Self, FactorError> {
        bars.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));

        for pair in bars.windows(2) {
            if pair[0].symbol == pair[1].symbol && pair[0].date == pair[1].date {
                return Err(FactorError::MalformedPanel {
                    reason: format!("duplicate row for {} on {}", pair[1].symbol, pair[1].date),
                });
            }
        }

        if let Some(bad) = bars.iter().find(|b| !b.close.is_finite()) {
            return Err(FactorError::MalformedPanel {
                reason: format!("non-finite close for {} on {}", bad.symbol, bad.date),
            });
        }

        let mut groups: Vec<SymbolGroup> = Vec::new();
        for (i, bar) in bars.iter().enumerate() {
            match groups.last_mut() {
                Some(g) if g.symbol == bar.symbol => g.range.end = i + 1,
                _ => groups.push(SymbolGroup {
                    symbol: bar.symbol.clone(),
                    range: i..i + 1,
                }),
            }
        }

        Ok(Self { bars, groups })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn groups(&self) -> &[SymbolGroup] {
        &self.groups
    }

    pub fn group(&self, symbol: &str) -> Option<&SymbolGroup> {
        self.groups.iter().find(|g| g.symbol == symbol)
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.symbol.as_str()).collect()
    }

    pub fn group_bars(&self, group: &SymbolGroup) -> &[OhlcvBar] {
        &self.bars[group.range.clone()]
    }

    pub fn close(&self) -> Column {
        self.bars.iter().map(|b| finite(b.close)).collect()
    }

    pub fn high(&self) -> Column {
        self.bars.iter().map(|b| finite(b.high)).collect()
    }

    pub fn low(&self) -> Column {
        self.bars.iter().map(|b| finite(b.low)).collect()
    }

    pub fn volume(&self) -> Column {
        self.bars.iter().map(|b| Some(b.volume as f64)).collect()
    }

    /// Run `f` over each symbol's bars and stitch the outputs back together
    /// in row order.
    pub fn map_bars<F>(&self, f: F) -> Column
    where
        F: Fn(&[OhlcvBar]) -> Column,
    {
        let mut out = Vec::with_capacity(self.len());
        for group in &self.groups {
            let part = f(self.group_bars(group));
            debug_assert_eq!(part.len(), group.len());
            out.extend(part);
        }
        out
    }

    /// Run `f` over each symbol's slice of `column`.
    pub fn map_groups<F>(&self, column: &[Option<f64>], f: F) -> Column
    where
        F: Fn(&[Option<f64>]) -> Column,
    {
        debug_assert_eq!(column.len(), self.len());
        let mut out = Vec::with_capacity(self.len());
        for group in &self.groups {
            let part = f(&column[group.range.clone()]);
            debug_assert_eq!(part.len(), group.len());
            out.extend(part);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::shift;
    use chrono::NaiveDate;

    fn make_bar(symbol: &str, date: &str, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: symbol.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn new_sorts_and_partitions() {
        let panel = Panel::new(vec![
            make_bar("MSFT", "2024-01-02", 11.0),
            make_bar("AAPL", "2024-01-02", 2.0),
            make_bar("MSFT", "2024-01-01", 10.0),
            make_bar("AAPL", "2024-01-01", 1.0),
            make_bar("AAPL", "2024-01-03", 3.0),
        ])
        .unwrap();

        assert_eq!(panel.len(), 5);
        assert_eq!(panel.symbols(), vec!["AAPL", "MSFT"]);
        assert_eq!(panel.groups()[0].range, 0..3);
        assert_eq!(panel.groups()[1].range, 3..5);
        assert_eq!(
            panel.close(),
            vec![Some(1.0), Some(2.0), Some(3.0), Some(10.0), Some(11.0)]
        );
    }

    #[test]
    fn new_rejects_duplicate_keys() {
        let result = Panel::new(vec![
            make_bar("AAPL", "2024-01-01", 1.0),
            make_bar("AAPL", "2024-01-01", 2.0),
        ]);
        assert!(matches!(result, Err(FactorError::MalformedPanel { .. })));
    }

    #[test]
    fn new_rejects_non_finite_close() {
        let result = Panel::new(vec![make_bar("AAPL", "2024-01-01", f64::NAN)]);
        assert!(matches!(result, Err(FactorError::MalformedPanel { .. })));
    }

    #[test]
    fn empty_panel() {
        let panel = Panel::new(vec![]).unwrap();
        assert!(panel.is_empty());
        assert!(panel.groups().is_empty());
        assert!(panel.map_bars(|bars| vec![None; bars.len()]).is_empty());
    }

    #[test]
    fn map_groups_respects_symbol_boundaries() {
        let panel = Panel::new(vec![
            make_bar("AAPL", "2024-01-01", 1.0),
            make_bar("AAPL", "2024-01-02", 2.0),
            make_bar("MSFT", "2024-01-01", 10.0),
            make_bar("MSFT", "2024-01-02", 20.0),
        ])
        .unwrap();

        let lagged = panel.map_groups(&panel.close(), |s| shift(s, 1));
        assert_eq!(lagged, vec![None, Some(1.0), None, Some(10.0)]);
    }

    #[test]
    fn group_lookup() {
        let panel = Panel::new(vec![
            make_bar("AAPL", "2024-01-01", 1.0),
            make_bar("MSFT", "2024-01-01", 10.0),
        ])
        .unwrap();

        let msft = panel.group("MSFT").unwrap();
        assert_eq!(panel.group_bars(msft)[0].close, 10.0);
        assert!(panel.group("GOOG").is_none());
    }
}
