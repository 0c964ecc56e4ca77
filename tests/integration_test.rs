//! End-to-end factor computation over mock and SQLite stores.
//!
//! Tests cover:
//! - Per-symbol isolation of every family
//! - Log-return consistency with the close series
//! - Degenerate inputs (zero volume, monotone prices, drawdowns)
//! - CVaR never below VaR, including all-gain windows
//! - Pipeline determinism and idempotent upserts

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use equifactor::domain::factor::{FactorContext, FactorKey, VarParams};
use equifactor::domain::family::{FactorFamily, FactorSettings};
use equifactor::domain::panel::Panel;
use equifactor::pipeline::{self, compute_tables, PipelineRequest};
use proptest::prelude::*;

fn closes_strategy(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0f64..500.0, min_len..max_len)
}

mod symbol_isolation {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn adding_a_symbol_never_changes_another(
            a in closes_strategy(5, 60),
            b in closes_strategy(5, 60),
        ) {
            let alone = Panel::new(bars_from_closes("AAA", "2023-01-02", &a)).unwrap();
            let mut both_bars = bars_from_closes("BBB", "2023-01-02", &b);
            both_bars.extend(bars_from_closes("AAA", "2023-01-02", &a));
            let both = Panel::new(both_bars).unwrap();

            let settings = FactorSettings::default();
            let tables_alone = compute_tables(&alone, &FactorFamily::ALL, &settings);
            let tables_both = compute_tables(&both, &FactorFamily::ALL, &settings);

            for (t_alone, t_both) in tables_alone.iter().zip(&tables_both) {
                let rows_both: Vec<_> =
                    t_both.rows.iter().filter(|r| r.symbol == "AAA").cloned().collect();
                prop_assert_eq!(&t_alone.rows, &rows_both, "family {}", t_alone.family);
            }
        }
    }

    #[test]
    fn first_rows_of_each_symbol_restart_windows() {
        let mut bars = generate_bars("AAA", "2024-01-01", 30, 50.0);
        bars.extend(generate_bars("BBB", "2024-01-01", 30, 500.0));
        let panel = Panel::new(bars).unwrap();

        let mut ctx = FactorContext::new(&panel);
        let ret = ctx.column(FactorKey::Return(1)).clone();
        assert_eq!(ret[0], None);
        assert_eq!(ret[30], None);
        assert!(ret[31].is_some());

        let sma = ctx.column(FactorKey::Sma(5)).clone();
        assert!(sma[30..34].iter().all(Option::is_none));
        assert!(sma[34].is_some());
    }
}

mod returns {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn one_day_returns_sum_to_the_total_log_change(closes in closes_strategy(2, 80)) {
            let panel = Panel::new(bars_from_closes("AAA", "2023-01-02", &closes)).unwrap();
            let mut ctx = FactorContext::new(&panel);
            let ret = ctx.column(FactorKey::Return(1)).clone();

            prop_assert_eq!(ret[0], None);
            let sum: f64 = ret.iter().flatten().sum();
            let expected = (closes[closes.len() - 1] / closes[0]).ln();
            // each return is rounded to 6 dp
            let tolerance = 5e-7 * (closes.len() - 1) as f64 + 1e-9;
            prop_assert!((sum - expected).abs() <= tolerance, "{sum} vs {expected}");
        }

        #[test]
        fn multi_day_return_matches_close_ratio(closes in closes_strategy(6, 40)) {
            let panel = Panel::new(bars_from_closes("AAA", "2023-01-02", &closes)).unwrap();
            let mut ctx = FactorContext::new(&panel);
            let ret5 = ctx.column(FactorKey::Return(5)).clone();

            for (i, value) in ret5.iter().enumerate() {
                if i < 5 {
                    prop_assert_eq!(*value, None);
                } else {
                    let expected = (closes[i] / closes[i - 5]).ln();
                    prop_assert!((value.unwrap() - expected).abs() <= 5e-7 + 1e-12);
                }
            }
        }
    }
}

mod degenerate_inputs {
    use super::*;

    #[test]
    fn zero_volume_leaves_amihud_missing() {
        let mut bars = generate_bars("AAA", "2024-01-01", 40, 20.0);
        for bar in &mut bars {
            bar.volume = 0;
        }
        let panel = Panel::new(bars).unwrap();
        let mut ctx = FactorContext::new(&panel);

        assert!(ctx.column(FactorKey::Amihud(20)).iter().all(Option::is_none));
        assert!(
            ctx.column(FactorKey::DollarVolume)
                .iter()
                .all(|v| *v == Some(0.0))
        );
    }

    #[test]
    fn rsi_of_a_rising_series_is_100() {
        let closes: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let panel = Panel::new(bars_from_closes("AAA", "2024-01-01", &closes)).unwrap();
        let mut ctx = FactorContext::new(&panel);

        let rsi = ctx.column(FactorKey::Rsi(14)).clone();
        assert_eq!(rsi[0], None);
        assert!(rsi[1..].iter().all(|v| *v == Some(100.0)));
    }

    #[test]
    fn max_drawdown_tracks_running_peak() {
        let panel = Panel::new(bars_from_closes(
            "AAA",
            "2024-01-01",
            &[100.0, 90.0, 80.0, 95.0],
        ))
        .unwrap();
        let mut ctx = FactorContext::new(&panel);

        let dd = ctx.column(FactorKey::MaxDrawdown(126)).clone();
        assert_eq!(dd, vec![Some(0.0), Some(-0.1), Some(-0.2), Some(-0.2)]);
    }

    #[test]
    fn constant_prices_have_zero_volatility_and_no_bollinger() {
        let panel = Panel::new(bars_from_closes("AAA", "2024-01-01", &[50.0; 40])).unwrap();
        let mut ctx = FactorContext::new(&panel);

        let vol = ctx.column(FactorKey::AnnualizedVolatility(20)).clone();
        assert_eq!(vol[39], Some(0.0));

        let pct_b = ctx
            .column(FactorKey::BollingerPctB {
                period: 20,
                stddev_mult_x100: 200,
            })
            .clone();
        assert!(pct_b.iter().all(Option::is_none));
    }

    #[test]
    fn short_history_yields_missing_not_errors() {
        let panel = Panel::new(generate_bars("AAA", "2024-01-01", 3, 10.0)).unwrap();
        let tables = compute_tables(&panel, &FactorFamily::ALL, &FactorSettings::default());

        let risk = tables
            .iter()
            .find(|t| t.family == FactorFamily::Risk)
            .unwrap();
        assert!(risk.column("vol_120d").unwrap().iter().all(Option::is_none));
        assert!(
            risk.column("historical_var_95_1d")
                .unwrap()
                .iter()
                .all(Option::is_none)
        );
    }
}

mod tail_risk {
    use super::*;

    fn alternating_closes(ups: &[f64], downs: &[f64]) -> Vec<f64> {
        let mut closes = vec![100.0];
        for (up, down) in ups.iter().zip(downs) {
            let last = closes[closes.len() - 1];
            closes.push(last * (1.0 + up));
            closes.push(last * (1.0 + up) * (1.0 + down));
        }
        closes
    }

    fn compounded(steps: &[f64]) -> Vec<f64> {
        let mut closes = vec![100.0];
        for step in steps {
            let last = closes[closes.len() - 1];
            closes.push(last * (1.0 + step));
        }
        closes
    }

    fn assert_cvar_dominates(closes: &[f64]) -> Result<(), TestCaseError> {
        let panel = Panel::new(bars_from_closes("AAA", "2023-01-02", closes)).unwrap();
        let params = VarParams {
            lookback: 20,
            ..VarParams::default()
        };

        let mut ctx = FactorContext::new(&panel);
        let var = ctx.column(FactorKey::HistoricalVar(params)).clone();
        let cvar = ctx.column(FactorKey::HistoricalCvar(params)).clone();

        let mut compared = 0;
        for (v, c) in var.iter().zip(&cvar) {
            if let (Some(v), Some(c)) = (v, c) {
                prop_assert!(*v >= 0.0);
                prop_assert!(c >= v, "cvar {c} < var {v}");
                compared += 1;
            }
        }
        prop_assert!(compared > 0);
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn cvar_is_at_least_var(
            ups in prop::collection::vec(0.001f64..0.05, 15..40),
            downs in prop::collection::vec(-0.05f64..-0.001, 40),
        ) {
            assert_cvar_dominates(&alternating_closes(&ups, &downs))?;
        }

        #[test]
        fn cvar_is_at_least_var_for_any_returns(
            steps in prop::collection::vec(-0.05f64..0.05, 25..80),
        ) {
            assert_cvar_dominates(&compounded(&steps))?;
        }

        #[test]
        fn cvar_is_at_least_var_on_all_gain_windows(
            steps in prop::collection::vec(0.001f64..0.05, 25..60),
        ) {
            assert_cvar_dominates(&compounded(&steps))?;
        }
    }

    #[test]
    fn var_scales_with_capital() {
        let closes = alternating_closes(&[0.02; 20], &[-0.03; 20]);
        let panel = Panel::new(bars_from_closes("AAA", "2023-01-02", &closes)).unwrap();
        let small = VarParams {
            lookback: 20,
            ..VarParams::default()
        };
        let large = VarParams {
            capital: small.capital * 10,
            ..small
        };

        let mut ctx = FactorContext::new(&panel);
        let v_small = ctx.column(FactorKey::HistoricalVar(small)).clone();
        let v_large = ctx.column(FactorKey::HistoricalVar(large)).clone();

        let last = closes.len() - 1;
        assert_abs_diff_eq!(
            v_large[last].unwrap(),
            v_small[last].unwrap() * 10.0,
            epsilon = 1e-3
        );
    }
}

mod pipeline_runs {
    use super::*;

    fn mock_port() -> MockDataPort {
        MockDataPort::new()
            .with_bars("AAA", generate_bars("AAA", "2024-01-01", 80, 40.0))
            .with_bars("BBB", generate_bars("BBB", "2024-01-01", 60, 90.0))
    }

    #[test]
    fn pipeline_is_deterministic() {
        let port = mock_port();
        let first = RecordingStore::default();
        let second = RecordingStore::default();
        let request = PipelineRequest::default();

        pipeline::run(&port, Some(&first), &request).unwrap();
        pipeline::run(&port, Some(&second), &request).unwrap();

        assert_eq!(*first.tables.borrow(), *second.tables.borrow());
        assert_eq!(first.tables.borrow().len(), 5);
    }

    #[test]
    fn every_table_has_one_row_per_panel_row() {
        let port = mock_port();
        let store = RecordingStore::default();

        let (summary, _) = pipeline::run(&port, Some(&store), &PipelineRequest::default()).unwrap();

        assert_eq!(summary.panel_rows, 140);
        for table in store.tables.borrow().iter() {
            assert_eq!(table.len(), 140, "{}", table.family);
        }
    }

    #[test]
    fn failing_symbol_is_skipped() {
        let port = mock_port().with_error("CCC", "connection reset");
        let request = PipelineRequest {
            symbols: Some(vec!["AAA".into(), "CCC".into()]),
            families: vec![FactorFamily::Momentum],
            ..PipelineRequest::default()
        };

        let (summary, tables) = pipeline::run(&port, None, &request).unwrap();
        assert_eq!(summary.symbols, 1);
        assert_eq!(summary.skipped[0].symbol, "CCC");
        assert!(tables[0].rows.iter().all(|r| r.symbol == "AAA"));
    }

    #[test]
    fn date_window_limits_output_but_reads_warm_up_history() {
        let port = mock_port();
        let request = PipelineRequest {
            start: Some(date(2024, 2, 1)),
            end: Some(date(2024, 2, 10)),
            families: vec![FactorFamily::Trend],
            ..PipelineRequest::default()
        };

        let (summary, tables) = pipeline::run(&port, None, &request).unwrap();
        // Jan 1 through Feb 10 for both symbols
        assert_eq!(summary.panel_rows, 82);
        assert_eq!(tables[0].len(), 20);
        assert!(
            tables[0]
                .rows
                .iter()
                .all(|r| r.date >= date(2024, 2, 1) && r.date <= date(2024, 2, 10))
        );

        let (_, full) = pipeline::run(&port, None, &PipelineRequest {
            families: vec![FactorFamily::Trend],
            ..PipelineRequest::default()
        })
        .unwrap();
        for row in &tables[0].rows {
            let same = full[0]
                .rows
                .iter()
                .find(|r| r.symbol == row.symbol && r.date == row.date)
                .unwrap();
            assert_eq!(row, same);
        }
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_store {
    use super::*;
    use equifactor::adapters::sqlite_adapter::SqliteAdapter;
    use equifactor::ports::factor_store_port::FactorStorePort;

    fn seeded() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let mut bars = generate_bars("AAA", "2024-01-01", 50, 40.0);
        bars.extend(generate_bars("BBB", "2024-01-01", 50, 70.0));
        adapter.upsert_ohlcv(&bars).unwrap();
        adapter
    }

    #[test]
    fn upserting_twice_leaves_one_row_per_key() {
        let adapter = seeded();
        let request = PipelineRequest::default();

        pipeline::run(&adapter, Some(&adapter), &request).unwrap();
        let (_, tables) = pipeline::run(&adapter, Some(&adapter), &request).unwrap();

        for family in FactorFamily::ALL {
            assert_eq!(adapter.count_rows(family).unwrap(), 100, "{family}");
        }

        let risk = tables
            .iter()
            .find(|t| t.family == FactorFamily::Risk)
            .unwrap();
        let stored = adapter
            .fetch_factor_column(FactorFamily::Risk, "vol_20d", "AAA")
            .unwrap();
        let computed: Vec<Option<f64>> = risk
            .rows
            .iter()
            .zip(risk.column("vol_20d").unwrap())
            .filter(|(row, _)| row.symbol == "AAA")
            .map(|(_, v)| v)
            .collect();
        let stored_values: Vec<Option<f64>> = stored.into_iter().map(|(_, v)| v).collect();
        assert_eq!(stored_values, computed);
    }

    #[test]
    fn reimported_bars_replace_prices() {
        let adapter = seeded();
        let mut bar = generate_bars("AAA", "2024-01-01", 1, 40.0).remove(0);
        bar.close = 1234.5;
        adapter.upsert_ohlcv(&[bar]).unwrap();

        let (_, tables) = pipeline::run(
            &adapter,
            None,
            &PipelineRequest {
                symbols: Some(vec!["AAA".into()]),
                families: vec![FactorFamily::Liquidity],
                ..PipelineRequest::default()
            },
        )
        .unwrap();
        assert_eq!(tables[0].len(), 50);

        let dv = tables[0].value("AAA", date(2024, 1, 1), "dollar_volume").unwrap();
        assert_eq!(dv, Some(1_234_500.0));
    }

    #[test]
    fn windowed_rerun_keeps_stored_values() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
            .upsert_ohlcv(&generate_bars("AAA", "2020-01-01", 400, 30.0))
            .unwrap();
        let families = vec![FactorFamily::Trend, FactorFamily::Momentum];

        let full = PipelineRequest {
            families: families.clone(),
            ..PipelineRequest::default()
        };
        pipeline::run(&adapter, Some(&adapter), &full).unwrap();
        let before_ma = adapter.fetch_factor_column(FactorFamily::Trend, "ma200", "AAA").unwrap();
        let before_adx = adapter.fetch_factor_column(FactorFamily::Trend, "adx14", "AAA").unwrap();
        let before_mom = adapter
            .fetch_factor_column(FactorFamily::Momentum, "mom_6m", "AAA")
            .unwrap();

        let windowed = PipelineRequest {
            families,
            start: Some(date(2020, 1, 1) + chrono::Duration::days(300)),
            ..PipelineRequest::default()
        };
        let (summary, _) = pipeline::run(&adapter, Some(&adapter), &windowed).unwrap();
        assert_eq!(summary.total_rows(), 200);

        assert_eq!(
            adapter.fetch_factor_column(FactorFamily::Trend, "ma200", "AAA").unwrap(),
            before_ma
        );
        assert_eq!(
            adapter.fetch_factor_column(FactorFamily::Trend, "adx14", "AAA").unwrap(),
            before_adx
        );
        assert_eq!(
            adapter
                .fetch_factor_column(FactorFamily::Momentum, "mom_6m", "AAA")
                .unwrap(),
            before_mom
        );
        assert_eq!(adapter.count_rows(FactorFamily::Trend).unwrap(), 400);
    }
}
