//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::{open_store, store_name};
use crate::domain::config_validation::{
    parse_optional_date, validate_factor_config, validate_pipeline_config,
};
use crate::domain::error::FactorError;
use crate::domain::factor::VarParams;
use crate::domain::family::{parse_families, FactorFamily, FactorSettings, FactorTable};
use crate::domain::universe::parse_symbols;
use crate::logging::{self, LogFormat};
use crate::pipeline::{self, format_duration, refresh_start, PipelineRequest};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "equifactor", about = "Daily equity factor engine")]
pub struct Cli {
    /// Log output format: pretty, compact or json
    #[arg(long, global = true, default_value = "compact")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute factor tables and upsert them into the store
    Compute {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated symbols, overriding [pipeline] symbols
        #[arg(long)]
        symbols: Option<String>,
        /// Family to compute (repeatable), overriding [pipeline] families
        #[arg(long)]
        family: Vec<FactorFamily>,
        /// Compute and preview without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Load <SYMBOL>.csv OHLCV files into the store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        csv_dir: PathBuf,
    },
    /// List symbols present in the store
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show stored date range per symbol
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbols: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    if let Err(e) = logging::init(cli.log_format, "info") {
        eprintln!("warning: logging not initialized: {e}");
    }

    match cli.command {
        Command::Compute {
            config,
            symbols,
            family,
            dry_run,
        } => run_compute(&config, symbols.as_deref(), &family, dry_run),
        Command::Import { config, csv_dir } => run_import(&config, &csv_dir),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Info { config, symbols } => run_info(&config, symbols.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: FactorError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::load(path).map_err(fail)
}

fn load_validated(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    let config = load_config(path)?;
    validate_pipeline_config(&config).map_err(fail)?;
    validate_factor_config(&config).map_err(fail)?;
    Ok(config)
}

/// VaR / CVaR parameters from `[factors]`.
pub fn build_factor_settings(config: &dyn ConfigPort) -> Result<FactorSettings, FactorError> {
    validate_factor_config(config)?;

    let defaults = VarParams::default();
    let capital = config.get_int("factors", "var_capital", defaults.capital as i64);
    let confidence = config.get_double("factors", "var_confidence", defaults.confidence());
    let horizon = config.get_int("factors", "var_horizon", defaults.horizon as i64);
    let lookback = config.get_int("factors", "var_lookback", defaults.lookback as i64);

    Ok(FactorSettings {
        var: VarParams {
            capital: capital as u64,
            confidence_bp: (confidence * 10_000.0).round() as u32,
            horizon: horizon as usize,
            lookback: lookback as usize,
        },
    })
}

/// Merge `[pipeline]` with command-line overrides.
pub fn build_pipeline_request(
    config: &dyn ConfigPort,
    symbols_override: Option<&str>,
    families_override: &[FactorFamily],
    dry_run: bool,
) -> Result<PipelineRequest, FactorError> {
    let symbols = match symbols_override {
        Some(s) => Some(parse_symbols(s)?),
        None => match config.get_string("pipeline", "symbols") {
            Some(s) if !s.trim().is_empty() => Some(parse_symbols(&s)?),
            _ => None,
        },
    };

    let families = if !families_override.is_empty() {
        let mut families = families_override.to_vec();
        families.sort();
        families.dedup();
        families
    } else {
        match config.get_string("pipeline", "families") {
            Some(s) if !s.trim().is_empty() => {
                parse_families(&s).map_err(|reason| FactorError::ConfigInvalid {
                    section: "pipeline".into(),
                    key: "families".into(),
                    reason,
                })?
            }
            _ => FactorFamily::ALL.to_vec(),
        }
    };

    Ok(PipelineRequest {
        symbols,
        families,
        start: parse_optional_date(config, "start_date")?,
        end: parse_optional_date(config, "end_date")?,
        settings: build_factor_settings(config)?,
        dry_run,
    })
}

fn run_compute(
    config_path: &Path,
    symbols: Option<&str>,
    families: &[FactorFamily],
    dry_run: bool,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_validated(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    // Stage 2: Build the run request
    let request = match build_pipeline_request(&config, symbols, families, dry_run) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    // Stage 3: Open the store
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let family_names: Vec<&str> = request.families.iter().map(|f| f.name()).collect();
    eprintln!(
        "Computing {} on {} store{}",
        family_names.join(", "),
        store_name(&config),
        if dry_run { " (dry run)" } else { "" }
    );

    // Stage 4: Run the pipeline
    let (summary, tables) = match pipeline::run(store.data(), Some(store.sink()), &request) {
        Ok(out) => out,
        Err(e) => return fail(e),
    };

    // Stage 5: Summary
    eprintln!("\n=== Run Summary ===");
    eprintln!("Symbols:     {}", summary.symbols);
    eprintln!("Panel rows:  {}", summary.panel_rows);
    for (family, rows) in &summary.tables {
        let verb = if dry_run { "computed" } else { "written" };
        eprintln!("  {:<24} {} rows {}", family.table_name(), rows, verb);
    }
    for skipped in &summary.skipped {
        eprintln!("  skipped {}: {}", skipped.symbol, skipped.reason);
    }
    eprintln!("Elapsed:     {}", format_duration(summary.elapsed.as_secs()));

    if dry_run {
        for table in &tables {
            print_preview(table);
        }
    }

    ExitCode::SUCCESS
}

/// Last row per symbol, one `column=value` pair per factor.
fn print_preview(table: &FactorTable) {
    println!("[{}]", table.family.table_name());
    let names = table.column_names();

    let last_rows = table
        .rows
        .iter()
        .enumerate()
        .filter(|(i, row)| {
            table
                .rows
                .get(i + 1)
                .is_none_or(|next| next.symbol != row.symbol)
        })
        .map(|(_, row)| row);

    for row in last_rows {
        let cells: Vec<String> = names
            .iter()
            .zip(&row.values)
            .map(|(name, value)| match value {
                Some(v) => format!("{name}={v}"),
                None => format!("{name}=-"),
            })
            .collect();
        println!("{} {} {}", row.symbol, row.date, cells.join(" "));
    }
}

fn run_import(config_path: &Path, csv_dir: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_pipeline_config(&config) {
        return fail(e);
    }

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let source = CsvAdapter::new(csv_dir.to_path_buf(), csv_dir.to_path_buf());
    let symbols = match source.list_symbols() {
        Ok(s) if !s.is_empty() => s,
        Ok(_) => {
            return fail(FactorError::NoData {
                symbol: csv_dir.display().to_string(),
            });
        }
        Err(e) => return fail(e),
    };

    let mut total = 0;
    for symbol in &symbols {
        let bars = match source.read_symbol(symbol) {
            Ok(b) => b,
            Err(e) => return fail(e),
        };
        match store.sink().upsert_ohlcv(&bars) {
            Ok(n) => {
                tracing::info!(symbol = %symbol, rows = n, "ohlcv upserted");
                total += n;
            }
            Err(e) => return fail(e),
        }
    }
    eprintln!("Imported {} bars for {} symbols", total, symbols.len());

    match store.data().latest_date() {
        Ok(Some(latest)) => {
            eprintln!("Latest stored date: {}", latest);
            if let Some(from) = refresh_start(Some(latest)) {
                eprintln!("Next refresh from:  {}", from);
            }
        }
        Ok(None) => eprintln!("Store is empty"),
        Err(e) => return fail(e),
    }

    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let symbols = match store.data().list_symbols() {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, symbols_override: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let requested = symbols_override
        .map(str::to_string)
        .or_else(|| config.get_string("pipeline", "symbols"))
        .filter(|s| !s.trim().is_empty());
    let symbols = match requested {
        Some(s) => match parse_symbols(&s) {
            Ok(list) => list,
            Err(e) => return fail(e.into()),
        },
        None => match store.data().list_symbols() {
            Ok(list) => list,
            Err(e) => return fail(e),
        },
    };

    for symbol in &symbols {
        match store.data().get_data_range(symbol) {
            Ok(Some((min_date, max_date, count))) => {
                println!("{}: {} bars, {} to {}", symbol, count, min_date, max_date);
            }
            Ok(None) => eprintln!("{}: no data found", symbol),
            Err(e) => eprintln!("error querying {}: {}", symbol, e),
        }
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_validated(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let request = match build_pipeline_request(&config, None, &[], false) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    eprintln!("\nStore:    {}", store_name(&config));
    match &request.symbols {
        Some(symbols) => eprintln!("Symbols:  {}", symbols.join(", ")),
        None => eprintln!("Symbols:  (all stored)"),
    }
    let names: Vec<&str> = request.families.iter().map(|f| f.name()).collect();
    eprintln!("Families: {}", names.join(", "));
    if let Some(start) = request.start {
        eprintln!("Start:    {}", start);
    }
    if let Some(end) = request.end {
        eprintln!("End:      {}", end);
    }
    let var = request.settings.var;
    eprintln!(
        "VaR:      capital {}, confidence {:.4}, horizon {}, lookback {}",
        var.capital,
        var.confidence(),
        var.horizon,
        var.lookback
    );

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}
