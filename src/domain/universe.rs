//! Symbol universe: parse the configured list and drop symbols the store has
//! no history for.

use crate::domain::error::FactorError;
use crate::ports::data_port::DataPort;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

impl From<UniverseError> for FactorError {
    fn from(err: UniverseError) -> Self {
        FactorError::ConfigInvalid {
            section: "pipeline".into(),
            key: "symbols".into(),
            reason: err.to_string(),
        }
    }
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Universe {
    pub symbols: Vec<String>,
    pub skipped: Vec<SkippedSymbol>,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.symbols.len()
    }
}

/// Resolve the symbols to process.
///
/// With no explicit request every stored symbol is used. Requested symbols
/// without stored bars (or whose lookup fails) are skipped with a warning;
/// an empty result is `NoData`.
pub fn resolve_universe(
    data_port: &dyn DataPort,
    requested: Option<&[String]>,
) -> Result<Universe, FactorError> {
    let Some(requested) = requested else {
        let symbols = data_port.list_symbols()?;
        if symbols.is_empty() {
            return Err(FactorError::NoData {
                symbol: "all".into(),
            });
        }
        return Ok(Universe {
            symbols,
            skipped: Vec::new(),
        });
    };

    let mut universe = Universe::default();
    for symbol in requested {
        match data_port.get_data_range(symbol) {
            Ok(Some((_, _, count))) if count > 0 => universe.symbols.push(symbol.clone()),
            Ok(_) => {
                tracing::warn!(symbol = %symbol, "skipping symbol: no stored bars");
                universe.skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: "no data".into(),
                });
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "skipping symbol");
                universe.skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if universe.symbols.is_empty() {
        return Err(FactorError::NoData {
            symbol: requested.join(","),
        });
    }
    Ok(universe)
}
