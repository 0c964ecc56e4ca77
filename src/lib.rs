//! equifactor: daily equity factor engine.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`pipeline`] ties a data port and
//! a store together for one run.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod logging;
pub mod pipeline;
pub mod ports;
