//! Core domain types and logic. No I/O.

pub mod config_validation;
pub mod error;
pub mod factor;
pub mod family;
pub mod ohlcv;
pub mod panel;
pub mod universe;
pub mod window;
