//! Port traits: the boundary between domain logic and I/O.

pub mod config_port;
pub mod data_port;
pub mod factor_store_port;
