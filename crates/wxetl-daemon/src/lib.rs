//! Wiring for the `wxetl` binary

pub mod config;
pub mod scheduler;
pub mod warehouse;

pub use config::{DaemonConfig, WarehouseTarget};
pub use scheduler::Scheduler;
pub use warehouse::open_warehouse;
