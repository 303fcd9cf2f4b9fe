//! Database queries

pub mod appointment;
pub mod client;
pub mod import_report;
pub mod stats;
