//! Type definitions

pub mod appointment;
pub mod client;
pub mod import_report;
pub mod messages;
pub mod stats;
pub mod validation;

pub use appointment::*;
pub use client::*;
pub use import_report::*;
pub use messages::*;
pub use stats::*;
pub use validation::*;
