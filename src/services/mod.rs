//! Business logic services

pub mod appointments;
pub mod broadcaster;
pub mod clients;
pub mod csv_import;
pub mod field_mapper;
pub mod import_processor;
pub mod stats;

pub use clients::SaveError;
