//! Concrete adapter implementations for ports.

pub mod file_config_adapter;
pub mod loaders;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
pub mod text_report_adapter;
