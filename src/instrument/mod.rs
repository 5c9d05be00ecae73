//! Instrumentation orchestration.

pub mod config;
pub mod id_map;
pub mod instrumenter;
pub mod options;

pub use config::{Configuration, ConfigurationBuilder, LoggerFile, LoggerProperties};
pub use id_map::IdMap;
pub use instrumenter::{Injection, InstrumentReport, Instrumenter};
pub use options::InstrumenterOptions;
