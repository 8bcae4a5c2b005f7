pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{CsvPositionSource, MockPositionSource, PositionSource, SourceError};
pub use db::{init_db, Repository};
pub use domain::{
    Combo, ComboRecord, CreditDebit, Decimal, ExecutionRecord, Leg, PositionEffect,
    PositionSnapshot, Structure, TimeMs, Underlying,
};
pub use error::EngineError;
pub use orchestration::{ComboSync, Reconciler};
