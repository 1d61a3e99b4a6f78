//! colshift Core - Definitions and Type Translation
//!
//! Column family and secondary index definitions, the symbolic-to-canonical
//! type tables, definition normalization, errors and configuration. Pure
//! data and pure functions; nothing here talks to a cluster.

pub mod config;
pub mod definition;
pub mod error;
pub mod normalize;
pub mod translate;

pub use config::{LogFormat, LoggingConfig, MigrationConfig, SYSTEM_KEYSPACE};
pub use definition::{
    ColumnDefinition, ColumnFamilyDefinition, ColumnFamilyOverrides, Name,
    SecondaryIndexDefinition,
};
pub use error::{
    AgreementError, ColshiftError, ColshiftResult, ConfigError, ConnectionError, SchemaError,
};
pub use normalize::{normalize, normalize_in_place};
pub use translate::{translate_column_type, translate_comparator, ColumnType};
