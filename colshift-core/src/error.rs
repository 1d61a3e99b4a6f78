//! Error types for colshift operations

use std::time::Duration;
use thiserror::Error;

/// Schema definition and validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Cannot operate on reserved keyspace: {keyspace}")]
    InvalidKeyspace { keyspace: String },

    #[error("Column family not found: {name}")]
    ColumnFamilyNotFound { name: String },

    #[error("Unrecognized column_type {value}")]
    UnrecognizedColumnType { value: String },

    #[error("Invalid value for field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Schema agreement errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgreementError {
    #[error("Failed to obtain schema agreement after {attempts} attempts ({waited:?} waited)")]
    SchemaAgreementTimeout { attempts: u32, waited: Duration },
}

/// Errors raised by a connection to the cluster.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("{operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Column family already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Column family does not exist: {name}")]
    UnknownColumnFamily { name: String },

    #[error("Index on {column_family}.{column_name} does not exist")]
    UnknownIndex {
        column_family: String,
        column_name: String,
    },

    #[error("Connection lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use COLSHIFT_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for all colshift errors.
#[derive(Debug, Error)]
pub enum ColshiftError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Agreement error: {0}")]
    Agreement(#[from] AgreementError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ColshiftError {
    /// True when the cluster may hold a partially propagated schema change.
    pub fn is_convergence_unknown(&self) -> bool {
        matches!(
            self,
            ColshiftError::Agreement(AgreementError::SchemaAgreementTimeout { .. })
        )
    }
}

/// Result type alias for colshift operations.
pub type ColshiftResult<T> = Result<T, ColshiftError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display_invalid_keyspace() {
        let err = SchemaError::InvalidKeyspace {
            keyspace: "system".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("reserved keyspace"));
        assert!(msg.contains("system"));
    }

    #[test]
    fn test_schema_error_display_unrecognized_column_type() {
        let err = SchemaError::UnrecognizedColumnType {
            value: "foo".to_string(),
        };
        assert_eq!(format!("{}", err), "Unrecognized column_type foo");
    }

    #[test]
    fn test_agreement_error_display_timeout() {
        let err = AgreementError::SchemaAgreementTimeout {
            attempts: 30,
            waited: Duration::from_secs(30),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("schema agreement"));
        assert!(msg.contains("30 attempts"));
    }

    #[test]
    fn test_connection_error_display_unknown_index() {
        let err = ConnectionError::UnknownIndex {
            column_family: "tweets".to_string(),
            column_name: "user_id".to_string(),
        };
        assert!(format!("{}", err).contains("tweets.user_id"));
    }

    #[test]
    fn test_colshift_error_from_variants() {
        let schema = ColshiftError::from(SchemaError::ColumnFamilyNotFound {
            name: "missing".to_string(),
        });
        assert!(matches!(schema, ColshiftError::Schema(_)));

        let agreement = ColshiftError::from(AgreementError::SchemaAgreementTimeout {
            attempts: 30,
            waited: Duration::from_secs(30),
        });
        assert!(matches!(agreement, ColshiftError::Agreement(_)));

        let connection = ColshiftError::from(ConnectionError::LockPoisoned);
        assert!(matches!(connection, ColshiftError::Connection(_)));

        let config = ColshiftError::from(ConfigError::MissingConfigPath);
        assert!(matches!(config, ColshiftError::Config(_)));
    }

    #[test]
    fn test_only_timeout_leaves_convergence_unknown() {
        let timeout = ColshiftError::from(AgreementError::SchemaAgreementTimeout {
            attempts: 30,
            waited: Duration::from_secs(30),
        });
        assert!(timeout.is_convergence_unknown());

        let not_found = ColshiftError::from(SchemaError::ColumnFamilyNotFound {
            name: "x".to_string(),
        });
        assert!(!not_found.is_convergence_unknown());
    }
}
