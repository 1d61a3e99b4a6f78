//! Symbolic-to-canonical type translation.
//!
//! Two independent tables map the short names used in migrations to the
//! marshaller identifiers the store understands:
//!
//! ```text
//! comparator:   time | timestamp -> TimeUUIDType      column type: super    -> Super
//!               long             -> LongType                       standard -> Standard
//!               string           -> BytesType
//!               utf8             -> UTF8Type
//!               lexical_uuid     -> LexicalUUIDType
//! ```
//!
//! Comparator lookups are permissive: anything outside the table passes
//! through verbatim so store-native names keep working. Column types are
//! strict because an invalid structural type cannot be submitted safely.

use crate::{ColshiftResult, SchemaError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Canonical comparator for time-ordered column names.
pub const TIME_UUID_TYPE: &str = "TimeUUIDType";
/// Canonical comparator for 64-bit integer column names.
pub const LONG_TYPE: &str = "LongType";
/// Canonical comparator for raw byte column names.
pub const BYTES_TYPE: &str = "BytesType";
/// Canonical comparator for UTF-8 column names.
pub const UTF8_TYPE: &str = "UTF8Type";
/// Canonical comparator for lexically ordered UUID column names.
pub const LEXICAL_UUID_TYPE: &str = "LexicalUUIDType";

static COMPARATOR_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("time", TIME_UUID_TYPE),
        ("timestamp", TIME_UUID_TYPE),
        ("long", LONG_TYPE),
        ("string", BYTES_TYPE),
        ("utf8", UTF8_TYPE),
        ("lexical_uuid", LEXICAL_UUID_TYPE),
    ])
});

/// Symbolic comparator keys, in table order.
pub fn comparator_keys() -> &'static [&'static str] {
    &["time", "timestamp", "long", "string", "utf8", "lexical_uuid"]
}

/// Canonical comparator values reachable through the table.
pub fn canonical_comparators() -> &'static [&'static str] {
    &[
        TIME_UUID_TYPE,
        LONG_TYPE,
        BYTES_TYPE,
        UTF8_TYPE,
        LEXICAL_UUID_TYPE,
    ]
}

/// Resolve a comparator or validation class name.
///
/// Keys are case-sensitive. Unknown values are returned unchanged.
pub fn translate_comparator(value: &str) -> String {
    lookup_comparator(value)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// Table lookup without the pass-through fallback.
pub fn lookup_comparator(value: &str) -> Option<&'static str> {
    COMPARATOR_TYPES.get(value).copied()
}

/// Resolve a structural column type to its canonical name.
///
/// Input is lowercased before lookup, so `"Super"`, `"super"` and `"SUPER"`
/// all resolve to `"Super"`.
pub fn translate_column_type(value: &str) -> ColshiftResult<String> {
    Ok(ColumnType::from_db_str(value)?.as_db_str().to_string())
}

// ============================================================================
// COLUMN TYPE ENUM
// ============================================================================

/// Structural kind of a column family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColumnType {
    /// Rows hold plain columns
    #[default]
    Standard,
    /// Rows hold super columns, each containing sub-columns
    Super,
}

impl ColumnType {
    /// Convert to the store's canonical representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ColumnType::Standard => "Standard",
            ColumnType::Super => "Super",
        }
    }

    /// Parse a symbolic or canonical name, ignoring case.
    pub fn from_db_str(s: &str) -> Result<Self, SchemaError> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(ColumnType::Standard),
            "super" => Ok(ColumnType::Super),
            _ => Err(SchemaError::UnrecognizedColumnType {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// =============================================================================
// TESTS
// =============================================================================
