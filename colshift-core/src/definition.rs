//! Column family and secondary index definitions.

use crate::translate::{translate_comparator, ColumnType, TIME_UUID_TYPE};
use crate::{ColshiftResult, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// NAMES
// ============================================================================

/// Owned keyspace, column family or column name.
///
/// Every name-taking operation accepts anything string-like and coerces it
/// to this form before it reaches the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&String> for Name {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

impl From<&Name> for Name {
    fn from(n: &Name) -> Self {
        n.clone()
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// COLUMN METADATA
// ============================================================================

/// Per-column metadata carried by a column family, used for secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub validation_class: String,
    pub index_name: Option<String>,
}

// ============================================================================
// COLUMN FAMILY DEFINITION
// ============================================================================

/// A column family as submitted to, or read back from, the cluster.
///
/// `comparator_type`, `subcomparator_type` and `column_type` may hold symbolic
/// names until the definition has been normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFamilyDefinition {
    name: String,
    keyspace: String,
    pub comparator_type: Option<String>,
    pub subcomparator_type: Option<String>,
    pub column_type: String,
    pub comment: Option<String>,
    pub default_validation_class: Option<String>,
    pub key_validation_class: Option<String>,
    pub gc_grace_seconds: Option<i32>,
    pub read_repair_chance: Option<f64>,
    #[serde(default)]
    pub column_metadata: Vec<ColumnDefinition>,
    /// Store settings this crate does not interpret (caching, compaction, ...).
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl ColumnFamilyDefinition {
    /// Bare definition: no comparator, `Standard` column type.
    pub fn new(name: impl Into<Name>, keyspace: impl Into<Name>) -> Self {
        Self {
            name: name.into().into_string(),
            keyspace: keyspace.into().into_string(),
            comparator_type: None,
            subcomparator_type: None,
            column_type: ColumnType::Standard.as_db_str().to_string(),
            comment: None,
            default_validation_class: None,
            key_validation_class: None,
            gc_grace_seconds: None,
            read_repair_chance: None,
            column_metadata: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Definition with the defaults applied on `create`: time-ordered comparator.
    pub fn with_create_defaults(name: impl Into<Name>, keyspace: impl Into<Name>) -> Self {
        Self::new(name, keyspace).comparator(TIME_UUID_TYPE)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// The same definition under another name, as a connection stores it
    /// after a rename.
    pub fn renamed(self, name: impl Into<Name>) -> Self {
        Self {
            name: name.into().into_string(),
            ..self
        }
    }

    pub fn comparator(mut self, value: impl Into<String>) -> Self {
        self.comparator_type = Some(value.into());
        self
    }

    pub fn subcomparator(mut self, value: impl Into<String>) -> Self {
        self.subcomparator_type = Some(value.into());
        self
    }

    pub fn column_type(mut self, value: impl Into<String>) -> Self {
        self.column_type = value.into();
        self
    }

    pub fn comment(mut self, value: impl Into<String>) -> Self {
        self.comment = Some(value.into());
        self
    }

    /// Set an opaque store setting.
    pub fn extra_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Find metadata for an indexed column.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.column_metadata.iter().find(|c| c.name == name)
    }

    /// Apply a bag of fields.
    ///
    /// Keys naming a typed field (`comparator_type`, `subcomparator_type`,
    /// `column_type`, `comment`, `default_validation_class`,
    /// `key_validation_class`, `gc_grace_seconds`, `read_repair_chance`) are
    /// set on it; `null` clears an optional field. Other keys land in `extra`
    /// unchanged. `name` and `keyspace` cannot be changed this way.
    pub fn with_fields(mut self, fields: &Map<String, Value>) -> ColshiftResult<Self> {
        self.apply_fields(fields)?;
        Ok(self)
    }

    /// In-place variant of [`with_fields`](Self::with_fields). On error some
    /// fields may already be applied.
    pub fn apply_fields(&mut self, fields: &Map<String, Value>) -> ColshiftResult<()> {
        for (key, value) in fields {
            match key.as_str() {
                "name" | "keyspace" => {
                    return Err(SchemaError::InvalidField {
                        field: key.clone(),
                        reason: "cannot be set through a field bag".to_string(),
                    }
                    .into())
                }
                "comparator_type" => self.comparator_type = optional_string(key, value)?,
                "subcomparator_type" => self.subcomparator_type = optional_string(key, value)?,
                "column_type" => {
                    self.column_type = optional_string(key, value)?
                        .unwrap_or_else(|| ColumnType::Standard.as_db_str().to_string())
                }
                "comment" => self.comment = optional_string(key, value)?,
                "default_validation_class" => {
                    self.default_validation_class = optional_string(key, value)?
                }
                "key_validation_class" => self.key_validation_class = optional_string(key, value)?,
                "gc_grace_seconds" => {
                    self.gc_grace_seconds = match value {
                        Value::Null => None,
                        Value::Number(n) => Some(
                            n.as_i64()
                                .and_then(|v| i32::try_from(v).ok())
                                .ok_or_else(|| invalid_field(key, "expected a 32-bit integer"))?,
                        ),
                        _ => return Err(invalid_field(key, "expected a 32-bit integer").into()),
                    }
                }
                "read_repair_chance" => {
                    self.read_repair_chance = match value {
                        Value::Null => None,
                        Value::Number(n) => Some(
                            n.as_f64()
                                .ok_or_else(|| invalid_field(key, "expected a number"))?,
                        ),
                        _ => return Err(invalid_field(key, "expected a number").into()),
                    }
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}

fn invalid_field(field: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn optional_string(field: &str, value: &Value) -> Result<Option<String>, SchemaError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(invalid_field(field, "expected a string")),
    }
}

// ============================================================================
// OVERRIDES
// ============================================================================

/// Caller-supplied field overrides applied to a definition before it is normalized.
///
/// Unset fields leave the definition untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnFamilyOverrides {
    pub comparator_type: Option<String>,
    pub subcomparator_type: Option<String>,
    pub column_type: Option<String>,
    pub comment: Option<String>,
    pub default_validation_class: Option<String>,
    pub key_validation_class: Option<String>,
    pub gc_grace_seconds: Option<i32>,
    pub read_repair_chance: Option<f64>,
    pub extra: BTreeMap<String, Value>,
}

impl ColumnFamilyOverrides {
    pub fn apply_to(&self, cf: &mut ColumnFamilyDefinition) {
        if let Some(v) = &self.comparator_type {
            cf.comparator_type = Some(v.clone());
        }
        if let Some(v) = &self.subcomparator_type {
            cf.subcomparator_type = Some(v.clone());
        }
        if let Some(v) = &self.column_type {
            cf.column_type = v.clone();
        }
        if let Some(v) = &self.comment {
            cf.comment = Some(v.clone());
        }
        if let Some(v) = &self.default_validation_class {
            cf.default_validation_class = Some(v.clone());
        }
        if let Some(v) = &self.key_validation_class {
            cf.key_validation_class = Some(v.clone());
        }
        if let Some(v) = self.gc_grace_seconds {
            cf.gc_grace_seconds = Some(v);
        }
        if let Some(v) = self.read_repair_chance {
            cf.read_repair_chance = Some(v);
        }
        for (k, v) in &self.extra {
            cf.extra.insert(k.clone(), v.clone());
        }
    }
}

// ============================================================================
// SECONDARY INDEX DEFINITION
// ============================================================================

/// Transient description of a secondary index request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndexDefinition {
    pub column_family: String,
    pub column_name: String,
    pub validation_class: String,
}

impl SecondaryIndexDefinition {
    /// Build an index request, resolving `value_type` through the comparator
    /// table. Unknown validation classes are kept as given.
    pub fn new(
        column_family: impl Into<Name>,
        column_name: impl Into<Name>,
        value_type: &str,
    ) -> Self {
        Self {
            column_family: column_family.into().into_string(),
            column_name: column_name.into().into_string(),
            validation_class: translate_comparator(value_type),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColshiftError;
    use serde_json::json;

    #[test]
    fn test_name_coercion() {
        let owned = String::from("tweets");
        assert_eq!(Name::from("tweets"), Name::from(owned.clone()));
        assert_eq!(Name::from(&owned), "tweets");
        assert_eq!(Name::new("tweets").to_string(), "tweets");
    }

    #[test]
    fn test_create_defaults() {
        let cf = ColumnFamilyDefinition::with_create_defaults("tweets", "app");
        assert_eq!(cf.name(), "tweets");
        assert_eq!(cf.keyspace(), "app");
        assert_eq!(cf.comparator_type.as_deref(), Some("TimeUUIDType"));
        assert_eq!(cf.column_type, "Standard");
        assert!(cf.comment.is_none());
    }

    #[test]
    fn test_with_fields_sets_known_and_keeps_unknown() {
        let fields = json!({
            "comment": "timeline",
            "comparator_type": "long",
            "gc_grace_seconds": 3600,
            "caching": "keys_only",
        });
        let cf = ColumnFamilyDefinition::new("tweets", "app")
            .with_fields(fields.as_object().unwrap())
            .unwrap();

        assert_eq!(cf.comment.as_deref(), Some("timeline"));
        assert_eq!(cf.comparator_type.as_deref(), Some("long"));
        assert_eq!(cf.gc_grace_seconds, Some(3600));
        assert_eq!(cf.extra.get("caching"), Some(&json!("keys_only")));
    }

    #[test]
    fn test_with_fields_null_clears() {
        let cf = ColumnFamilyDefinition::new("tweets", "app").comment("old");
        let cf = cf
            .with_fields(json!({ "comment": null }).as_object().unwrap())
            .unwrap();
        assert!(cf.comment.is_none());
    }

    #[test]
    fn test_with_fields_rejects_name() {
        let result = ColumnFamilyDefinition::new("tweets", "app")
            .with_fields(json!({ "name": "other" }).as_object().unwrap());
        assert!(matches!(
            result,
            Err(ColshiftError::Schema(SchemaError::InvalidField { ref field, .. })) if field == "name"
        ));
    }

    #[test]
    fn test_renamed_keeps_settings() {
        let cf = ColumnFamilyDefinition::with_create_defaults("old", "app")
            .comment("keep")
            .renamed("new");
        assert_eq!(cf.name(), "new");
        assert_eq!(cf.keyspace(), "app");
        assert_eq!(cf.comment.as_deref(), Some("keep"));
        assert_eq!(cf.comparator_type.as_deref(), Some("TimeUUIDType"));
    }

    #[test]
    fn test_with_fields_rejects_wrong_type() {
        let result = ColumnFamilyDefinition::new("tweets", "app")
            .with_fields(json!({ "gc_grace_seconds": "soon" }).as_object().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_only_touch_set_fields() {
        let mut cf = ColumnFamilyDefinition::with_create_defaults("tweets", "app").comment("keep");
        let overrides = ColumnFamilyOverrides {
            comparator_type: Some("utf8".to_string()),
            ..Default::default()
        };
        overrides.apply_to(&mut cf);

        assert_eq!(cf.comparator_type.as_deref(), Some("utf8"));
        assert_eq!(cf.comment.as_deref(), Some("keep"));
        assert_eq!(cf.column_type, "Standard");
    }

    #[test]
    fn test_secondary_index_resolution() {
        let idx = SecondaryIndexDefinition::new("some_cf", "some_column", "long");
        assert_eq!(idx.validation_class, "LongType");

        let idx = SecondaryIndexDefinition::new("some_cf", "some_column", "CrazyType");
        assert_eq!(idx.validation_class, "CrazyType");
    }
}
