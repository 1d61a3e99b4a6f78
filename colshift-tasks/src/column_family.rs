//! Column family schema tasks.
//!
//! A [`ColumnFamilyTask`] is bound to one keyspace and runs every schema
//! change end to end: build or fetch the definition, apply caller overrides,
//! normalize, submit, then wait for the cluster to agree. Only `clear` skips
//! the wait since truncation does not touch schema metadata.
//!
//! Callers must not run two mutations against the same column family at
//! once; the store has no compare-and-swap on schema versions.

use crate::agreement::{SchemaAgreementPoller, SchemaAgreementState, Sleeper, ThreadSleeper};
use colshift_connection::Connection;
use colshift_core::{
    normalize, ColshiftResult, ColumnDefinition, ColumnFamilyDefinition, ColumnFamilyOverrides,
    MigrationConfig, Name, SchemaError, SecondaryIndexDefinition, SYSTEM_KEYSPACE,
};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Schema operations for the column families of one keyspace.
#[derive(Clone)]
pub struct ColumnFamilyTask {
    keyspace: String,
    connection: Arc<dyn Connection>,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for ColumnFamilyTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnFamilyTask")
            .field("keyspace", &self.keyspace)
            .finish_non_exhaustive()
    }
}

impl ColumnFamilyTask {
    /// Bind a task to `keyspace`, sleeping on the real clock between polls.
    ///
    /// Fails with `InvalidKeyspace` for the reserved system keyspace.
    pub fn new(keyspace: impl Into<Name>, connection: Arc<dyn Connection>) -> ColshiftResult<Self> {
        Self::with_sleeper(keyspace, connection, Arc::new(ThreadSleeper))
    }

    /// Bind a task with an explicit sleeper (simulated clocks in tests).
    pub fn with_sleeper(
        keyspace: impl Into<Name>,
        connection: Arc<dyn Connection>,
        sleeper: Arc<dyn Sleeper>,
    ) -> ColshiftResult<Self> {
        let keyspace = keyspace.into().into_string();
        if keyspace == SYSTEM_KEYSPACE {
            return Err(SchemaError::InvalidKeyspace { keyspace }.into());
        }
        Ok(Self {
            keyspace,
            connection,
            sleeper,
        })
    }

    /// Bind a task to the keyspace named in `config`.
    ///
    /// The reserved keyspace fails with `InvalidKeyspace`, like [`new`](Self::new);
    /// other invalid settings fail with a config error.
    pub fn from_config(
        config: &MigrationConfig,
        connection: Arc<dyn Connection>,
    ) -> ColshiftResult<Self> {
        let task = Self::new(config.keyspace.as_str(), connection)?;
        config.validate()?;
        Ok(task)
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Whether the cluster schema has a column family called `name`.
    pub fn exists(&self, name: impl Into<Name>) -> ColshiftResult<bool> {
        Ok(self.find_by_name(&name.into())?.is_some())
    }

    /// Current definition of `name`, if any.
    pub fn find_by_name(&self, name: &Name) -> ColshiftResult<Option<ColumnFamilyDefinition>> {
        Ok(self
            .connection
            .current_schema()?
            .into_iter()
            .find(|cf| cf.name() == name.as_str()))
    }

    /// Indexed columns of `cf_name`.
    pub fn secondary_indexes(&self, cf_name: impl Into<Name>) -> ColshiftResult<Vec<ColumnDefinition>> {
        let cf_name = cf_name.into();
        let cf = self
            .find_by_name(&cf_name)?
            .ok_or_else(|| SchemaError::ColumnFamilyNotFound {
                name: cf_name.to_string(),
            })?;
        Ok(cf
            .column_metadata
            .into_iter()
            .filter(|c| c.index_name.is_some())
            .collect())
    }

    // ========================================================================
    // COLUMN FAMILY OPERATIONS
    // ========================================================================

    /// Create a column family with default settings.
    pub fn create(&self, name: impl Into<Name>) -> ColshiftResult<SchemaAgreementState> {
        self.create_with(name, |_| {})
    }

    /// Create a column family, letting `mutate` override the defaults.
    ///
    /// Defaults are a `TimeUUIDType` comparator and a `Standard` column type.
    /// `mutate` may not change the name or keyspace.
    pub fn create_with<F>(&self, name: impl Into<Name>, mutate: F) -> ColshiftResult<SchemaAgreementState>
    where
        F: FnOnce(&mut ColumnFamilyDefinition),
    {
        let name = name.into();
        let mut cf = ColumnFamilyDefinition::with_create_defaults(&name, self.keyspace.as_str());
        mutate(&mut cf);
        self.check_identity(&cf, &name)?;
        let cf = normalize(cf)?;

        info!(
            keyspace = %self.keyspace,
            column_family = %cf.name(),
            comparator = ?cf.comparator_type,
            column_type = %cf.column_type,
            "Adding column family"
        );
        self.connection.add_column_family(&cf)?;
        self.wait_for_schema_agreement()
    }

    /// Create a column family from a set of field overrides.
    pub fn create_from(
        &self,
        name: impl Into<Name>,
        overrides: &ColumnFamilyOverrides,
    ) -> ColshiftResult<SchemaAgreementState> {
        self.create_with(name, |cf| overrides.apply_to(cf))
    }

    /// Fetch `name` from the cluster, let `mutate` change it, and submit it.
    ///
    /// Fails with `ColumnFamilyNotFound` before any mutation is sent when the
    /// column family does not exist. `mutate` may not change the name or
    /// keyspace.
    pub fn update<F>(&self, name: impl Into<Name>, mutate: F) -> ColshiftResult<SchemaAgreementState>
    where
        F: FnOnce(&mut ColumnFamilyDefinition),
    {
        self.try_update(name, |cf| {
            mutate(cf);
            Ok(())
        })
    }

    /// Like [`update`](Self::update), with a mutation that can fail. A failed
    /// mutation submits nothing.
    pub fn try_update<F>(&self, name: impl Into<Name>, mutate: F) -> ColshiftResult<SchemaAgreementState>
    where
        F: FnOnce(&mut ColumnFamilyDefinition) -> ColshiftResult<()>,
    {
        let name = name.into();
        let mut cf = self
            .find_by_name(&name)?
            .ok_or_else(|| SchemaError::ColumnFamilyNotFound {
                name: name.to_string(),
            })?;
        mutate(&mut cf)?;
        self.check_identity(&cf, &name)?;
        let cf = normalize(cf)?;

        info!(
            keyspace = %self.keyspace,
            column_family = %cf.name(),
            "Updating column family"
        );
        self.connection.update_column_family(&cf)?;
        self.wait_for_schema_agreement()
    }

    /// Update `name` from a set of field overrides.
    pub fn update_from(
        &self,
        name: impl Into<Name>,
        overrides: &ColumnFamilyOverrides,
    ) -> ColshiftResult<SchemaAgreementState> {
        self.update(name, |cf| overrides.apply_to(cf))
    }

    /// Update `name` from a JSON field bag; see [`ColumnFamilyDefinition::with_fields`].
    pub fn update_with_fields(
        &self,
        name: impl Into<Name>,
        fields: &Map<String, Value>,
    ) -> ColshiftResult<SchemaAgreementState> {
        self.try_update(name, |cf| cf.apply_fields(fields))
    }

    /// Drop a column family.
    pub fn drop(&self, name: impl Into<Name>) -> ColshiftResult<SchemaAgreementState> {
        let name = name.into();
        info!(keyspace = %self.keyspace, column_family = %name, "Dropping column family");
        self.connection.drop_column_family(name.as_str())?;
        self.wait_for_schema_agreement()
    }

    /// Rename a column family.
    pub fn rename(
        &self,
        old_name: impl Into<Name>,
        new_name: impl Into<Name>,
    ) -> ColshiftResult<SchemaAgreementState> {
        let old_name = old_name.into();
        let new_name = new_name.into();
        info!(
            keyspace = %self.keyspace,
            from = %old_name,
            to = %new_name,
            "Renaming column family"
        );
        self.connection
            .rename_column_family(old_name.as_str(), new_name.as_str())?;
        self.wait_for_schema_agreement()
    }

    /// Truncate a column family's data. Does not wait for schema agreement.
    pub fn clear(&self, name: impl Into<Name>) -> ColshiftResult<()> {
        let name = name.into();
        info!(keyspace = %self.keyspace, column_family = %name, "Truncating column family");
        self.connection.truncate(name.as_str())
    }

    // ========================================================================
    // INDEX OPERATIONS
    // ========================================================================

    /// Create a secondary index on `column_name`.
    ///
    /// `value_type` goes through the comparator table; unknown validation
    /// classes are submitted as given.
    pub fn create_index(
        &self,
        cf_name: impl Into<Name>,
        column_name: impl Into<Name>,
        value_type: &str,
    ) -> ColshiftResult<SchemaAgreementState> {
        let index = SecondaryIndexDefinition::new(cf_name, column_name, value_type);
        info!(
            keyspace = %self.keyspace,
            column_family = %index.column_family,
            column = %index.column_name,
            validation_class = %index.validation_class,
            "Creating secondary index"
        );
        self.connection.create_index(
            &self.keyspace,
            &index.column_family,
            &index.column_name,
            &index.validation_class,
        )?;
        self.wait_for_schema_agreement()
    }

    /// Drop the secondary index on `column_name`.
    pub fn drop_index(
        &self,
        cf_name: impl Into<Name>,
        column_name: impl Into<Name>,
    ) -> ColshiftResult<SchemaAgreementState> {
        let cf_name = cf_name.into();
        let column_name = column_name.into();
        info!(
            keyspace = %self.keyspace,
            column_family = %cf_name,
            column = %column_name,
            "Dropping secondary index"
        );
        self.connection
            .drop_index(&self.keyspace, cf_name.as_str(), column_name.as_str())?;
        self.wait_for_schema_agreement()
    }

    fn check_identity(&self, cf: &ColumnFamilyDefinition, name: &Name) -> Result<(), SchemaError> {
        if cf.name() != name.as_str() {
            return Err(SchemaError::InvalidField {
                field: "name".to_string(),
                reason: format!("'{}' cannot be renamed to '{}' here; use rename", name, cf.name()),
            });
        }
        if cf.keyspace() != self.keyspace {
            return Err(SchemaError::InvalidField {
                field: "keyspace".to_string(),
                reason: format!("task is bound to '{}'", self.keyspace),
            });
        }
        Ok(())
    }

    fn wait_for_schema_agreement(&self) -> ColshiftResult<SchemaAgreementState> {
        SchemaAgreementPoller::new(self.connection.as_ref(), self.sleeper.as_ref()).wait()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agreement::{AgreementOutcome, SimulatedSleeper};
    use colshift_connection::{ConnectionCall, MockConnection};
    use colshift_core::{AgreementError, ColshiftError};

    fn make_task() -> (ColumnFamilyTask, Arc<MockConnection>, Arc<SimulatedSleeper>) {
        let conn = Arc::new(MockConnection::new("active_column"));
        let sleeper = Arc::new(SimulatedSleeper::new());
        let task = ColumnFamilyTask::with_sleeper("active_column", conn.clone(), sleeper.clone())
            .unwrap();
        (task, conn, sleeper)
    }

    #[test]
    fn test_system_keyspace_rejected() {
        let conn = Arc::new(MockConnection::new("system"));
        let result = ColumnFamilyTask::new("system", conn.clone());
        assert!(matches!(
            result,
            Err(ColshiftError::Schema(SchemaError::InvalidKeyspace { .. }))
        ));
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn test_from_config() {
        let conn = Arc::new(MockConnection::new("app"));
        let task = ColumnFamilyTask::from_config(&MigrationConfig::for_keyspace("app"), conn).unwrap();
        assert_eq!(task.keyspace(), "app");

        let conn = Arc::new(MockConnection::new("system"));
        let result = ColumnFamilyTask::from_config(&MigrationConfig::for_keyspace("system"), conn);
        assert!(matches!(
            result,
            Err(ColshiftError::Schema(SchemaError::InvalidKeyspace { ref keyspace })) if keyspace == "system"
        ));
    }

    #[test]
    fn test_from_config_reports_other_settings_as_config_errors() {
        let mut config = MigrationConfig::for_keyspace("app");
        config.logging.filter = " ".to_string();
        let conn = Arc::new(MockConnection::new("app"));
        assert!(matches!(
            ColumnFamilyTask::from_config(&config, conn),
            Err(ColshiftError::Config(_))
        ));
    }

    #[test]
    fn test_create_with_defaults() {
        let (task, conn, sleeper) = make_task();
        let state = task.create("foo").unwrap();

        assert_eq!(state.outcome, Some(AgreementOutcome::Agreed));
        let cf = conn.column_family("foo").unwrap();
        assert_eq!(cf.keyspace(), "active_column");
        assert_eq!(cf.comparator_type.as_deref(), Some("TimeUUIDType"));
        assert_eq!(cf.column_type, "Standard");
        assert!(cf.comment.is_none());
        assert_eq!(sleeper.sleep_count(), 0);
    }

    #[test]
    fn test_create_applies_and_normalizes_overrides() {
        let (task, conn, _) = make_task();
        task.create_with("test_cf", |cf| {
            cf.comment = Some("foo".to_string());
            cf.comparator_type = Some("long".to_string());
            cf.subcomparator_type = Some("utf8".to_string());
            cf.column_type = "super".to_string();
        })
        .unwrap();

        let cf = conn.column_family("test_cf").unwrap();
        assert_eq!(cf.comment.as_deref(), Some("foo"));
        assert_eq!(cf.comparator_type.as_deref(), Some("LongType"));
        assert_eq!(cf.subcomparator_type.as_deref(), Some("UTF8Type"));
        assert_eq!(cf.column_type, "Super");
    }

    #[test]
    fn test_create_with_bad_column_type_submits_nothing() {
        let (task, conn, _) = make_task();
        let result = task.create_with("test_cf", |cf| cf.column_type = "foo".to_string());

        assert!(matches!(
            result,
            Err(ColshiftError::Schema(SchemaError::UnrecognizedColumnType { .. }))
        ));
        assert!(conn.mutations().is_empty());
    }

    #[test]
    fn test_create_from_overrides() {
        let (task, conn, _) = make_task();
        let overrides = ColumnFamilyOverrides {
            comparator_type: Some("utf8".to_string()),
            comment: Some("foo".to_string()),
            ..Default::default()
        };
        task.create_from("some_cf", &overrides).unwrap();

        let cf = conn.column_family("some_cf").unwrap();
        assert_eq!(cf.comparator_type.as_deref(), Some("UTF8Type"));
        assert_eq!(cf.comment.as_deref(), Some("foo"));
    }

    #[test]
    fn test_exists() {
        let (task, _, _) = make_task();
        assert!(!task.exists("test_cf").unwrap());
        task.create("test_cf").unwrap();
        assert!(task.exists("test_cf").unwrap());
        assert!(task.exists(String::from("test_cf")).unwrap());
    }

    #[test]
    fn test_update_changes_comment_and_keeps_comparator() {
        let (task, conn, _) = make_task();
        task.create_with("test_cf", |cf| {
            cf.comment = Some("foo".to_string());
            cf.comparator_type = Some("long".to_string());
        })
        .unwrap();

        task.update("test_cf", |cf| cf.comment = Some("some new comment".to_string()))
            .unwrap();

        let cf = conn.column_family("test_cf").unwrap();
        assert_eq!(cf.comment.as_deref(), Some("some new comment"));
        assert_eq!(cf.comparator_type.as_deref(), Some("LongType"));
    }

    #[test]
    fn test_update_missing_issues_no_mutation() {
        let (task, conn, sleeper) = make_task();
        let result = task.update("missing_cf", |cf| cf.comment = Some("x".to_string()));

        assert!(matches!(
            result,
            Err(ColshiftError::Schema(SchemaError::ColumnFamilyNotFound { ref name })) if name == "missing_cf"
        ));
        assert!(conn.mutations().is_empty());
        assert_eq!(conn.agreement_queries(), 0);
        assert_eq!(sleeper.sleep_count(), 0);
    }

    #[test]
    fn test_update_with_fields() {
        let (task, conn, _) = make_task();
        task.create("tweets").unwrap();

        let fields = serde_json::json!({ "comment": "bag", "comparator_type": "utf8", "caching": "all" });
        task.update_with_fields("tweets", fields.as_object().unwrap())
            .unwrap();

        let cf = conn.column_family("tweets").unwrap();
        assert_eq!(cf.comment.as_deref(), Some("bag"));
        assert_eq!(cf.comparator_type.as_deref(), Some("UTF8Type"));
        assert_eq!(cf.extra.get("caching"), Some(&serde_json::json!("all")));
    }

    #[test]
    fn test_update_with_fields_fetches_schema_once() {
        let (task, conn, _) = make_task();
        task.create("tweets").unwrap();
        conn.clear_calls();

        let fields = serde_json::json!({ "comment": "bag" });
        task.update_with_fields("tweets", fields.as_object().unwrap())
            .unwrap();

        let fetches = conn
            .calls()
            .iter()
            .filter(|c| matches!(c, ConnectionCall::CurrentSchema))
            .count();
        assert_eq!(fetches, 1);
    }

    #[test]
    fn test_update_with_bad_fields_submits_nothing() {
        let (task, conn, _) = make_task();
        task.create("tweets").unwrap();
        conn.clear_calls();

        let fields = serde_json::json!({ "gc_grace_seconds": "soon" });
        let result = task.update_with_fields("tweets", fields.as_object().unwrap());

        assert!(matches!(
            result,
            Err(ColshiftError::Schema(SchemaError::InvalidField { ref field, .. })) if field == "gc_grace_seconds"
        ));
        assert!(conn.mutations().is_empty());
    }

    #[test]
    fn test_update_cannot_retarget_another_column_family() {
        let (task, conn, _) = make_task();
        task.create_with("a", |cf| cf.comment = Some("from_a".to_string()))
            .unwrap();
        task.create_with("b", |cf| cf.comment = Some("from_b".to_string()))
            .unwrap();
        conn.clear_calls();

        let result = task.update("a", |cf| {
            *cf = cf.clone().renamed("b");
        });

        assert!(matches!(
            result,
            Err(ColshiftError::Schema(SchemaError::InvalidField { ref field, .. })) if field == "name"
        ));
        assert!(conn.mutations().is_empty());
        assert_eq!(conn.column_family("b").unwrap().comment.as_deref(), Some("from_b"));
        assert_eq!(conn.column_family("a").unwrap().comment.as_deref(), Some("from_a"));
    }

    #[test]
    fn test_create_rejects_foreign_identity() {
        let (task, conn, _) = make_task();

        let renamed = task.create_with("a", |cf| *cf = ColumnFamilyDefinition::new("b", "active_column"));
        let moved = task.create_with("a", |cf| *cf = ColumnFamilyDefinition::new("a", "other_ks"));

        assert!(matches!(
            renamed,
            Err(ColshiftError::Schema(SchemaError::InvalidField { ref field, .. })) if field == "name"
        ));
        assert!(matches!(
            moved,
            Err(ColshiftError::Schema(SchemaError::InvalidField { ref field, .. })) if field == "keyspace"
        ));
        assert!(conn.mutations().is_empty());
    }

    #[test]
    fn test_drop_and_rename_send_plain_names() {
        let (task, conn, _) = make_task();
        task.create("old_foo").unwrap();
        conn.clear_calls();

        task.rename("old_foo", String::from("new_foo")).unwrap();
        task.drop(Name::from("new_foo")).unwrap();

        assert_eq!(
            conn.mutations(),
            vec![
                ConnectionCall::RenameColumnFamily {
                    old_name: "old_foo".to_string(),
                    new_name: "new_foo".to_string(),
                },
                ConnectionCall::DropColumnFamily("new_foo".to_string()),
            ]
        );
        assert_eq!(conn.agreement_queries(), 2);
    }

    #[test]
    fn test_clear_does_not_wait_for_agreement() {
        let (task, conn, sleeper) = make_task();
        task.create("tweets").unwrap();
        conn.clear_calls();
        conn.set_agreement_default(false).unwrap();

        task.clear("tweets").unwrap();

        assert_eq!(conn.calls(), vec![ConnectionCall::Truncate("tweets".to_string())]);
        assert_eq!(conn.truncation_count("tweets"), 1);
        assert_eq!(sleeper.sleep_count(), 0);
    }

    #[test]
    fn test_create_index_translates_type() {
        let (task, conn, _) = make_task();
        task.create("some_cf").unwrap();
        conn.clear_calls();

        task.create_index("some_cf", "some_column", "long").unwrap();
        task.create_index("some_cf", "other_column", "string").unwrap();

        let mutations = conn.mutations();
        assert_eq!(
            mutations[0],
            ConnectionCall::CreateIndex {
                keyspace: "active_column".to_string(),
                cf_name: "some_cf".to_string(),
                column_name: "some_column".to_string(),
                validation_class: "LongType".to_string(),
            }
        );
        assert!(matches!(
            &mutations[1],
            ConnectionCall::CreateIndex { validation_class, .. } if validation_class == "BytesType"
        ));
    }

    #[test]
    fn test_create_index_keeps_unknown_type() {
        let (task, conn, _) = make_task();
        task.create("some_cf").unwrap();
        conn.clear_calls();

        task.create_index("some_cf", "some_column", "CrazyType").unwrap();

        assert!(matches!(
            &conn.mutations()[0],
            ConnectionCall::CreateIndex { validation_class, .. } if validation_class == "CrazyType"
        ));
        let indexes = task.secondary_indexes("some_cf").unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].validation_class, "CrazyType");
    }

    #[test]
    fn test_drop_index() {
        let (task, conn, _) = make_task();
        task.create("some_cf").unwrap();
        task.create_index("some_cf", "some_column", "long").unwrap();
        conn.clear_calls();

        task.drop_index("some_cf", "some_column").unwrap();

        assert_eq!(
            conn.mutations(),
            vec![ConnectionCall::DropIndex {
                keyspace: "active_column".to_string(),
                cf_name: "some_cf".to_string(),
                column_name: "some_column".to_string(),
            }]
        );
        assert!(task.secondary_indexes("some_cf").unwrap().is_empty());
    }

    #[test]
    fn test_create_times_out_without_agreement() {
        let (task, conn, sleeper) = make_task();
        conn.set_agreement_default(false).unwrap();

        let result = task.create("test_cf");

        assert!(matches!(
            result,
            Err(ColshiftError::Agreement(AgreementError::SchemaAgreementTimeout { attempts: 30, .. }))
        ));
        assert_eq!(conn.agreement_queries(), 30);
        assert_eq!(sleeper.sleep_count(), 30);
        // the mutation itself was accepted; only convergence is unknown
        assert!(conn.column_family("test_cf").is_some());
    }

    #[test]
    fn test_connection_error_skips_agreement_wait() {
        let (task, conn, _) = make_task();
        let result = task.drop("never_created");
        assert!(matches!(result, Err(ColshiftError::Connection(_))));
        assert_eq!(conn.agreement_queries(), 0);
    }
}
