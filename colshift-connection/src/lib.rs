//! colshift Connection - Cluster Trait and Mock Implementation
//!
//! Defines the schema RPC surface the task layer drives. Real drivers
//! implement [`Connection`]; [`MockConnection`] is an in-memory cluster used
//! by tests and dry runs.

use colshift_core::{
    ColshiftResult, ColumnDefinition, ColumnFamilyDefinition, ConnectionError,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

// ============================================================================
// CONNECTION TRAIT
// ============================================================================

/// Schema RPCs against one cluster.
///
/// Calls block until the coordinator node has answered. A successful mutation
/// means the coordinator accepted it, not that every node has it; callers
/// check [`Connection::schema_agreement`] for that.
pub trait Connection: Send + Sync {
    // === Column Family Operations ===

    /// Add a new column family.
    fn add_column_family(&self, cf: &ColumnFamilyDefinition) -> ColshiftResult<()>;

    /// Replace the definition of an existing column family.
    fn update_column_family(&self, cf: &ColumnFamilyDefinition) -> ColshiftResult<()>;

    /// Drop a column family and its data.
    fn drop_column_family(&self, name: &str) -> ColshiftResult<()>;

    /// Rename a column family.
    fn rename_column_family(&self, old_name: &str, new_name: &str) -> ColshiftResult<()>;

    /// Remove all rows from a column family, keeping its schema.
    fn truncate(&self, name: &str) -> ColshiftResult<()>;

    // === Index Operations ===

    /// Create a secondary index on a column.
    fn create_index(
        &self,
        keyspace: &str,
        cf_name: &str,
        column_name: &str,
        validation_class: &str,
    ) -> ColshiftResult<()>;

    /// Drop the secondary index on a column.
    fn drop_index(&self, keyspace: &str, cf_name: &str, column_name: &str) -> ColshiftResult<()>;

    // === Cluster State ===

    /// Whether every live node reports the same schema version.
    fn schema_agreement(&self) -> ColshiftResult<bool>;

    /// Column family definitions of the connected keyspace.
    fn current_schema(&self) -> ColshiftResult<Vec<ColumnFamilyDefinition>>;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn add_column_family(&self, cf: &ColumnFamilyDefinition) -> ColshiftResult<()> {
        (**self).add_column_family(cf)
    }

    fn update_column_family(&self, cf: &ColumnFamilyDefinition) -> ColshiftResult<()> {
        (**self).update_column_family(cf)
    }

    fn drop_column_family(&self, name: &str) -> ColshiftResult<()> {
        (**self).drop_column_family(name)
    }

    fn rename_column_family(&self, old_name: &str, new_name: &str) -> ColshiftResult<()> {
        (**self).rename_column_family(old_name, new_name)
    }

    fn truncate(&self, name: &str) -> ColshiftResult<()> {
        (**self).truncate(name)
    }

    fn create_index(
        &self,
        keyspace: &str,
        cf_name: &str,
        column_name: &str,
        validation_class: &str,
    ) -> ColshiftResult<()> {
        (**self).create_index(keyspace, cf_name, column_name, validation_class)
    }

    fn drop_index(&self, keyspace: &str, cf_name: &str, column_name: &str) -> ColshiftResult<()> {
        (**self).drop_index(keyspace, cf_name, column_name)
    }

    fn schema_agreement(&self) -> ColshiftResult<bool> {
        (**self).schema_agreement()
    }

    fn current_schema(&self) -> ColshiftResult<Vec<ColumnFamilyDefinition>> {
        (**self).current_schema()
    }
}

// ============================================================================
// RECORDED CALLS
// ============================================================================

/// One RPC as seen by [`MockConnection`], with arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionCall {
    AddColumnFamily(ColumnFamilyDefinition),
    UpdateColumnFamily(ColumnFamilyDefinition),
    DropColumnFamily(String),
    RenameColumnFamily { old_name: String, new_name: String },
    Truncate(String),
    CreateIndex {
        keyspace: String,
        cf_name: String,
        column_name: String,
        validation_class: String,
    },
    DropIndex {
        keyspace: String,
        cf_name: String,
        column_name: String,
    },
    SchemaAgreement,
    CurrentSchema,
}

impl ConnectionCall {
    /// True for calls that change cluster state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            ConnectionCall::SchemaAgreement | ConnectionCall::CurrentSchema
        )
    }
}

// ============================================================================
// MOCK CONNECTION
// ============================================================================

/// In-memory single-keyspace cluster.
///
/// Mutations are applied immediately. `schema_agreement()` answers from a
/// scripted queue and falls back to a fixed default (agreed) once the queue
/// is drained.
#[derive(Debug)]
pub struct MockConnection {
    keyspace: String,
    column_families: RwLock<BTreeMap<String, ColumnFamilyDefinition>>,
    truncations: RwLock<HashMap<String, u32>>,
    agreement_script: Mutex<VecDeque<bool>>,
    agreement_default: RwLock<bool>,
    calls: Mutex<Vec<ConnectionCall>>,
}

impl MockConnection {
    /// Create an empty cluster for `keyspace` that always reports agreement.
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            column_families: RwLock::new(BTreeMap::new()),
            truncations: RwLock::new(HashMap::new()),
            agreement_script: Mutex::new(VecDeque::new()),
            agreement_default: RwLock::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Seed a column family without recording a call.
    pub fn with_column_family(self, cf: ColumnFamilyDefinition) -> Self {
        if let Ok(mut cfs) = self.column_families.write() {
            cfs.insert(cf.name().to_string(), cf);
        }
        self
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Queue agreement answers, consumed one per query before the default applies.
    pub fn script_agreement(&self, answers: impl IntoIterator<Item = bool>) -> ColshiftResult<()> {
        self.agreement_script
            .lock()
            .map_err(|_| ConnectionError::LockPoisoned)?
            .extend(answers);
        Ok(())
    }

    /// Answer used once the scripted queue is empty.
    pub fn set_agreement_default(&self, agreed: bool) -> ColshiftResult<()> {
        *self
            .agreement_default
            .write()
            .map_err(|_| ConnectionError::LockPoisoned)? = agreed;
        Ok(())
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ConnectionCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Calls that changed cluster state.
    pub fn mutations(&self) -> Vec<ConnectionCall> {
        self.calls().into_iter().filter(ConnectionCall::is_mutation).collect()
    }

    /// Number of `schema_agreement()` queries received.
    pub fn agreement_queries(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ConnectionCall::SchemaAgreement))
            .count()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Stored definition by name.
    pub fn column_family(&self, name: &str) -> Option<ColumnFamilyDefinition> {
        self.column_families
            .read()
            .ok()
            .and_then(|cfs| cfs.get(name).cloned())
    }

    pub fn column_family_count(&self) -> usize {
        self.column_families.read().map(|cfs| cfs.len()).unwrap_or(0)
    }

    /// How many times a column family has been truncated.
    pub fn truncation_count(&self, name: &str) -> u32 {
        self.truncations
            .read()
            .ok()
            .and_then(|t| t.get(name).copied())
            .unwrap_or(0)
    }

    fn record(&self, call: ConnectionCall) -> ColshiftResult<()> {
        tracing::trace!(?call, "mock connection call");
        self.calls
            .lock()
            .map_err(|_| ConnectionError::LockPoisoned)?
            .push(call);
        Ok(())
    }

    fn check_keyspace(&self, keyspace: &str, operation: &str) -> ColshiftResult<()> {
        if keyspace != self.keyspace {
            return Err(ConnectionError::RequestFailed {
                operation: operation.to_string(),
                reason: format!("keyspace {} is not {}", keyspace, self.keyspace),
            }
            .into());
        }
        Ok(())
    }
}

fn unknown(name: &str) -> ConnectionError {
    ConnectionError::UnknownColumnFamily {
        name: name.to_string(),
    }
}

impl Connection for MockConnection {
    fn add_column_family(&self, cf: &ColumnFamilyDefinition) -> ColshiftResult<()> {
        self.record(ConnectionCall::AddColumnFamily(cf.clone()))?;
        self.check_keyspace(cf.keyspace(), "add_column_family")?;
        let mut cfs = self
            .column_families
            .write()
            .map_err(|_| ConnectionError::LockPoisoned)?;
        if cfs.contains_key(cf.name()) {
            return Err(ConnectionError::AlreadyExists {
                name: cf.name().to_string(),
            }
            .into());
        }
        cfs.insert(cf.name().to_string(), cf.clone());
        Ok(())
    }

    fn update_column_family(&self, cf: &ColumnFamilyDefinition) -> ColshiftResult<()> {
        self.record(ConnectionCall::UpdateColumnFamily(cf.clone()))?;
        self.check_keyspace(cf.keyspace(), "update_column_family")?;
        let mut cfs = self
            .column_families
            .write()
            .map_err(|_| ConnectionError::LockPoisoned)?;
        let existing = cfs.get_mut(cf.name()).ok_or_else(|| unknown(cf.name()))?;
        *existing = cf.clone();
        Ok(())
    }

    fn drop_column_family(&self, name: &str) -> ColshiftResult<()> {
        self.record(ConnectionCall::DropColumnFamily(name.to_string()))?;
        let mut cfs = self
            .column_families
            .write()
            .map_err(|_| ConnectionError::LockPoisoned)?;
        cfs.remove(name).ok_or_else(|| unknown(name))?;
        if let Ok(mut truncations) = self.truncations.write() {
            truncations.remove(name);
        }
        Ok(())
    }

    fn rename_column_family(&self, old_name: &str, new_name: &str) -> ColshiftResult<()> {
        self.record(ConnectionCall::RenameColumnFamily {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        })?;
        let mut cfs = self
            .column_families
            .write()
            .map_err(|_| ConnectionError::LockPoisoned)?;
        if cfs.contains_key(new_name) {
            return Err(ConnectionError::AlreadyExists {
                name: new_name.to_string(),
            }
            .into());
        }
        let cf = cfs.remove(old_name).ok_or_else(|| unknown(old_name))?;
        cfs.insert(new_name.to_string(), cf.renamed(new_name));
        Ok(())
    }

    fn truncate(&self, name: &str) -> ColshiftResult<()> {
        self.record(ConnectionCall::Truncate(name.to_string()))?;
        let cfs = self
            .column_families
            .read()
            .map_err(|_| ConnectionError::LockPoisoned)?;
        if !cfs.contains_key(name) {
            return Err(unknown(name).into());
        }
        let mut truncations = self
            .truncations
            .write()
            .map_err(|_| ConnectionError::LockPoisoned)?;
        *truncations.entry(name.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn create_index(
        &self,
        keyspace: &str,
        cf_name: &str,
        column_name: &str,
        validation_class: &str,
    ) -> ColshiftResult<()> {
        self.record(ConnectionCall::CreateIndex {
            keyspace: keyspace.to_string(),
            cf_name: cf_name.to_string(),
            column_name: column_name.to_string(),
            validation_class: validation_class.to_string(),
        })?;
        self.check_keyspace(keyspace, "create_index")?;
        let mut cfs = self
            .column_families
            .write()
            .map_err(|_| ConnectionError::LockPoisoned)?;
        let cf = cfs.get_mut(cf_name).ok_or_else(|| unknown(cf_name))?;

        let index_name = format!("{}_{}_idx", cf_name, column_name);
        match cf.column_metadata.iter_mut().find(|c| c.name == column_name) {
            Some(column) => {
                column.validation_class = validation_class.to_string();
                column.index_name = Some(index_name);
            }
            None => cf.column_metadata.push(ColumnDefinition {
                name: column_name.to_string(),
                validation_class: validation_class.to_string(),
                index_name: Some(index_name),
            }),
        }
        Ok(())
    }

    fn drop_index(&self, keyspace: &str, cf_name: &str, column_name: &str) -> ColshiftResult<()> {
        self.record(ConnectionCall::DropIndex {
            keyspace: keyspace.to_string(),
            cf_name: cf_name.to_string(),
            column_name: column_name.to_string(),
        })?;
        self.check_keyspace(keyspace, "drop_index")?;
        let mut cfs = self
            .column_families
            .write()
            .map_err(|_| ConnectionError::LockPoisoned)?;
        let cf = cfs.get_mut(cf_name).ok_or_else(|| unknown(cf_name))?;
        let column = cf
            .column_metadata
            .iter_mut()
            .find(|c| c.name == column_name && c.index_name.is_some())
            .ok_or_else(|| ConnectionError::UnknownIndex {
                column_family: cf_name.to_string(),
                column_name: column_name.to_string(),
            })?;
        column.index_name = None;
        Ok(())
    }

    fn schema_agreement(&self) -> ColshiftResult<bool> {
        self.record(ConnectionCall::SchemaAgreement)?;
        let scripted = self
            .agreement_script
            .lock()
            .map_err(|_| ConnectionError::LockPoisoned)?
            .pop_front();
        match scripted {
            Some(agreed) => Ok(agreed),
            None => Ok(*self
                .agreement_default
                .read()
                .map_err(|_| ConnectionError::LockPoisoned)?),
        }
    }

    fn current_schema(&self) -> ColshiftResult<Vec<ColumnFamilyDefinition>> {
        self.record(ConnectionCall::CurrentSchema)?;
        let cfs = self
            .column_families
            .read()
            .map_err(|_| ConnectionError::LockPoisoned)?;
        Ok(cfs.values().cloned().collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
