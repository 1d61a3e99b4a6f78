//! colshift Test Utilities
//!
//! Shared test infrastructure for the colshift workspace:
//! - Proptest generators for names, type names and definitions
//! - Fixtures wiring a task to an in-memory cluster and simulated clock
//! - A connection whose RPCs fail on demand
//! - Assertions for colshift error variants

// Re-export mock connection and simulated clock from their source crates
pub use colshift_connection::{Connection, ConnectionCall, MockConnection};
pub use colshift_tasks::{ColumnFamilyTask, SimulatedSleeper};

// Re-export core types for convenience
pub use colshift_core::{
    AgreementError, ColshiftError, ColshiftResult, ColumnFamilyDefinition, ColumnFamilyOverrides,
    ConnectionError, MigrationConfig, Name, SchemaError,
};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for colshift types.

    use super::*;
    use colshift_core::translate::{canonical_comparators, comparator_keys, lookup_comparator};
    use proptest::prelude::*;

    /// Keyspace or column family name the store would accept.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,24}"
    }

    /// Keyspace name other than the reserved system keyspace.
    pub fn arb_user_keyspace() -> impl Strategy<Value = String> {
        arb_name().prop_filter("system keyspace is reserved", |k| k != "system")
    }

    /// Symbolic comparator key from the translation table.
    pub fn arb_comparator_key() -> impl Strategy<Value = &'static str> {
        proptest::sample::select(comparator_keys().to_vec())
    }

    /// Canonical comparator reachable through the table.
    pub fn arb_canonical_comparator() -> impl Strategy<Value = &'static str> {
        proptest::sample::select(canonical_comparators().to_vec())
    }

    /// Store-native validation class the table does not know about.
    pub fn arb_unknown_type() -> impl Strategy<Value = String> {
        "[A-Z][A-Za-z0-9]{0,20}Type"
            .prop_filter("must not be a table key", |t| lookup_comparator(t).is_none())
    }

    /// Any comparator input: symbolic, canonical, or unknown.
    pub fn arb_comparator_input() -> impl Strategy<Value = String> {
        prop_oneof![
            arb_comparator_key().prop_map(str::to_string),
            arb_canonical_comparator().prop_map(str::to_string),
            arb_unknown_type(),
        ]
    }

    /// Column type spelled in any case.
    pub fn arb_column_type_input() -> impl Strategy<Value = String> {
        (prop_oneof![Just("standard"), Just("super")], any::<bool>()).prop_map(|(t, upper)| {
            if upper {
                t.to_uppercase()
            } else {
                t.to_string()
            }
        })
    }

    /// Column family definition with un-normalized typed fields.
    pub fn arb_column_family(keyspace: String) -> impl Strategy<Value = ColumnFamilyDefinition> {
        (
            arb_name(),
            proptest::option::of(arb_comparator_input()),
            proptest::option::of(arb_comparator_input()),
            arb_column_type_input(),
            proptest::option::of("[ -~]{0,40}"),
        )
            .prop_map(move |(name, comparator, subcomparator, column_type, comment)| {
                let mut cf =
                    ColumnFamilyDefinition::new(name, keyspace.as_str()).column_type(column_type);
                cf.comparator_type = comparator;
                cf.subcomparator_type = subcomparator;
                cf.comment = comment;
                cf
            })
    }

    /// Field overrides touching a random subset of typed fields.
    pub fn arb_overrides() -> impl Strategy<Value = ColumnFamilyOverrides> {
        (
            proptest::option::of(arb_comparator_input()),
            proptest::option::of(arb_comparator_input()),
            proptest::option::of(arb_column_type_input()),
            proptest::option::of("[ -~]{0,40}"),
        )
            .prop_map(|(comparator_type, subcomparator_type, column_type, comment)| {
                ColumnFamilyOverrides {
                    comparator_type,
                    subcomparator_type,
                    column_type,
                    comment,
                    ..Default::default()
                }
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// Keyspace used by fixtures.
    pub const TEST_KEYSPACE: &str = "active_column";

    /// A task wired to an in-memory cluster and a simulated clock.
    pub struct TaskHarness {
        pub task: ColumnFamilyTask,
        pub connection: Arc<MockConnection>,
        pub sleeper: Arc<SimulatedSleeper>,
    }

    impl TaskHarness {
        pub fn new() -> Self {
            Self::for_keyspace(TEST_KEYSPACE)
        }

        pub fn for_keyspace(keyspace: &str) -> Self {
            let connection = Arc::new(MockConnection::new(keyspace));
            Self::with_connection(keyspace, connection)
        }

        pub fn with_connection(keyspace: &str, connection: Arc<MockConnection>) -> Self {
            let sleeper = Arc::new(SimulatedSleeper::new());
            let task = ColumnFamilyTask::with_sleeper(keyspace, connection.clone(), sleeper.clone())
                .expect("fixture keyspace must not be reserved");
            Self {
                task,
                connection,
                sleeper,
            }
        }

        /// Make every agreement query answer "not agreed".
        pub fn never_agree(&self) {
            self.connection
                .set_agreement_default(false)
                .expect("mock connection lock poisoned");
        }

        /// Forget calls and sleeps recorded so far.
        pub fn reset_observations(&self) {
            self.connection.clear_calls();
            self.sleeper.reset();
        }
    }

    impl Default for TaskHarness {
        fn default() -> Self {
            Self::new()
        }
    }

    /// A harness whose cluster already holds `some_cf` (comparator utf8, comment "foo").
    pub fn harness_with_some_cf() -> TaskHarness {
        let harness = TaskHarness::new();
        harness
            .task
            .create_with("some_cf", |cf| {
                cf.comment = Some("foo".to_string());
                cf.comparator_type = Some("utf8".to_string());
            })
            .expect("fixture create failed");
        harness.reset_observations();
        harness
    }
}

// ============================================================================
// FAILING CONNECTION
// ============================================================================

/// Wraps a [`MockConnection`] and fails the n-th `schema_agreement()` query.
#[derive(Debug)]
pub struct FlakyConnection {
    inner: MockConnection,
    fail_on_query: usize,
    queries: AtomicUsize,
}

impl FlakyConnection {
    /// `fail_on_query` is 1-based.
    pub fn new(inner: MockConnection, fail_on_query: usize) -> Self {
        Self {
            inner,
            fail_on_query,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MockConnection {
        &self.inner
    }
}

impl Connection for FlakyConnection {
    fn add_column_family(&self, cf: &ColumnFamilyDefinition) -> ColshiftResult<()> {
        self.inner.add_column_family(cf)
    }

    fn update_column_family(&self, cf: &ColumnFamilyDefinition) -> ColshiftResult<()> {
        self.inner.update_column_family(cf)
    }

    fn drop_column_family(&self, name: &str) -> ColshiftResult<()> {
        self.inner.drop_column_family(name)
    }

    fn rename_column_family(&self, old_name: &str, new_name: &str) -> ColshiftResult<()> {
        self.inner.rename_column_family(old_name, new_name)
    }

    fn truncate(&self, name: &str) -> ColshiftResult<()> {
        self.inner.truncate(name)
    }

    fn create_index(
        &self,
        keyspace: &str,
        cf_name: &str,
        column_name: &str,
        validation_class: &str,
    ) -> ColshiftResult<()> {
        self.inner
            .create_index(keyspace, cf_name, column_name, validation_class)
    }

    fn drop_index(&self, keyspace: &str, cf_name: &str, column_name: &str) -> ColshiftResult<()> {
        self.inner.drop_index(keyspace, cf_name, column_name)
    }

    fn schema_agreement(&self) -> ColshiftResult<bool> {
        let n = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on_query {
            return Err(ConnectionError::RequestFailed {
                operation: "schema_agreement".to_string(),
                reason: "node unreachable".to_string(),
            }
            .into());
        }
        self.inner.schema_agreement()
    }

    fn current_schema(&self) -> ColshiftResult<Vec<ColumnFamilyDefinition>> {
        self.inner.current_schema()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for colshift error variants.

    use super::*;

    /// Assert that a ColshiftResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &ColshiftResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a ColshiftResult is a ColumnFamilyNotFound error for `name`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &ColshiftResult<T>, name: &str) {
        match result {
            Err(ColshiftError::Schema(SchemaError::ColumnFamilyNotFound { name: n })) => {
                assert_eq!(n, name, "ColumnFamilyNotFound for wrong name");
            }
            other => panic!("Expected ColumnFamilyNotFound, got: {:?}", other),
        }
    }

    /// Assert that a ColshiftResult is an InvalidKeyspace error.
    #[track_caller]
    pub fn assert_invalid_keyspace<T: std::fmt::Debug>(result: &ColshiftResult<T>) {
        match result {
            Err(ColshiftError::Schema(SchemaError::InvalidKeyspace { .. })) => {}
            other => panic!("Expected InvalidKeyspace, got: {:?}", other),
        }
    }

    /// Assert that a ColshiftResult is an UnrecognizedColumnType error.
    #[track_caller]
    pub fn assert_unrecognized_column_type<T: std::fmt::Debug>(result: &ColshiftResult<T>) {
        match result {
            Err(ColshiftError::Schema(SchemaError::UnrecognizedColumnType { .. })) => {}
            other => panic!("Expected UnrecognizedColumnType, got: {:?}", other),
        }
    }

    /// Assert that a ColshiftResult is a SchemaAgreementTimeout after `attempts` polls.
    #[track_caller]
    pub fn assert_agreement_timeout<T: std::fmt::Debug>(result: &ColshiftResult<T>, attempts: u32) {
        match result {
            Err(ColshiftError::Agreement(AgreementError::SchemaAgreementTimeout {
                attempts: a,
                ..
            })) => assert_eq!(*a, attempts),
            other => panic!("Expected SchemaAgreementTimeout, got: {:?}", other),
        }
    }
}
