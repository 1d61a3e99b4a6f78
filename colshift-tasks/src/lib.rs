//! colshift Tasks - Schema Changes with Agreement Waits
//!
//! Runs column family and secondary index changes against a [`Connection`]
//! and blocks until the cluster has converged on the new schema.
//!
//! ```no_run
//! use colshift_connection::MockConnection;
//! use colshift_tasks::ColumnFamilyTask;
//! use std::sync::Arc;
//!
//! # fn main() -> colshift_core::ColshiftResult<()> {
//! let connection = Arc::new(MockConnection::new("app"));
//! let tasks = ColumnFamilyTask::new("app", connection)?;
//! tasks.create_with("tweets", |cf| {
//!     cf.comparator_type = Some("long".to_string());
//!     cf.comment = Some("user timeline".to_string());
//! })?;
//! tasks.create_index("tweets", "user_id", "utf8")?;
//! # Ok(())
//! # }
//! ```

pub mod agreement;
pub mod column_family;
pub mod telemetry;

pub use agreement::{
    AgreementOutcome, SchemaAgreementPoller, SchemaAgreementState, SimulatedSleeper, Sleeper,
    ThreadSleeper, AGREEMENT_POLL_INTERVAL, MAX_AGREEMENT_ATTEMPTS,
};
pub use column_family::ColumnFamilyTask;
pub use colshift_connection::Connection;
pub use telemetry::init_tracing;
