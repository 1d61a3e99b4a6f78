//! Schema agreement polling.
//!
//! Schema changes propagate to the cluster asynchronously. After every
//! mutation the task blocks here until all nodes report the same schema
//! version, or the attempt budget runs out.
//!
//! # State Transition Diagram
//!
//! ```text
//! Polling(n) ── agreed ──→ Agreed
//!     │
//!     └── not agreed ── sleep(1s) ──→ Polling(n + 1)    (n + 1 < 30)
//!                                 └─→ TimedOut           (n + 1 == 30)
//! ```
//!
//! A timeout means the mutation may be live on some nodes and not others.

use colshift_connection::Connection;
use colshift_core::{AgreementError, ColshiftResult};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Agreement queries made before giving up.
pub const MAX_AGREEMENT_ATTEMPTS: u32 = 30;

/// Wait between two agreement queries.
pub const AGREEMENT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// SLEEPER
// ============================================================================

/// Blocks the calling thread between polls.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Simulated clock: records requested sleeps and returns immediately.
#[derive(Debug, Default)]
pub struct SimulatedSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl SimulatedSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps().len()
    }

    /// Total simulated time spent sleeping.
    pub fn elapsed(&self) -> Duration {
        self.sleeps().iter().sum()
    }

    pub fn reset(&self) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.clear();
        }
    }
}

impl Sleeper for SimulatedSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

// ============================================================================
// AGREEMENT STATE
// ============================================================================

/// Terminal result of one agreement wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgreementOutcome {
    Agreed,
    TimedOut,
}

/// Progress of a single agreement wait. Lives only for one mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaAgreementState {
    /// Agreement queries that returned "not agreed".
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub outcome: Option<AgreementOutcome>,
}

impl SchemaAgreementState {
    pub fn new() -> Self {
        Self {
            attempts_made: 0,
            max_attempts: MAX_AGREEMENT_ATTEMPTS,
            poll_interval: AGREEMENT_POLL_INTERVAL,
            outcome: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// Time spent sleeping so far.
    pub fn waited(&self) -> Duration {
        self.poll_interval * self.attempts_made
    }
}

impl Default for SchemaAgreementState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// POLLER
// ============================================================================

/// Bounded wait for cluster schema agreement.
pub struct SchemaAgreementPoller<'a> {
    connection: &'a dyn Connection,
    sleeper: &'a dyn Sleeper,
}

impl<'a> SchemaAgreementPoller<'a> {
    pub fn new(connection: &'a dyn Connection, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            connection,
            sleeper,
        }
    }

    /// Poll until agreement or until the attempt budget is spent.
    ///
    /// Returns the resolved state on agreement. Each "not agreed" answer costs
    /// one poll interval of sleep; the thirtieth in a row fails with
    /// `SchemaAgreementTimeout`. Connection errors abort the wait immediately.
    pub fn wait(&self) -> ColshiftResult<SchemaAgreementState> {
        let mut state = SchemaAgreementState::new();

        while state.attempts_made < state.max_attempts {
            if self.connection.schema_agreement()? {
                state.outcome = Some(AgreementOutcome::Agreed);
                info!(
                    attempts = state.attempts_made + 1,
                    waited = ?state.waited(),
                    "Schema agreement reached"
                );
                return Ok(state);
            }

            debug!(
                attempt = state.attempts_made + 1,
                max_attempts = state.max_attempts,
                "Schema not yet in agreement"
            );
            self.sleeper.sleep(state.poll_interval);
            state.attempts_made += 1;
        }

        state.outcome = Some(AgreementOutcome::TimedOut);
        warn!(
            attempts = state.attempts_made,
            waited = ?state.waited(),
            "Failed to obtain schema agreement"
        );
        Err(AgreementError::SchemaAgreementTimeout {
            attempts: state.attempts_made,
            waited: state.waited(),
        }
        .into())
    }
}

// =============================================================================
// TESTS
// =============================================================================
