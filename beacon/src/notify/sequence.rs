//! Run identity and idempotency sequence numbers
//!
//! Every event of a run carries two numbers: the run sequence number,
//! constant for the lifetime of the run so the tracking service maps all
//! states onto one timeline entry, and the update sequence number, which
//! must strictly increase between successive states or the service drops
//! the submission as stale.

use chrono::Utc;

/// Idempotency anchor for one deployment run
#[derive(Debug, Clone)]
pub struct RunSequence {
    run_id: String,
    base: i64,
}

impl RunSequence {
    /// Create a sequence anchored to the current clock
    pub fn new() -> Self {
        Self::from_millis(Utc::now().timestamp_millis())
    }

    /// Create a sequence anchored to a specific millisecond reading
    pub fn from_millis(millis: i64) -> Self {
        Self {
            run_id: format!("deploy-{}", millis),
            base: millis,
        }
    }

    /// Unique identifier of this run; doubles as the pipeline id
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Constant across every event of the run
    pub fn run_sequence_number(&self) -> i64 {
        self.base
    }

    /// Update sequence number for the initial IN_PROGRESS event
    pub fn initial_update_sequence(&self) -> i64 {
        self.base
    }

    /// Update sequence number for a terminal event
    ///
    /// Guaranteed to exceed the IN_PROGRESS value even when the clock has
    /// not advanced between phases.
    pub fn terminal_update_sequence(&self) -> i64 {
        self.terminal_update_sequence_at(Utc::now().timestamp_millis())
    }

    pub fn terminal_update_sequence_at(&self, now_millis: i64) -> i64 {
        now_millis.max(self.base + 1)
    }
}

impl Default for RunSequence {
    fn default() -> Self {
        Self::new()
    }
}
