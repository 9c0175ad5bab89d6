//! Deployment run phase machine

/// Phase of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Initial state, nothing verified yet
    Init,

    /// Installations verified (possibly zero)
    Verified,

    /// Every installation acknowledged IN_PROGRESS
    NotifiedInProgress,

    /// External deploy step completed
    Deployed,

    /// Post-deploy migration completed (or soft-skipped)
    Migrated,

    /// Terminal notification phase finished
    NotifiedFinal,

    /// Run completed
    Done,

    /// Run aborted
    Aborted,
}

/// Phase transition event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Verify,
    NotifyInProgress,
    Deploy,
    Migrate,
    NotifyFinal,
    Finish,
    Abort,
}

/// Phase machine for one deployment run
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: RunPhase,
}

impl PhaseMachine {
    /// Create a new machine in the initial phase
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Init,
        }
    }

    /// Get the current phase
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Process an event and transition phase
    pub fn process(&mut self, event: PhaseEvent) -> Result<(), String> {
        let next = match (self.phase, event) {
            (RunPhase::Init, PhaseEvent::Verify) => RunPhase::Verified,
            (RunPhase::Verified, PhaseEvent::NotifyInProgress) => RunPhase::NotifiedInProgress,
            (RunPhase::NotifiedInProgress, PhaseEvent::Deploy) => RunPhase::Deployed,
            (RunPhase::Deployed, PhaseEvent::Migrate) => RunPhase::Migrated,
            (RunPhase::Migrated, PhaseEvent::NotifyFinal) => RunPhase::NotifiedFinal,
            (RunPhase::NotifiedFinal, PhaseEvent::Finish) => RunPhase::Done,

            // Aborting is allowed from any non-final phase
            (phase, PhaseEvent::Abort) if phase != RunPhase::Done && phase != RunPhase::Aborted => {
                RunPhase::Aborted
            }

            (phase, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", phase, event));
            }
        };

        self.phase = next;
        Ok(())
    }

    /// Whether a failure in the current phase requires FAILED compensation
    ///
    /// Only installations that acknowledged IN_PROGRESS and have not yet
    /// been told a final state can be left stuck; that window spans the
    /// deploy and migration steps.
    pub fn compensation_required(&self) -> bool {
        matches!(self.phase, RunPhase::NotifiedInProgress | RunPhase::Deployed)
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}
