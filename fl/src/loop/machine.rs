//! Pure phase state machine
//!
//! Planning -> Validating -> Executing -> (next feature) Planning, with a
//! bounded number of Validating -> Planning re-plans per feature. No I/O;
//! the engine feeds it events and acts on the returned transitions.

use tracing::debug;

use crate::domain::Phase;

/// What the agent reported in the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Planning produced a plan
    PlanProposed,
    /// Validating judged the plan
    Verdict { valid: bool },
    /// Executing finished the feature
    FeatureDone,
}

/// Result of feeding an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Now Validating
    Validate,
    /// Plan approved, now Executing
    Execute,
    /// Plan rejected, back to Planning; `attempt` re-plans used so far
    Replan { attempt: u32 },
    /// Plan rejected with no re-plans left; terminal for the feature
    Exhausted { attempts: u32 },
    /// Feature complete, Planning for the next one
    NextFeature,
    /// Event does not apply to the current phase; nothing changed
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseMachine {
    phase: Phase,
    validation_attempts: u32,
    max_validation_attempts: u32,
}

impl PhaseMachine {
    /// Start a feature at Planning
    pub fn new(max_validation_attempts: u32) -> Self {
        Self::restore(Phase::Planning, 0, max_validation_attempts)
    }

    /// Continue exactly where a persisted run stopped
    pub fn restore(phase: Phase, validation_attempts: u32, max_validation_attempts: u32) -> Self {
        debug!(%phase, %validation_attempts, %max_validation_attempts, "PhaseMachine::restore: called");
        Self {
            phase,
            validation_attempts,
            max_validation_attempts,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn validation_attempts(&self) -> u32 {
        self.validation_attempts
    }

    /// Back to Planning with a clean attempt counter (new feature selected)
    pub fn reset(&mut self) {
        self.phase = Phase::Planning;
        self.validation_attempts = 0;
    }

    pub fn advance(&mut self, event: PhaseEvent) -> Transition {
        debug!(phase = %self.phase, ?event, attempts = self.validation_attempts, "PhaseMachine::advance: called");
        let transition = match (self.phase, event) {
            (Phase::Planning, PhaseEvent::PlanProposed) => {
                self.phase = Phase::Validating;
                Transition::Validate
            }
            (Phase::Validating, PhaseEvent::Verdict { valid: true }) => {
                self.phase = Phase::Executing;
                Transition::Execute
            }
            (Phase::Validating, PhaseEvent::Verdict { valid: false }) => {
                if self.validation_attempts < self.max_validation_attempts {
                    self.validation_attempts += 1;
                    self.phase = Phase::Planning;
                    Transition::Replan {
                        attempt: self.validation_attempts,
                    }
                } else {
                    Transition::Exhausted {
                        attempts: self.validation_attempts,
                    }
                }
            }
            (Phase::Executing, PhaseEvent::FeatureDone) => {
                self.reset();
                Transition::NextFeature
            }
            _ => Transition::Ignored,
        };
        debug!(?transition, phase = %self.phase, "PhaseMachine::advance: done");
        transition
    }
}
