//! Per-disc state machine.
//!
//! [`transition`] is a pure function of `(state, event)`. Each non-terminal state asks
//! for exactly one effect whose outcome becomes the next event. Entering a terminal
//! state may ask for closing effects (record, eject, reject) that produce no further
//! events.

use crate::job::JobState;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Event {
    Submitted,
    /// Quit was requested before this job touched the hardware.
    QuitRequested,
    /// The effect requested by the current state succeeded.
    Succeeded,
    /// The effect requested by the current state failed. `unrecoverable` means the
    /// drive or robot state can no longer be trusted.
    Failed { unrecoverable: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Load,
    Classify,
    Process,
    Verify,
    Record,
    Eject,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub next: JobState,
    pub effects: Vec<Effect>,
}

impl Step {
    fn to(next: JobState, effects: &[Effect]) -> Self {
        Self {
            next,
            effects: effects.to_vec(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no transition from {state:?} on {event:?}")]
pub struct InvalidTransition {
    pub state: JobState,
    pub event: Event,
}

pub fn transition(state: JobState, event: Event) -> Result<Step, InvalidTransition> {
    use Effect::*;
    use JobState as S;

    let step = match (state, event) {
        (S::Idle, Event::Submitted) => Step::to(S::Loading, &[Load]),
        (S::Idle, Event::QuitRequested) => Step::to(S::Rejected, &[Record]),

        (S::Loading, Event::Succeeded) => Step::to(S::Classifying, &[Classify]),
        (S::Loading, Event::Failed { .. }) => Step::to(S::Rejected, &[Record, Reject]),

        (S::Classifying, Event::Succeeded) => Step::to(S::Processing, &[Process]),
        (S::Processing, Event::Succeeded) => Step::to(S::Verifying, &[Verify]),
        (S::Classifying | S::Processing, Event::Failed { unrecoverable: true }) => {
            Step::to(S::Rejected, &[Record, Reject])
        }
        (S::Classifying | S::Processing | S::Verifying, Event::Failed { .. }) => {
            Step::to(S::Failed, &[Record, Eject])
        }

        (S::Verifying, Event::Succeeded) => Step::to(S::Recording, &[Record]),
        (S::Recording, Event::Succeeded) => Step::to(S::Ejecting, &[Eject]),
        // Artifacts and manifest are already final; a stuck eject is only a warning.
        (S::Ejecting, Event::Succeeded | Event::Failed { .. }) => Step::to(S::Done, &[]),

        (state, event) => return Err(InvalidTransition { state, event }),
    };
    Ok(step)
}
