//! Phase state machine: turns filtered angles into movement phases and
//! validated repetition counts.

mod machine;
mod types;

#[cfg(test)]
mod tests;

pub use machine::PhaseStateMachine;
pub use types::{Phase, PhaseTransition, PhaseUpdate, RepOutcome, RepRejection};
