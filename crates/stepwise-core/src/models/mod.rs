//! Data models for plans, steps and the message log.
//!
//! These are plain data carriers shared by every layer of the engine.
//! Display implementations live in [`crate::display`] so presentation stays
//! out of the domain types.
//!
//! - [`Plan`] owns an ordered list of [`Step`]s and an aggregate
//!   [`PlanStatus`] that is always derived from the step statuses.
//! - [`Step`] carries its declared dependencies (ids of earlier steps), the
//!   assigned agent, and an optimistic-concurrency `version`.
//! - [`Message`] is the append-only audit log written by the dispatcher.
//! - [`NewPlan`] / [`DraftStep`] describe a validated plan before it has
//!   ids.
//! - [`StatusSnapshot`], [`ExecutionOutcome`] and [`StatusUpdate`] are
//!   read-side projections and execution events.

pub mod draft;
pub mod message;
pub mod plan;
pub mod snapshot;
pub mod status;
pub mod step;

#[cfg(test)]
mod tests;

pub use draft::{DraftStep, NewPlan};
pub use message::{Message, NewMessage};
pub use plan::Plan;
pub use snapshot::{ExecutionOutcome, StatusSnapshot, StatusUpdate, StepProgress};
pub use status::{MessageRole, PlanStatus, StepStatus};
pub use step::Step;
