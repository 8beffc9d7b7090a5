//! Display formatting for domain models and operation results.
//!
//! Domain models implement `Display` directly; collections and operation
//! results are wrapped in newtypes so each output context picks its own
//! framing. Every formatter produces markdown for rich terminal display.
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  Domain Models  │    │ Wrappers &      │    │   Formatted     │
//! │  (Plan, Step)   │───▶│ Result Types    │───▶│    Output       │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```
//!
//! - [`collections`]: `Steps` and `Messages`
//! - [`results`]: `CreateResult`, `ApprovalResult`, `DeletionResult`
//! - [`status`]: `OperationStatus`
//! - [`datetime`]: `LocalDateTime`
//! - [`models`]: `Display` for plans, steps, snapshots and outcomes
//!
//! ```rust
//! use stepwise_core::display::OperationStatus;
//!
//! let status = OperationStatus::success("Cancellation requested for plan 3".to_string());
//! assert_eq!(status.to_string(), "Success: Cancellation requested for plan 3\n");
//! ```

pub mod collections;
pub mod datetime;
pub mod models;
pub mod results;
pub mod status;

pub use collections::{Messages, Steps};
pub use datetime::LocalDateTime;
pub use results::{ApprovalResult, CreateResult, DeletionResult};
pub use status::OperationStatus;
