//! Action dispatch for BuildIt CI/CD.
//!
//! Every status report and user action on a pipeline goes through the
//! [`Dispatcher`], which serializes mutations per pipeline, persists them
//! through a [`buildit_core::PipelineStore`] and publishes snapshots and
//! events to observers.

pub mod dispatcher;
pub mod event;
pub mod store;

pub use dispatcher::{ActionError, ActionOutcome, Dispatcher};
pub use event::PipelineEvent;
pub use store::MemoryPipelineStore;
