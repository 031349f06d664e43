//! API server for BuildIt pipeline status tracking.
//!
//! Provides HTTP REST API and WebSocket endpoints on top of the
//! [`buildit_scheduler::Dispatcher`].

pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use state::AppState;
