//! Application layer: the session handler and its state.
//!
//! The presentation layer talks to the core only through [`SweepHandler`].

mod handler;
mod state;

pub use handler::{DeletionPrompt, SweepHandler, UnsubscribeOutcome};
pub use state::SessionState;
