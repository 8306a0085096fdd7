//! External service providers.
//!
//! - [`email`] - Mail API trait and the Gmail REST client

pub mod email;
