//! MediSage server library: configuration, logging, state and HTTP routes.
//!
//! Kept separate from main.rs so integration tests can build the router.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;
