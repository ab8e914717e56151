//! Shared types for the MediSage conversational assessment engine.

mod assessment;
mod chat;
mod completion;
mod session;

pub use assessment::*;
pub use chat::*;
pub use completion::*;
pub use session::*;
