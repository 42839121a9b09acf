//! Session lifecycle: the registry of live sessions and the turn state machine

pub mod manager;
pub mod registry;

pub use manager::{IngestReport, SessionManager, TurnOutcome, TurnReport};
pub use registry::{SessionEntry, SessionHandle, SessionRegistry};
