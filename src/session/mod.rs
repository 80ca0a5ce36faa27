pub mod runner;
pub mod state;

pub use runner::{Devices, Services, SessionCommand, SessionOrchestrator};
pub use state::{new_shared_state, ErrorKind, SessionError, SessionState, SharedState, Stage};
