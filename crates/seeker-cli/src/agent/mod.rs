//! Specialist agent: the JSON action protocol and the loop that drives it

pub mod action;
mod agent_loop;
mod state;
pub mod transport;

pub use agent_loop::{SpecialistLoop, DEFAULT_FINISH_MESSAGE};
pub use state::{SearchEvent, TurnOutcome, TurnReport};
pub use transport::{ClassifierTransport, ModelTransport, OllamaTransport};
