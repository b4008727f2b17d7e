//! Specialist loop state

use llm_core::ChatMessage;

use super::action::ActionResponse;
use crate::tools::ActionKind;

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered with `chat`
    Replied { message: String },
    /// The model declared the task done
    Finished { message: String },
    /// A budget ran out or the model stopped answering
    Failed { reason: String },
}

impl TurnOutcome {
    pub fn message(&self) -> &str {
        match self {
            TurnOutcome::Replied { message } | TurnOutcome::Finished { message } => message,
            TurnOutcome::Failed { reason } => reason,
        }
    }
}

/// A `search_files` dispatch and what it found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEvent {
    pub query: String,
    pub location: Option<String>,
    pub matches: Option<usize>,
}

/// Everything a finished turn hands back to the session
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Conversation without the system prompt
    pub history: Vec<ChatMessage>,
    pub searches: Vec<SearchEvent>,
    pub iterations: usize,
    pub repairs: usize,
}

/// Where the loop is
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    AwaitingModel,
    /// Raw model reply awaiting validation
    Parsing(String),
    /// A permitted action with checked arguments
    Dispatching {
        raw: String,
        kind: ActionKind,
        response: ActionResponse,
    },
    Terminal(TurnOutcome),
}

/// Counters and history for one run of the loop
#[derive(Debug)]
pub struct LoopState {
    pub history: Vec<ChatMessage>,
    pub searches: Vec<SearchEvent>,
    pub iterations: usize,
    pub repairs: usize,
    consecutive_repairs: usize,
    max_iterations: usize,
    max_repairs: usize,
}

impl LoopState {
    pub fn new(input: &str, max_iterations: usize, max_repairs: usize) -> Self {
        Self {
            history: vec![ChatMessage::user(input)],
            searches: Vec::new(),
            iterations: 0,
            repairs: 0,
            consecutive_repairs: 0,
            max_iterations,
            max_repairs,
        }
    }

    /// Count a model call; false once the iteration budget is spent
    pub fn begin_iteration(&mut self) -> bool {
        if self.iterations >= self.max_iterations {
            return false;
        }
        self.iterations += 1;
        true
    }

    /// Count a protocol repair; false once too many happened in a row
    pub fn record_repair(&mut self) -> bool {
        if self.consecutive_repairs >= self.max_repairs {
            return false;
        }
        self.consecutive_repairs += 1;
        self.repairs += 1;
        true
    }

    /// A well-formed action resets the repair streak
    pub fn record_valid_action(&mut self) {
        self.consecutive_repairs = 0;
    }

    pub fn consecutive_repairs(&self) -> usize {
        self.consecutive_repairs
    }

    pub fn finish(self, outcome: TurnOutcome) -> TurnReport {
        TurnReport {
            outcome,
            history: self.history,
            searches: self.searches,
            iterations: self.iterations,
            repairs: self.repairs,
        }
    }
}
