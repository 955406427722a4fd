//! The question-answering pipeline.
//!
//! Each turn runs three stages in order: [`QueryGenerator`] writes SQL for
//! the question, [`QueryExecutor`] runs it, and [`AnswerComposer`] explains
//! the result. [`TurnOrchestrator`] sequences them and owns the
//! [`ConversationHistory`].

pub mod composer;
pub mod executor;
pub mod generator;
pub mod history;
pub mod orchestrator;
pub mod turn;

pub use composer::AnswerComposer;
pub use executor::{ExecutionOutput, QueryExecutor};
pub use generator::{GenerationStrategy, QueryGenerator};
pub use history::{ConversationHistory, EntryKind, HistoryEntry};
pub use orchestrator::{TurnFailure, TurnOrchestrator};
pub use turn::{Turn, TurnStage};
