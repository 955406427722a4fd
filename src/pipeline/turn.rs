//! A single question/query/result/answer cycle.

use std::fmt;

use crate::error::{Result, SageError};

/// Where a turn is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Start,
    Querying,
    Executing,
    Answering,
    Done,
}

impl TurnStage {
    /// The stage that follows this one. `Done` is final.
    pub fn next(&self) -> Option<TurnStage> {
        match self {
            Self::Start => Some(Self::Querying),
            Self::Querying => Some(Self::Executing),
            Self::Executing => Some(Self::Answering),
            Self::Answering => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Querying => "querying",
            Self::Executing => "executing",
            Self::Answering => "answering",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One interaction. Fields are empty until their stage produces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub generated_query: String,
    pub result: String,
    pub answer: String,
    stage: TurnStage,
}

impl Turn {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            generated_query: String::new(),
            result: String::new(),
            answer: String::new(),
            stage: TurnStage::Start,
        }
    }

    pub fn stage(&self) -> TurnStage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.stage == TurnStage::Done
    }

    /// Moves from `start` to `querying`.
    pub fn begin(&mut self) -> Result<()> {
        self.advance(TurnStage::Start)
    }

    /// Records the generated query and moves to `executing`.
    pub fn record_query(&mut self, sql: impl Into<String>) -> Result<()> {
        self.advance(TurnStage::Querying)?;
        self.generated_query = sql.into();
        Ok(())
    }

    /// Records the execution result and moves to `answering`.
    pub fn record_result(&mut self, result: impl Into<String>) -> Result<()> {
        self.advance(TurnStage::Executing)?;
        self.result = result.into();
        Ok(())
    }

    /// Records the answer and moves to `done`.
    pub fn record_answer(&mut self, answer: impl Into<String>) -> Result<()> {
        self.advance(TurnStage::Answering)?;
        self.answer = answer.into();
        Ok(())
    }

    fn advance(&mut self, expected: TurnStage) -> Result<()> {
        if self.stage != expected {
            return Err(SageError::internal(format!(
                "Turn is in stage '{}', expected '{expected}'",
                self.stage
            )));
        }
        // `expected` is never Done here, so there is always a next stage
        self.stage = expected.next().unwrap_or(TurnStage::Done);
        Ok(())
    }
}
