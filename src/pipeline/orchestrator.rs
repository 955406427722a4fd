//! Turn orchestrator.
//!
//! Owns the injected clients, the schema fetched at startup and the session
//! history, and drives each question through
//! `start -> querying -> executing -> answering -> done`. A failing stage
//! ends only the current turn; history keeps whatever the earlier stages of
//! that turn appended.

use std::fmt;
use std::time::Instant;

use crate::config::PipelineSettings;
use crate::db::{DatabaseClient, Schema};
use crate::error::{Result, SageError};
use crate::llm::prompt::QueryContext;
use crate::llm::LlmClient;

use super::composer::AnswerComposer;
use super::executor::QueryExecutor;
use super::generator::QueryGenerator;
use super::history::ConversationHistory;
use super::turn::{Turn, TurnStage};

/// A turn that stopped before `done`.
#[derive(Debug)]
pub struct TurnFailure {
    /// The turn as far as it got; its stage is the one that failed.
    pub turn: Turn,
    pub error: SageError,
}

impl TurnFailure {
    pub fn stage(&self) -> TurnStage {
        self.turn.stage()
    }
}

impl fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for TurnFailure {}

/// Runs question/answer turns against one database and one model.
pub struct TurnOrchestrator {
    llm: Box<dyn LlmClient>,
    db: Box<dyn DatabaseClient>,
    schema: Schema,
    settings: PipelineSettings,
    history: ConversationHistory,
}

impl TurnOrchestrator {
    /// Creates an orchestrator, introspecting the schema once.
    pub async fn connect(
        llm: Box<dyn LlmClient>,
        db: Box<dyn DatabaseClient>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        let start = Instant::now();
        let schema = db.introspect_schema().await?;
        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            tables = schema.tables.len(),
            dialect = db.dialect(),
            "Loaded schema"
        );
        Ok(Self::new(llm, db, schema, settings))
    }

    /// Creates an orchestrator with an already known schema.
    pub fn new(
        llm: Box<dyn LlmClient>,
        db: Box<dyn DatabaseClient>,
        schema: Schema,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            llm,
            db,
            schema,
            settings,
            history: ConversationHistory::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn dialect(&self) -> &str {
        self.db.dialect()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Runs one question through the pipeline.
    pub async fn run_turn(&mut self, question: &str) -> std::result::Result<Turn, TurnFailure> {
        let question = question.trim();
        let mut turn = Turn::new(question);
        let start = Instant::now();

        tracing::info!(
            question_len = question.len(),
            history_len = self.history.len(),
            strategy = %self.settings.strategy,
            "Starting turn"
        );

        match self.drive(&mut turn).await {
            Ok(()) => {
                tracing::info!(
                    duration_ms = start.elapsed().as_millis(),
                    history_len = self.history.len(),
                    "Turn complete"
                );
                Ok(turn)
            }
            Err(error) => {
                tracing::warn!(
                    stage = %turn.stage(),
                    category = error.category(),
                    error = %error,
                    "Turn failed"
                );
                Err(TurnFailure { turn, error })
            }
        }
    }

    /// Advances `turn` stage by stage, committing history after each success.
    async fn drive(&mut self, turn: &mut Turn) -> Result<()> {
        if turn.question.is_empty() {
            return Err(SageError::input("Question is empty"));
        }
        turn.begin()?;

        let ctx = QueryContext {
            dialect: self.db.dialect(),
            row_limit: self.settings.row_limit,
            schema: &self.schema,
        };
        let generator = QueryGenerator::new(self.llm.as_ref(), self.settings.strategy)
            .with_history_turns(self.settings.history_turns);
        let (sql, history) = generator
            .generate(&turn.question, self.history.clone(), &ctx)
            .await?;
        self.history = history;
        turn.record_query(sql)?;

        let executor = QueryExecutor::new(self.db.as_ref());
        let (output, history) = executor
            .execute(&turn.generated_query, self.history.clone())
            .await?;
        self.history = history;
        turn.record_result(output.text)?;

        let composer =
            AnswerComposer::new(self.llm.as_ref()).with_history_turns(self.settings.history_turns);
        let (answer, history) = composer
            .compose(&turn.question, &turn.result, self.history.clone())
            .await?;
        self.history = history;
        turn.record_answer(answer)?;

        Ok(())
    }

    /// Closes the database connection.
    pub async fn close(&self) -> Result<()> {
        self.db.close().await
    }
}
