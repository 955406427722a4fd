//! Answer composition.

use std::time::Instant;

use crate::error::{Result, SageError};
use crate::llm::prompt::build_answer_messages;
use crate::llm::LlmClient;

use super::history::{ConversationHistory, EntryKind};

/// Turns a question and its query result into a natural-language answer.
pub struct AnswerComposer<'a> {
    client: &'a dyn LlmClient,
    history_turns: usize,
}

impl<'a> AnswerComposer<'a> {
    pub fn new(client: &'a dyn LlmClient) -> Self {
        Self {
            client,
            history_turns: usize::MAX,
        }
    }

    /// Limits how many prior turns go into the prompt.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Composes an answer and returns it with the answer appended to `history`.
    pub async fn compose(
        &self,
        question: &str,
        result_text: &str,
        history: ConversationHistory,
    ) -> Result<(String, ConversationHistory)> {
        let start = Instant::now();
        let transcript = history.render_prior(self.history_turns);
        let messages = build_answer_messages(&transcript, question, result_text);

        tracing::debug!(
            result_len = result_text.len(),
            transcript_len = transcript.len(),
            "Composing answer"
        );

        let answer = self.client.complete(&messages).await?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(SageError::llm("Model returned an empty answer"));
        }

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            answer_len = answer.len(),
            "Composed answer"
        );

        let history = history.with_entry(EntryKind::Answer, answer.clone());
        Ok((answer, history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn current_turn() -> ConversationHistory {
        ConversationHistory::new()
            .with_entry(EntryKind::Question, "How many unicorns are registered?")
            .with_entry(EntryKind::Query, "SELECT name FROM unicorns LIMIT 10;")
            .with_entry(EntryKind::Result, "[]")
    }

    #[tokio::test]
    async fn test_empty_result_says_nothing_found() {
        let client = MockLlmClient::new();
        let composer = AnswerComposer::new(&client);
        let history = current_turn();

        let (answer, updated) = composer
            .compose("How many unicorns are registered?", "[]", history.clone())
            .await
            .unwrap();

        assert!(answer.contains("No information was found"));
        assert!(history.is_prefix_of(&updated));
        assert_eq!(updated.last().unwrap().kind, EntryKind::Answer);
    }

    #[tokio::test]
    async fn test_prompt_has_instruction_and_result() {
        let client = MockLlmClient::new();
        let composer = AnswerComposer::new(&client);

        composer
            .compose("How many unicorns are registered?", "[]", current_turn())
            .await
            .unwrap();

        let messages = &client.calls()[0];
        assert!(messages[0].content.contains("state that no information was found"));
        // The current turn is not repeated as prior conversation
        assert_eq!(
            messages[1].content,
            "Question: How many unicorns are registered?\nSQL Result: []"
        );
    }

    #[tokio::test]
    async fn test_blank_answer_is_an_error() {
        let client = MockLlmClient::new().with_answer("unicorns", "   ");
        let composer = AnswerComposer::new(&client);
        let history = current_turn();

        let err = composer
            .compose("How many unicorns are registered?", "[]", history)
            .await
            .unwrap_err();
        assert!(matches!(err, SageError::Llm(_)));
    }
}
