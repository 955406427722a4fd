//! Conversation history.
//!
//! An append-only log of question, query, result and answer entries. Stages
//! take the history by value and hand back an extended copy, so a failed
//! stage leaves the caller holding the last good state.

/// Longest entry text carried into a prompt; larger results are cut.
const MAX_RENDERED_ENTRY_CHARS: usize = 4_000;

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Question,
    Query,
    Result,
    Answer,
}

impl EntryKind {
    /// Label used when rendering the transcript.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Question => "User",
            Self::Query => "SQL Query",
            Self::Result => "SQL Result",
            Self::Answer => "Answer",
        }
    }
}

/// A single history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub kind: EntryKind,
    pub text: String,
}

impl HistoryEntry {
    pub fn new(kind: EntryKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Ordered log of everything said and run during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    entries: Vec<HistoryEntry>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the history extended by one entry.
    #[must_use]
    pub fn with_entry(mut self, kind: EntryKind, text: impl Into<String>) -> Self {
        self.entries.push(HistoryEntry::new(kind, text));
        self
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Number of turns started, counted by question entries.
    pub fn turn_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Question)
            .count()
    }

    /// Returns true if `self` is the start of `other`.
    pub fn is_prefix_of(&self, other: &ConversationHistory) -> bool {
        other.entries.starts_with(&self.entries)
    }

    /// Renders the last `last_n_turns` turns as a transcript.
    pub fn render(&self, last_n_turns: usize) -> String {
        render_entries(&self.entries, last_n_turns)
    }

    /// Renders the last `last_n_turns` turns before the most recent question.
    ///
    /// Used once the current turn has been recorded, so the current question
    /// is not repeated in the transcript.
    pub fn render_prior(&self, last_n_turns: usize) -> String {
        let end = self
            .entries
            .iter()
            .rposition(|e| e.kind == EntryKind::Question)
            .unwrap_or(self.entries.len());
        render_entries(&self.entries[..end], last_n_turns)
    }
}

fn render_entries(entries: &[HistoryEntry], last_n_turns: usize) -> String {
    if last_n_turns == 0 {
        return String::new();
    }

    let turn_starts: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind == EntryKind::Question)
        .map(|(i, _)| i)
        .collect();
    let start = if turn_starts.len() > last_n_turns {
        turn_starts[turn_starts.len() - last_n_turns]
    } else {
        0
    };

    entries[start..]
        .iter()
        .map(|e| format!("{}: {}", e.kind.label(), clip(&e.text)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clip(text: &str) -> std::borrow::Cow<'_, str> {
    match text.char_indices().nth(MAX_RENDERED_ENTRY_CHARS) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]).into(),
        None => text.into(),
    }
}
