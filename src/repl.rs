//! Interactive console loop.
//!
//! Reads one question per line and prints an `Answer:` or `Error:` line for
//! each. Generic over reader and writer so it can be driven from tests.

use std::io::{BufRead, Write};

use crate::error::{Result, SageError};
use crate::pipeline::{TurnFailure, TurnOrchestrator};

const PROMPT: &str = "Question: ";

/// Console output options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplOptions {
    /// Print the generated SQL before each answer.
    pub show_sql: bool,
    /// Print the input prompt. Disabled when stdin is not a terminal.
    pub prompt: bool,
}

/// Returns true if the line asks to leave the loop.
pub fn is_exit_command(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "exit" | "quit")
}

/// Runs the loop until `exit`, `quit` or end of input.
///
/// Turn failures are printed and the loop continues. Returns the number of
/// turns that failed.
pub async fn run<R, W>(
    orchestrator: &mut TurnOrchestrator,
    mut input: R,
    output: &mut W,
    options: ReplOptions,
) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut failures = 0;
    let mut line = String::new();

    loop {
        if options.prompt {
            write!(output, "{PROMPT}").map_err(io_error)?;
            output.flush().map_err(io_error)?;
        }

        line.clear();
        let read = input.read_line(&mut line).map_err(io_error)?;
        if read == 0 {
            tracing::debug!("End of input");
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit_command(question) {
            tracing::debug!("Exit requested");
            break;
        }

        if !ask(orchestrator, question, output, options).await? {
            failures += 1;
        }
    }

    Ok(failures)
}

/// Runs a single turn and prints its outcome. Returns false if the turn failed.
///
/// Turn-level failures are reported and swallowed; fatal ones end the session.
pub async fn ask<W: Write>(
    orchestrator: &mut TurnOrchestrator,
    question: &str,
    output: &mut W,
    options: ReplOptions,
) -> Result<bool> {
    match orchestrator.run_turn(question).await {
        Ok(turn) => {
            if options.show_sql {
                writeln!(output, "SQL: {}", turn.generated_query).map_err(io_error)?;
            }
            writeln!(output, "Answer: {}", turn.answer).map_err(io_error)?;
            Ok(true)
        }
        Err(failure) => {
            print_failure(&failure, output, options)?;
            if failure.error.is_fatal() {
                return Err(failure.error);
            }
            Ok(false)
        }
    }
}

fn print_failure<W: Write>(failure: &TurnFailure, output: &mut W, options: ReplOptions) -> Result<()> {
    if options.show_sql && !failure.turn.generated_query.is_empty() {
        writeln!(output, "SQL: {}", failure.turn.generated_query).map_err(io_error)?;
    }
    writeln!(output, "Error: {}", failure.error).map_err(io_error)
}

fn io_error(e: std::io::Error) -> SageError {
    SageError::internal(format!("Console I/O failed: {e}"))
}
