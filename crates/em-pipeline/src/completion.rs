// completion.rs — Completion asks with JSON shaping and self-correction.
//
// Extraction stages ask the completion backend for structured answers.
// The backend replies in prose, usually wrapping the JSON in a ```json
// fence; the helpers here pull the block out, parse it into the stage's
// typed shape, and turn a malformed reply into an output-shape failure
// carrying the bad reply, so the next attempt can show the backend what
// it got wrong.

use em_queue::StageError;
use em_review::{CompletionBackend, CompletionError};
use serde::de::DeserializeOwned;

use crate::payload::ShapeFeedback;

/// At most this much passage text rides into an identification ask.
/// Extraction asks use the full passage set; these shorter asks only
/// need the opening of the report.
pub(crate) const ASK_EXTRACT_LIMIT: usize = 5_000;

/// Pull the JSON out of a completion reply: the contents of the first
/// ```json fence when present, otherwise the whole reply trimmed.
pub fn extract_json_block(reply: &str) -> &str {
    if let Some(start) = reply.find("```json") {
        let body = &reply[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    reply.trim()
}

/// Backend failures are worth another attempt either way: transport
/// errors obviously, and an unusable reply because the next one may not
/// be.
fn completion_error(err: CompletionError) -> StageError {
    StageError::transient(err.to_string())
}

/// Ask for plain text.
pub async fn ask_text(
    backend: &dyn CompletionBackend,
    instruction: &str,
    input: &str,
) -> Result<String, StageError> {
    let reply = backend
        .complete(instruction, input)
        .await
        .map_err(completion_error)?;
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(StageError::transient("completion returned no text"));
    }
    Ok(trimmed.to_string())
}

/// Ask for JSON matching `T`.
///
/// When `feedback` carries a previous failed reply the ask includes it,
/// so the backend sees its own mistake; the engine fills `feedback` in
/// by folding an output-shape failure back into the payload.
pub async fn ask_json<T: DeserializeOwned>(
    backend: &dyn CompletionBackend,
    instruction: &str,
    input: &str,
    feedback: &ShapeFeedback,
) -> Result<T, StageError> {
    let input = match &feedback.previous_output {
        Some(previous) => format!(
            "{input}\n\nYour previous reply could not be used.\nPrevious reply:\n{previous}\nProblem: {}\nAnswer again, with valid JSON only.",
            feedback.previous_error.as_deref().unwrap_or("invalid JSON")
        ),
        None => input.to_string(),
    };

    let reply = backend
        .complete(instruction, &input)
        .await
        .map_err(completion_error)?;
    let block = extract_json_block(&reply);
    match serde_json::from_str(block) {
        Ok(value) => Ok(value),
        Err(err) => Err(StageError::OutputShape {
            output: block.to_string(),
            message: format!("reply is not valid JSON for this ask: {err}"),
        }),
    }
}

/// Cut `text` to at most `max` bytes without splitting a character.
pub(crate) fn truncated(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
