// terminal.rs — Reviewer actions typed on the daemon's stdin.
//
// The default run has no chat transport, so prompts land in the log and
// an operator answers them here, one action per line:
//
//   approve 7b0c…            reject 7b0c…            retry 7b0c…
//   feedback 7b0c… scope2 should be market-based
//
// Each line becomes an ActionEnvelope on the dispatcher's channel. A
// line that doesn't parse gets a hint on stderr and is dropped; it never
// touches a job.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

use em_review::{ActionEnvelope, ReviewAction};

/// Parse one typed line into an action envelope.
pub fn parse_action(line: &str, reviewer: &str) -> Result<ActionEnvelope, String> {
    let mut parts = line.split_whitespace();
    let verb = parts
        .next()
        .ok_or_else(|| "empty line".to_string())?
        .to_ascii_lowercase();
    let id = parts
        .next()
        .ok_or_else(|| format!("usage: {verb} <job-id>"))?;
    let job_id = Uuid::parse_str(id).map_err(|_| format!("not a job id: {id}"))?;

    let rest = parts.collect::<Vec<_>>().join(" ");
    let action = match verb.as_str() {
        "approve" => ReviewAction::Approve,
        "reject" => ReviewAction::Reject,
        "retry" => ReviewAction::Retry,
        "feedback" => {
            if rest.is_empty() {
                return Err("usage: feedback <job-id> <correction text>".to_string());
            }
            ReviewAction::Feedback { text: rest }
        }
        other => {
            return Err(format!(
                "unknown action {other}; expected approve, reject, retry or feedback"
            ))
        }
    };
    Ok(ActionEnvelope::new(job_id, action, reviewer))
}

/// Read stdin until EOF, forwarding parsed actions to the dispatcher.
pub async fn read_actions(actions: mpsc::Sender<ActionEnvelope>, reviewer: String) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_action(trimmed, &reviewer) {
                    Ok(envelope) => {
                        if actions.send(envelope).await.is_err() {
                            return;
                        }
                    }
                    Err(hint) => eprintln!("{hint}"),
                }
            }
            Ok(None) => {
                tracing::info!("stdin closed, no further terminal actions");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

    #[test]
    fn approve_reject_retry_parse() {
        for (line, expected) in [
            (format!("approve {ID}"), ReviewAction::Approve),
            (format!("reject {ID}"), ReviewAction::Reject),
            (format!("retry {ID}"), ReviewAction::Retry),
        ] {
            let envelope = parse_action(&line, "alex").unwrap();
            assert_eq!(envelope.action, expected);
            assert_eq!(envelope.job_id, Uuid::parse_str(ID).unwrap());
            assert_eq!(envelope.reviewer, "alex");
        }
    }

    #[test]
    fn verb_is_case_insensitive() {
        let envelope = parse_action(&format!("APPROVE {ID}"), "alex").unwrap();
        assert_eq!(envelope.action, ReviewAction::Approve);
    }

    #[test]
    fn feedback_keeps_the_free_text() {
        let envelope =
            parse_action(&format!("feedback {ID} scope2 should be market-based"), "alex").unwrap();
        assert_eq!(
            envelope.action,
            ReviewAction::Feedback {
                text: "scope2 should be market-based".to_string()
            }
        );
    }

    #[test]
    fn feedback_without_text_is_rejected() {
        let err = parse_action(&format!("feedback {ID}"), "alex").unwrap_err();
        assert!(err.contains("correction text"));
    }

    #[test]
    fn bad_input_is_explained() {
        assert!(parse_action("", "alex").unwrap_err().contains("empty"));
        assert!(parse_action("approve", "alex").unwrap_err().contains("usage"));
        assert!(parse_action("approve not-an-id", "alex")
            .unwrap_err()
            .contains("not a job id"));
        assert!(parse_action(&format!("promote {ID}"), "alex")
            .unwrap_err()
            .contains("unknown action"));
    }
}
