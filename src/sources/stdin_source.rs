//! Stdin chat source.
//!
//! Reads chat messages from standard input, one per line.
//!
//! Behavior:
//! - A line of the form `sender: text` (sender being a single word) is
//!   delivered with that sender; any other line is delivered whole with the
//!   sender `stdin`.
//! - Blank lines are ignored.
//! - End Of File (EOF), cancellation, or a closed intake terminates the task gracefully;
//!   the feed then reports `Disconnected`.
//!
//! Rationale:
//! - Useful for trying a profile without a live channel, e.g.:
//!     printf 'viewer: jump\n' | chatplays --profile profiles/platformer.json --stdin --dry-run

use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tracing::{info, trace, warn};

use super::{ChatMessage, FeedLink, FeedSource, FeedState};

/// Sender name used for lines without an explicit sender.
pub const STDIN_SENDER: &str = "stdin";

/// Source that reads chat lines from stdin.
#[derive(Debug, Clone, Default)]
pub struct StdinSource;

impl StdinSource {
    /// Construct a new `StdinSource`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Split a raw line into a chat message; `None` for blank lines.
pub fn parse_line(raw: &str) -> Option<ChatMessage> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    let message = match line.split_once(": ") {
        Some((sender, text)) if !sender.is_empty() && !sender.contains(char::is_whitespace) => {
            ChatMessage::now(sender, text)
        }
        _ => ChatMessage::now(STDIN_SENDER, line),
    };
    Some(message)
}

impl FeedSource for StdinSource {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn start(&self, link: FeedLink) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(target: "chatplays::sources", "StdinSource task started (reading lines)");
            link.set_state(FeedState::Listening);
            let mut lines = BufReader::new(io::stdin()).lines();

            loop {
                let next = tokio::select! {
                    _ = link.cancel().cancelled() => break,
                    next = lines.next_line() => next,
                };
                match next {
                    Ok(Some(raw)) => {
                        let Some(message) = parse_line(&raw) else {
                            continue;
                        };
                        trace!(target: "chatplays::sources", sender = %message.sender, "Read chat line from stdin");
                        if link.deliver(message).await.is_err() {
                            info!(target: "chatplays::sources", "Intake closed; StdinSource terminating");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!(target: "chatplays::sources", "EOF on stdin; StdinSource exiting");
                        break;
                    }
                    Err(e) => {
                        warn!(
                            target: "chatplays::sources",
                            error = %e,
                            "Error reading from stdin; terminating task"
                        );
                        break;
                    }
                }
            }

            link.set_state(FeedState::Disconnected);
            trace!(target: "chatplays::sources", "StdinSource task ended");
        })
    }
}
