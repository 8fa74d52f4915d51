/*!
Chat feed sources (orchestration layer).

This module defines the `FeedSource` trait, the `ChatMessage` every source
produces, and the `FeedLink` a running source reports through. Concrete
implementations live in their own files:

- `twitch.rs`       -> `TwitchSource` (anonymous Twitch chat over IRC)
- `irc.rs`          -> IRC line parsing used by the Twitch source
- `stdin_source.rs` -> `StdinSource`  (one chat message per line of standard input)

Each source implementation is responsible for:
- Turning raw input into `ChatMessage`s, in receipt order
- Pushing messages via `FeedLink::deliver` while respecting backpressure
- Reporting its connection state; failures surface as "not listening"
- Logging errors and continuing (never panicking inside tasks)
- Ending promptly once `FeedLink::cancel` fires or the intake closes
*/

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc::Sender, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::error::FeedError;

pub mod irc;
pub mod stdin_source;
pub mod twitch;

pub use stdin_source::StdinSource;
pub use twitch::TwitchSource;

/// One chat message as delivered by a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A message stamped with the current time.
    pub fn now(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Connection state of the active feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    #[default]
    Disconnected,
    Connecting,
    Listening,
}

/// Everything a running source needs to talk back to the dispatcher.
#[derive(Clone)]
pub struct FeedLink {
    messages: Sender<ChatMessage>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<FeedState>>,
}

impl FeedLink {
    pub fn new(
        messages: Sender<ChatMessage>,
        cancel: CancellationToken,
        state: Arc<watch::Sender<FeedState>>,
    ) -> Self {
        Self {
            messages,
            cancel,
            state,
        }
    }

    /// Fires when the source should stop.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Publish a state change, unless this source has already been cancelled
    /// (a replacement source may own the state by now).
    pub fn set_state(&self, state: FeedState) {
        if !self.cancel.is_cancelled() {
            self.state.send_replace(state);
        }
    }

    /// Hand a message to the dispatcher, waiting for intake capacity.
    pub async fn deliver(&self, message: ChatMessage) -> Result<(), FeedError> {
        self.messages
            .send(message)
            .await
            .map_err(|_| FeedError::IntakeClosed)
    }
}

/// Trait implemented by all chat feeds.
///
/// A source spawns an asynchronous task that produces chat messages and
/// delivers them through the provided link. Tasks should never panic; log and
/// continue, or exit gracefully on unrecoverable errors.
pub trait FeedSource: Send + Sync {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Start the source in the background.
    fn start(&self, link: FeedLink) -> JoinHandle<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_cancelled_link_no_longer_publishes_state() {
        let (tx, _rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(FeedState::Disconnected);
        let link = FeedLink::new(tx, CancellationToken::new(), Arc::new(state_tx));

        link.set_state(FeedState::Listening);
        assert_eq!(*state_rx.borrow(), FeedState::Listening);

        link.cancel().cancel();
        link.set_state(FeedState::Connecting);
        assert_eq!(*state_rx.borrow(), FeedState::Listening);
    }

    #[tokio::test]
    async fn test_deliver_fails_once_intake_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let (state_tx, _state_rx) = watch::channel(FeedState::Disconnected);
        let link = FeedLink::new(tx, CancellationToken::new(), Arc::new(state_tx));
        drop(rx);

        let err = link.deliver(ChatMessage::now("a", "b")).await.unwrap_err();
        assert!(matches!(err, FeedError::IntakeClosed));
    }
}
