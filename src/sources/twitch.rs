//! Twitch chat source.
//!
//! Connects anonymously to Twitch's IRC gateway and forwards every chat line
//! of one channel as a `ChatMessage`.
//!
//! Behavior:
//! - Logs in as `justinfanNNNNN` (random 5-digit suffix) with a placeholder
//!   password; anonymous logins are read-only, which is all a feed needs.
//! - Joins `#channel` after the `001` welcome and reports `Listening` once
//!   the server confirms the join.
//! - Answers `PING` with `PONG` so the server keeps the connection open.
//!
//! Reconnect policy:
//! - No welcome within 3 seconds: reconnect immediately.
//! - Server closed the connection: reconnect after 5 seconds.
//! - Any other I/O error: reconnect after 1 second.
//!
//! Cancellation:
//! - The task ends as soon as the link's cancellation token fires, or when
//!   the dispatcher intake is closed.

use std::time::Duration;

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    task::JoinHandle,
    time::{Instant, sleep, timeout_at},
};
use tracing::{debug, info, trace, warn};

use super::irc::IrcLine;
use super::{ChatMessage, FeedLink, FeedSource, FeedState};
use crate::error::FeedError;

/// Public Twitch chat IRC endpoint (plain TCP).
pub const TWITCH_IRC_ADDR: &str = "irc.chat.twitch.tv:6667";

const LOGIN_TIMEOUT: Duration = Duration::from_secs(3);
const RETRY_AFTER_CLOSE: Duration = Duration::from_secs(5);
const RETRY_AFTER_ERROR: Duration = Duration::from_secs(1);

/// Numeric replies that only carry server chatter.
const IGNORED_REPLIES: &[&str] = &["002", "003", "004", "353", "366", "372", "375", "376"];

/// Source that reads chat from one Twitch channel.
#[derive(Debug, Clone)]
pub struct TwitchSource {
    channel: String,
    server: String,
}

impl TwitchSource {
    /// Create a source for `channel` (a leading `#` is optional; case is ignored).
    pub fn new(channel: &str) -> Result<Self, FeedError> {
        let channel = channel.trim().trim_start_matches('#').to_lowercase();
        if channel.is_empty() {
            return Err(FeedError::InvalidChannel);
        }
        Ok(Self {
            channel,
            server: TWITCH_IRC_ADDR.to_string(),
        })
    }

    /// Connect to a different IRC endpoint (`host:port`).
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// The normalized channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// One connection lifetime. `Ok(())` means the server closed the connection.
    async fn session(&self, link: &FeedLink) -> Result<(), FeedError> {
        let stream = TcpStream::connect(&self.server).await?;
        let (read_half, mut write_half) = stream.into_split();

        let nick = anonymous_nick();
        debug!(target: "chatplays::sources", server = %self.server, %nick, "Logging in anonymously");
        write_half
            .write_all(format!("PASS asdf\r\nNICK {nick}\r\n").as_bytes())
            .await?;

        let mut lines = BufReader::new(read_half).lines();
        let login_deadline = Instant::now() + LOGIN_TIMEOUT;
        let mut logged_in = false;

        loop {
            let next = if logged_in {
                lines.next_line().await?
            } else {
                timeout_at(login_deadline, lines.next_line())
                    .await
                    .map_err(|_| FeedError::LoginTimeout)??
            };
            let Some(raw) = next else {
                return Ok(());
            };
            let Some(line) = IrcLine::parse(&raw) else {
                trace!(target: "chatplays::sources", line = %raw, "Skipping unparsable IRC line");
                continue;
            };

            match line.command {
                "PRIVMSG" => {
                    let message = ChatMessage::now(
                        line.nick.unwrap_or_default(),
                        line.trailing.unwrap_or_default(),
                    );
                    link.deliver(message).await?;
                }
                "PING" => {
                    let token = line.trailing.unwrap_or("tmi.twitch.tv");
                    write_half
                        .write_all(format!("PONG :{token}\r\n").as_bytes())
                        .await?;
                }
                "001" => {
                    info!(target: "chatplays::sources", channel = %self.channel, "Logged in; joining channel");
                    write_half
                        .write_all(format!("JOIN #{}\r\n", self.channel).as_bytes())
                        .await?;
                    logged_in = true;
                }
                "JOIN" => {
                    info!(
                        target: "chatplays::sources",
                        channel = line.params.first().copied().unwrap_or_default(),
                        "Joined channel"
                    );
                    link.set_state(FeedState::Listening);
                }
                "NOTICE" => {
                    warn!(
                        target: "chatplays::sources",
                        params = ?line.params,
                        text = line.trailing.unwrap_or_default(),
                        "Server notice"
                    );
                }
                reply if IGNORED_REPLIES.contains(&reply) => {}
                other => {
                    debug!(target: "chatplays::sources", command = other, line = %raw, "Unhandled IRC message");
                }
            }
        }
    }
}

impl FeedSource for TwitchSource {
    fn name(&self) -> &'static str {
        "twitch"
    }

    fn start(&self, link: FeedLink) -> JoinHandle<()> {
        let source = self.clone();

        tokio::spawn(async move {
            info!(
                target: "chatplays::sources",
                channel = %source.channel, server = %source.server,
                "TwitchSource task started"
            );

            loop {
                link.set_state(FeedState::Connecting);
                let outcome = tokio::select! {
                    _ = link.cancel().cancelled() => break,
                    outcome = source.session(&link) => outcome,
                };

                let delay = match outcome {
                    Ok(()) => {
                        warn!(target: "chatplays::sources", "Connection closed by server; reconnecting in 5 seconds");
                        RETRY_AFTER_CLOSE
                    }
                    Err(FeedError::LoginTimeout) => {
                        warn!(target: "chatplays::sources", "No login response; reconnecting");
                        Duration::ZERO
                    }
                    Err(FeedError::IntakeClosed) => {
                        info!(target: "chatplays::sources", "Intake closed; TwitchSource terminating");
                        break;
                    }
                    Err(e) => {
                        warn!(target: "chatplays::sources", error = %e, "Connection error; reconnecting in 1 second");
                        RETRY_AFTER_ERROR
                    }
                };

                link.set_state(FeedState::Connecting);
                tokio::select! {
                    _ = link.cancel().cancelled() => break,
                    _ = sleep(delay) => {}
                }
            }

            info!(target: "chatplays::sources", channel = %source.channel, "TwitchSource task ended");
        })
    }
}

fn anonymous_nick() -> String {
    format!("justinfan{}", rand::random_range(10_000..=99_999))
}
