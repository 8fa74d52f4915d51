//! Operator controls.
//!
//! Chat drives the real keyboard and mouse, so the operator needs a way to
//! take it back at any moment:
//! - Console: `pause` (alias `p`), `resume` (`r`), `status` (`s`) and
//!   `stop` (`q`, `quit`) typed on the terminal, when standard input is not
//!   the chat feed.
//! - Signals (Unix): `SIGUSR1` pauses and `SIGUSR2` resumes. These work
//!   without terminal focus, e.g. from a desktop shortcut running
//!   `pkill -USR1 chatplays`.
//!
//! `pause` is the emergency stop: it disables dispatch for the very next
//! message. `stop` also shuts the process down.

use std::io::BufRead;
use std::str::FromStr;
use std::thread;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Dispatcher;
use crate::error::UnknownOperatorCommand;

/// Something the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Pause,
    Resume,
    Status,
    Stop,
}

impl FromStr for OperatorCommand {
    type Err = UnknownOperatorCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pause" | "p" => Ok(Self::Pause),
            "resume" | "r" => Ok(Self::Resume),
            "status" | "s" => Ok(Self::Status),
            "stop" | "q" | "quit" => Ok(Self::Stop),
            _ => Err(UnknownOperatorCommand(s.trim().to_string())),
        }
    }
}

/// Carry out `command` against `dispatcher`.
pub fn apply(dispatcher: &Dispatcher, command: OperatorCommand, shutdown: &CancellationToken) {
    match command {
        OperatorCommand::Pause => dispatcher.emergency_stop(),
        OperatorCommand::Resume => {
            dispatcher.set_global_disable(false);
            info!(target: "chatplays::control", "Operator resumed chat input");
        }
        OperatorCommand::Status => {
            info!(
                target: "chatplays::control",
                state = ?dispatcher.state(),
                feed = ?dispatcher.feed_state(),
                active = dispatcher.active_sequences(),
                stats = ?dispatcher.stats(),
                "Status"
            );
        }
        OperatorCommand::Stop => {
            dispatcher.emergency_stop();
            info!(target: "chatplays::control", "Operator requested shutdown");
            shutdown.cancel();
        }
    }
}

/// Apply console lines until `shutdown` fires or the line sender is gone.
pub async fn serve(
    dispatcher: Dispatcher,
    mut lines: mpsc::Receiver<String>,
    shutdown: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<OperatorCommand>() {
            Ok(command) => apply(&dispatcher, command, &shutdown),
            Err(e) => warn!(target: "chatplays::control", error = %e, "Ignoring console input"),
        }
    }
    debug!(target: "chatplays::control", "Operator console stopped");
}

/// Read operator commands from the terminal.
///
/// Lines are read on a detached thread, so a pending read never holds up
/// shutdown.
pub fn spawn_console(dispatcher: Dispatcher, shutdown: CancellationToken) -> JoinHandle<()> {
    let (tx, rx) = mpsc::channel(8);
    let reader = thread::Builder::new()
        .name("operator-console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    match reader {
        Ok(_) => info!(target: "chatplays::control", "Operator console ready (pause, resume, status, stop)"),
        Err(e) => warn!(target: "chatplays::control", error = %e, "Operator console unavailable"),
    }
    tokio::spawn(serve(dispatcher, rx, shutdown))
}

/// Pause on `SIGUSR1`, resume on `SIGUSR2`.
#[cfg(unix)]
pub fn spawn_signal_controls(
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut pause = signal(SignalKind::user_defined1())?;
    let mut resume = signal(SignalKind::user_defined2())?;
    info!(target: "chatplays::control", pid = std::process::id(), "SIGUSR1 pauses chat input, SIGUSR2 resumes it");

    Ok(tokio::spawn(async move {
        loop {
            let command = tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(()) = pause.recv() => OperatorCommand::Pause,
                Some(()) = resume.recv() => OperatorCommand::Resume,
                else => break,
            };
            apply(&dispatcher, command, &shutdown);
        }
    }))
}
