use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::Action;
use crate::error::{InjectError, InjectionError};
use crate::executor::injector::{InputEvent, InputInjector};

/// Runs action sequences against an [`InputInjector`].
///
/// Each call to [`ActionSequencer::run`] is strictly serial: an action's
/// injection completes before the next action starts. Separate runs may be
/// in flight at the same time; the sequencer is a cheap clonable handle.
#[derive(Clone)]
pub struct ActionSequencer {
    injector: Arc<dyn InputInjector>,
}

impl ActionSequencer {
    pub fn new(injector: Arc<dyn InputInjector>) -> Self {
        Self { injector }
    }

    /// Name of the underlying injector.
    pub fn injector_name(&self) -> &'static str {
        self.injector.name()
    }

    /// Execute `actions` in order.
    ///
    /// - `wait` suspends without emitting input.
    /// - A press or click with a nonzero hold emits the press, suspends for the
    ///   hold, then emits the release before moving on.
    /// - A key press with a zero hold (and a bare `mouse_down`) stays down until
    ///   a matching release or the end of the sequence, whichever comes first;
    ///   a click with a zero hold releases immediately.
    ///
    /// The first injection failure stops the sequence. Already issued input is
    /// not undone, and nothing still held is released. A failed end-of-sequence
    /// release is reported against the action that pressed the input.
    pub async fn run(&self, actions: &[Action]) -> Result<(), InjectionError> {
        trace!(
            target: "chatplays::sequencer",
            injector = self.injector.name(),
            actions = actions.len(),
            "Starting sequence"
        );
        let mut held = Vec::new();
        for (index, action) in actions.iter().enumerate() {
            trace!(target: "chatplays::sequencer", index, kind = action.kind(), "Executing action");
            self.execute(index, action, &mut held)
                .await
                .map_err(|source| InjectionError {
                    index,
                    action: action.kind(),
                    source,
                })?;
        }

        // Release leftovers, most recent first.
        while let Some(Held { release, pressed_at }) = held.pop() {
            trace!(target: "chatplays::sequencer", ?release, pressed_at, "Releasing input held past the end of the sequence");
            self.emit(release)
                .await
                .map_err(|source| InjectionError {
                    index: pressed_at,
                    action: actions.get(pressed_at).map_or("release", Action::kind),
                    source,
                })?;
        }
        debug!(target: "chatplays::sequencer", actions = actions.len(), "Sequence completed");
        Ok(())
    }

    async fn execute(
        &self,
        index: usize,
        action: &Action,
        held: &mut Vec<Held>,
    ) -> Result<(), InjectError> {
        match *action {
            Action::KeyPress { key, .. } => {
                self.emit(InputEvent::KeyDown(key)).await?;
                let release = InputEvent::KeyUp(key);
                match action.hold() {
                    Some(hold) => {
                        forget(held, release);
                        self.hold_then(hold, release).await
                    }
                    None => {
                        remember(held, release, index);
                        Ok(())
                    }
                }
            }
            Action::KeyRelease { key } => {
                let release = InputEvent::KeyUp(key);
                forget(held, release);
                self.emit(release).await
            }

            Action::MouseMove { x, y, relative } => {
                let event = if relative {
                    InputEvent::MoveRelative { dx: x, dy: y }
                } else {
                    InputEvent::MoveAbsolute { x, y }
                };
                self.emit(event).await
            }
            Action::MouseClick {
                button, position, ..
            } => {
                if let Some(p) = position {
                    self.emit(InputEvent::MoveAbsolute { x: p.x, y: p.y }).await?;
                }
                let release = InputEvent::ButtonUp(button);
                forget(held, release);
                self.emit(InputEvent::ButtonDown(button)).await?;
                match action.hold() {
                    Some(hold) => self.hold_then(hold, release).await,
                    None => self.emit(release).await,
                }
            }
            Action::MouseDown { button } => {
                self.emit(InputEvent::ButtonDown(button)).await?;
                remember(held, InputEvent::ButtonUp(button), index);
                Ok(())
            }
            Action::MouseUp { button } => {
                let release = InputEvent::ButtonUp(button);
                forget(held, release);
                self.emit(release).await
            }

            Action::Wait { ms } => {
                sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
        }
    }

    async fn hold_then(&self, hold: Duration, release: InputEvent) -> Result<(), InjectError> {
        sleep(hold).await;
        self.emit(release).await
    }

    async fn emit(&self, event: InputEvent) -> Result<(), InjectError> {
        self.injector.inject(event).await
    }
}

/// Input still down, with the release that ends it and the index of the
/// action that pressed it.
struct Held {
    release: InputEvent,
    pressed_at: usize,
}

fn remember(held: &mut Vec<Held>, release: InputEvent, pressed_at: usize) {
    if !held.iter().any(|h| h.release == release) {
        held.push(Held {
            release,
            pressed_at,
        });
    }
}

fn forget(held: &mut Vec<Held>, release: InputEvent) {
    held.retain(|h| h.release != release);
}
