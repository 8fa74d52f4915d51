use async_trait::async_trait;
use enigo::Keyboard as _;
use enigo::Mouse as _;
use enigo::{Button as EButton, Coordinate, Direction, Enigo, Key as EKey, Settings};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, trace, warn};

use crate::config::{Key, MouseButton};
use crate::error::InjectError;

/// A single low-level input event, the unit the OS accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    MoveAbsolute { x: i32, y: i32 },
    MoveRelative { dx: i32, dy: i32 },
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
}

/// The host capability that turns [`InputEvent`]s into real input.
///
/// Implementations must be callable from many sequences at once; they are not
/// required to order events from different callers.
#[async_trait]
pub trait InputInjector: Send + Sync {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Deliver one event, returning once the OS has accepted or refused it.
    async fn inject(&self, event: InputEvent) -> Result<(), InjectError>;
}

/// Logs every event instead of simulating input.
#[derive(Debug, Default, Clone)]
pub struct DryRunInjector;

#[async_trait]
impl InputInjector for DryRunInjector {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn inject(&self, event: InputEvent) -> Result<(), InjectError> {
        info!(target: "chatplays::injector", ?event, "DRY-RUN inject");
        Ok(())
    }
}

struct Request {
    event: InputEvent,
    reply: oneshot::Sender<Result<(), InjectError>>,
}

/// Injects events through Enigo.
///
/// Enigo handles are not shareable across threads on every platform, so one
/// dedicated OS thread owns the handle and drains a request queue; callers
/// await the reply. The handle is created lazily on the first event, so a
/// missing display only fails the actions that need it.
pub struct EnigoInjector {
    requests: mpsc::UnboundedSender<Request>,
}

impl EnigoInjector {
    /// Start the injector thread.
    pub fn spawn() -> Result<Self, InjectError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
        thread::Builder::new()
            .name("enigo-injector".into())
            .spawn(move || {
                let mut device = EnigoDevice::default();
                while let Some(request) = rx.blocking_recv() {
                    let result = device.apply(request.event);
                    // The caller may have gone away; nothing to report to.
                    let _ = request.reply.send(result);
                }
                trace!(target: "chatplays::injector", "injector thread exiting");
            })
            .map_err(|e| InjectError::Unavailable(format!("failed to start injector thread: {e}")))?;
        Ok(Self { requests: tx })
    }
}

#[async_trait]
impl InputInjector for EnigoInjector {
    fn name(&self) -> &'static str {
        "enigo"
    }

    async fn inject(&self, event: InputEvent) -> Result<(), InjectError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { event, reply })
            .map_err(|_| InjectError::Unavailable("injector thread stopped".into()))?;
        response
            .await
            .map_err(|_| InjectError::Unavailable("injector thread dropped the request".into()))?
    }
}

#[derive(Default)]
struct EnigoDevice {
    enigo: Option<Enigo>,
}

impl EnigoDevice {
    fn apply(&mut self, event: InputEvent) -> Result<(), InjectError> {
        let enigo = self.ensure_enigo()?;
        trace!(target: "chatplays::injector", ?event, "inject");
        let result = match event {
            InputEvent::KeyDown(key) => enigo.key(map_key(key), Direction::Press),
            InputEvent::KeyUp(key) => enigo.key(map_key(key), Direction::Release),
            InputEvent::MoveAbsolute { x, y } => enigo.move_mouse(x, y, Coordinate::Abs),
            InputEvent::MoveRelative { dx, dy } => enigo.move_mouse(dx, dy, Coordinate::Rel),
            InputEvent::ButtonDown(button) => {
                enigo.button(map_mouse_button(button), Direction::Press)
            }
            InputEvent::ButtonUp(button) => {
                enigo.button(map_mouse_button(button), Direction::Release)
            }
        };
        result.map_err(|e| {
            warn!(target: "chatplays::injector", ?event, error = %e, "event rejected");
            InjectError::Rejected(e.to_string())
        })
    }

    fn ensure_enigo(&mut self) -> Result<&mut Enigo, InjectError> {
        if self.enigo.is_none() {
            trace!(target: "chatplays::injector", "Initializing Enigo");
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| InjectError::Unavailable(format!("failed to initialize Enigo: {e}")))?;
            self.enigo = Some(enigo);
        }
        self.enigo
            .as_mut()
            .ok_or_else(|| InjectError::Unavailable("Enigo handle missing".into()))
    }
}

/// Numpad digits are sent as their character keys; not every platform
/// exposes dedicated numpad keys.
fn map_key(key: Key) -> EKey {
    match key {
        Key::Char(c) => EKey::Unicode(c),
        Key::Space => EKey::Space,
        Key::Enter => EKey::Return,
        Key::Escape => EKey::Escape,
        Key::Tab => EKey::Tab,
        Key::Backspace => EKey::Backspace,
        Key::CapsLock => EKey::CapsLock,
        Key::Delete => EKey::Delete,
        Key::LShift | Key::RShift => EKey::Shift,
        Key::LCtrl => EKey::Control,
        Key::LAlt => EKey::Alt,
        Key::Up => EKey::UpArrow,
        Key::Down => EKey::DownArrow,
        Key::Left => EKey::LeftArrow,
        Key::Right => EKey::RightArrow,
        Key::F(n) => function_key(n),
        Key::Numpad(n) => EKey::Unicode(char::from(b'0' + n.min(9))),
    }
}

fn function_key(n: u8) -> EKey {
    match n {
        1 => EKey::F1,
        2 => EKey::F2,
        3 => EKey::F3,
        4 => EKey::F4,
        5 => EKey::F5,
        6 => EKey::F6,
        7 => EKey::F7,
        8 => EKey::F8,
        9 => EKey::F9,
        10 => EKey::F10,
        11 => EKey::F11,
        _ => EKey::F12,
    }
}

fn map_mouse_button(btn: MouseButton) -> EButton {
    match btn {
        MouseButton::Left => EButton::Left,
        MouseButton::Middle => EButton::Middle,
        MouseButton::Right => EButton::Right,
    }
}
