use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::keys::Key;

/// Current profile document version written by `save`.
pub const PROFILE_VERSION: u32 = 1;

/// A saved rule set.
///
/// This structure is the on-disk JSON form of a [`crate::rules::RuleSet`]:
/// - `version` of the document layout
/// - `commands`, each a set of chat aliases bound to an ordered action list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Profile {
    /// Document layout version.
    #[serde(default = "default_version")]
    pub version: u32,

    /// All commands, enabled or not.
    #[serde(default)]
    pub commands: Vec<CommandDef>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            version: PROFILE_VERSION,
            commands: Vec::new(),
        }
    }
}

fn default_version() -> u32 {
    PROFILE_VERSION
}

/// One command as written in a profile.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CommandDef {
    /// Stable identifier. Assigned on load when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Chat phrases that trigger this command. Matching is case-insensitive
    /// and ignores surrounding/repeated whitespace.
    pub aliases: Vec<String>,

    /// Actions executed in order when the command fires.
    pub actions: Vec<Action>,

    /// Disabled commands keep their aliases reserved but never fire.
    pub enabled: bool,
}

/// A primitive input action.
///
/// Durations are in milliseconds. A hold of `0` means the action has no
/// scheduled release: key presses stay down until a matching `key_release`
/// or the end of the sequence, clicks release immediately.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Press a key, optionally holding it for `hold_ms` before releasing.
    KeyPress {
        key: Key,
        #[serde(default)]
        hold_ms: u64,
    },

    /// Release a key previously pressed with a zero hold.
    KeyRelease { key: Key },

    /// Move the cursor, by an offset when `relative` or to absolute screen coordinates.
    MouseMove {
        x: i32,
        y: i32,
        #[serde(default)]
        relative: bool,
    },

    /// Click a mouse button, optionally at a position and held for `hold_ms`.
    MouseClick {
        button: MouseButton,
        #[serde(default)]
        hold_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Point>,
    },

    /// Press a mouse button without releasing it (drag start).
    MouseDown { button: MouseButton },

    /// Release a mouse button (drag end).
    MouseUp { button: MouseButton },

    /// Suspend the sequence without emitting input.
    Wait { ms: u64 },
}

impl Action {
    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::KeyPress { .. } => "key_press",
            Action::KeyRelease { .. } => "key_release",
            Action::MouseMove { .. } => "mouse_move",
            Action::MouseClick { .. } => "mouse_click",
            Action::MouseDown { .. } => "mouse_down",
            Action::MouseUp { .. } => "mouse_up",
            Action::Wait { .. } => "wait",
        }
    }

    /// Hold duration for press-and-hold actions, `None` when zero or not applicable.
    pub fn hold(&self) -> Option<Duration> {
        match self {
            Action::KeyPress { hold_ms, .. } | Action::MouseClick { hold_ms, .. }
                if *hold_ms > 0 =>
            {
                Some(Duration::from_millis(*hold_ms))
            }
            _ => None,
        }
    }
}

/// A screen position in pixels.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Mouse button enumeration.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}
