use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};

/// A keyboard key a command can press or release.
///
/// Keys are written in profiles as strings: any single printable character
/// (`"w"`, `"1"`, `"["`) or one of the named keys listed in [`NAMED_KEYS`].
/// Parsing is case-insensitive; single letters are stored lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    /// A printable character key.
    Char(char),
    Space,
    Enter,
    Escape,
    Tab,
    Backspace,
    CapsLock,
    Delete,
    LShift,
    RShift,
    LCtrl,
    LAlt,
    Up,
    Down,
    Left,
    Right,
    /// Function key `F1..=F12`.
    F(u8),
    /// Numpad digit `N0..=N9`.
    Numpad(u8),
}

/// Named keys and their canonical profile spelling.
pub const NAMED_KEYS: &[(&str, Key)] = &[
    ("SPACE", Key::Space),
    ("ENTER", Key::Enter),
    ("ESC", Key::Escape),
    ("TAB", Key::Tab),
    ("BKSP", Key::Backspace),
    ("CAPS", Key::CapsLock),
    ("DEL", Key::Delete),
    ("LSHIFT", Key::LShift),
    ("RSHIFT", Key::RShift),
    ("LCTRL", Key::LCtrl),
    ("LALT", Key::LAlt),
    ("UP", Key::Up),
    ("DOWN", Key::Down),
    ("LEFT", Key::Left),
    ("RIGHT", Key::Right),
];

/// Returned when a key name is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key name '{0}'")]
pub struct UnknownKey(pub String);

impl FromStr for Key {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (None, _) => return Err(UnknownKey(s.to_string())),
            (Some(c), None) if !c.is_control() => {
                return Ok(Key::Char(c.to_lowercase().next().unwrap_or(c)));
            }
            _ => {}
        }

        let upper = raw.to_ascii_uppercase();
        if let Some((_, key)) = NAMED_KEYS.iter().find(|(name, _)| *name == upper) {
            return Ok(*key);
        }
        let function = upper
            .strip_prefix('F')
            .and_then(|d| d.parse::<u8>().ok())
            .filter(|n| (1..=12).contains(n));
        if let Some(n) = function {
            return Ok(Key::F(n));
        }
        let numpad = upper
            .strip_prefix('N')
            .filter(|d| d.len() == 1)
            .and_then(|d| d.parse::<u8>().ok());
        if let Some(n) = numpad {
            return Ok(Key::Numpad(n));
        }
        Err(UnknownKey(s.to_string()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::F(n) => write!(f, "F{n}"),
            Key::Numpad(n) => write!(f, "N{n}"),
            named => {
                let name = NAMED_KEYS
                    .iter()
                    .find(|(_, key)| key == named)
                    .map_or("?", |(name, _)| *name);
                f.write_str(name)
            }
        }
    }
}

impl TryFrom<String> for Key {
    type Error = UnknownKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl JsonSchema for Key {
    fn schema_name() -> Cow<'static, str> {
        "Key".into()
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "string",
            "minLength": 1,
            "description": "A single printable character, or one of SPACE ENTER ESC TAB BKSP CAPS DEL LSHIFT RSHIFT LCTRL LALT UP DOWN LEFT RIGHT F1-F12 N0-N9"
        })
    }
}
