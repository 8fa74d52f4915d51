//! Profile configuration for chatplays.
//!
//! This module wires together the profile data models, the key vocabulary and
//! the loading/validation helpers. Import from here for a convenient, stable API.
//!
//! Example:
//! use chatplays::config::{Profile, read_profile};
//!
//! let profile = read_profile("profiles/platformer.json").await?;

pub mod keys;
pub mod loader;
pub mod models;

// Re-export core data models
pub use keys::{Key, NAMED_KEYS, UnknownKey};
pub use models::{Action, CommandDef, MouseButton, PROFILE_VERSION, Point, Profile};

// Re-export loader utilities
pub use loader::{
    generate_schema, parse_profile, read_profile, validate_profile, write_profile,
    write_schema_to_writer,
};
