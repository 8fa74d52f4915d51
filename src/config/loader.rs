use schemars::{Schema, schema_for};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use super::models::{PROFILE_VERSION, Profile};
use crate::error::{LoadError, SaveError};
use crate::matching::normalize;

/// Parse and validate a profile from a JSON string.
pub fn parse_profile(s: &str) -> Result<Profile, LoadError> {
    let profile: Profile = serde_json::from_str(s).map_err(|e| LoadError::malformed(e.to_string()))?;
    validate_profile(&profile)?;
    Ok(profile)
}

/// Read a profile from a file path asynchronously (Tokio).
pub async fn read_profile<P: AsRef<Path>>(path: P) -> Result<Profile, LoadError> {
    let path_ref = path.as_ref();
    let text = tokio::fs::read_to_string(path_ref)
        .await
        .map_err(|source| LoadError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;
    let profile = parse_profile(&text)?;
    debug!(
        target: "chatplays::profile",
        path = %path_ref.display(),
        commands = profile.commands.len(),
        "Loaded profile"
    );
    Ok(profile)
}

/// Write a profile as pretty JSON to a file path asynchronously (Tokio).
///
/// The document goes to a sibling temporary file first and is then renamed
/// over the target, so readers never see a half-written profile.
pub async fn write_profile<P: AsRef<Path>>(path: P, profile: &Profile) -> Result<(), SaveError> {
    let path_ref = path.as_ref();
    let json = serde_json::to_string_pretty(profile)?;
    let io_err = |source| SaveError::Io {
        path: path_ref.to_path_buf(),
        source,
    };

    let tmp = path_ref.with_extension("json.tmp");
    tokio::fs::write(&tmp, json.as_bytes()).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path_ref).await.map_err(io_err)?;
    debug!(
        target: "chatplays::profile",
        path = %path_ref.display(),
        commands = profile.commands.len(),
        "Saved profile"
    );
    Ok(())
}

/// Generate the JSON Schema for the profile document.
pub fn generate_schema() -> Schema {
    schema_for!(Profile)
}

/// Write the JSON Schema for the profile document to any writer (pretty-printed).
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> anyhow::Result<()> {
    use anyhow::Context;

    let schema = generate_schema();
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// Structural checks serde cannot express.
/// - The document version must be one this build understands.
/// - Enabled commands need at least one non-blank alias.
/// - Explicit command ids must be unique and below `u64::MAX`, which stays
///   free so allocation always has a successor to move to.
pub fn validate_profile(profile: &Profile) -> Result<(), LoadError> {
    if profile.version > PROFILE_VERSION {
        return Err(LoadError::malformed(format!(
            "unsupported profile version {} (newest known is {})",
            profile.version, PROFILE_VERSION
        )));
    }

    let mut ids = BTreeSet::new();
    for (idx, command) in profile.commands.iter().enumerate() {
        if let Some(id) = command.id {
            if id == u64::MAX {
                return Err(LoadError::malformed(format!(
                    "command at index {idx} uses reserved id {id}"
                )));
            }
            if !ids.insert(id) {
                return Err(LoadError::malformed(format!(
                    "command at index {idx} reuses id {id}"
                )));
            }
        }

        let has_alias = command.aliases.iter().any(|a| !normalize(a).is_empty());
        if command.enabled && !has_alias {
            return Err(LoadError::malformed(format!(
                "enabled command at index {idx} has no aliases"
            )));
        }
    }
    Ok(())
}
