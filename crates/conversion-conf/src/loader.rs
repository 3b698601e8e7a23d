//! Config file discovery, table merging, and environment variable overlay.

use crate::ConfigError;
use midi_analysis::{RhythmFamily, RhythmRule};
use music_understand::ConversionOptions;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

const ENV_PREFIX: &str = "MIDI_TRANSFORM_";

/// Information about where option values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode option values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with an explicit path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/midi-transform/options.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("midi-transform/options.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("midi-transform.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read one config file as a raw table.
pub fn load_from_file(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply `MIDI_TRANSFORM_*` environment variables to `options`.
pub fn apply_env_overrides(options: &mut ConversionOptions, sources: &mut ConfigSources) {
    apply_overrides_from(options, sources, |name| env::var(name).ok());
}

fn parse_into<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    suffix: &str,
    sources: &mut ConfigSources,
) -> Option<T> {
    let name = format!("{ENV_PREFIX}{suffix}");
    let raw = lookup(&name)?;
    match raw.trim().parse() {
        Ok(value) => {
            sources.env_overrides.push(name);
            Some(value)
        }
        Err(_) => {
            warn!(var = %name, value = %raw, "ignoring unparseable override");
            None
        }
    }
}

/// "off" switches the grid off; anything else becomes its smallest note
/// value, with the family read from the suffix.
fn grid_override(rule: &mut RhythmRule, value: &str) {
    let value = value.trim();
    if value.eq_ignore_ascii_case("off") {
        rule.enabled = false;
        return;
    }
    rule.enabled = true;
    rule.family = RhythmFamily::of_note_value(value);
    rule.min_note_value = value.to_string();
}

/// Apply overrides read through `lookup`, which maps a variable name to
/// its value. Values that fail to parse are skipped with a warning.
pub fn apply_overrides_from(
    options: &mut ConversionOptions,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = parse_into(&lookup, "TRANSPOSITION", sources) {
        options.transposition = v;
    }
    if let Some(v) = parse_into(&lookup, "TIME_SCALE", sources) {
        options.note_time_scale = v;
    }
    if let Some(v) = parse_into(&lookup, "TEMPO", sources) {
        options.tempo = v;
    }
    if let Some(v) = parse_into(&lookup, "KEY_SPELLING", sources) {
        options.key_spelling = v;
    }
    if let Some(v) = parse_into(&lookup, "STRICT_MONOPHONY", sources) {
        options.voice_separation.strict_monophony = v;
    }
    if let Some(v) = parse_into(&lookup, "DETECT_ORNAMENTS", sources) {
        options.detect_ornaments = v;
    }

    // Grids are checked later by validate(), like file values
    for (suffix, rule) in [
        ("PRIMARY_GRID", &mut options.primary_rhythm),
        ("SECONDARY_GRID", &mut options.secondary_rhythm),
    ] {
        let name = format!("{ENV_PREFIX}{suffix}");
        if let Some(value) = lookup(&name) {
            grid_override(rule, &value);
            sources.env_overrides.push(name);
        }
    }
}
