//! Conversion options from files and the environment.
//!
//! `ConversionOptions` is an explicit value handed to every pipeline call.
//! This crate only builds one: compiled defaults, then any config files,
//! then environment variables.
//!
//! # Usage
//!
//! ```rust,no_run
//! let options = conversion_conf::load_and_validate(None)?;
//! println!("transposing by {}", options.transposition);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/midi-transform/options.toml` (system)
//! 2. `~/.config/midi-transform/options.toml` (user)
//! 3. An explicit path, or `./midi-transform.toml` (local override)
//! 4. Environment variables (`MIDI_TRANSFORM_*`)
//!
//! Tables merge key by key, so a file only needs the values it changes.
//!
//! # Example Config
//!
//! ```toml
//! transposition = -2
//! detect_ornaments = true
//!
//! [primary_rhythm]
//! min_note_value = "1/8"
//!
//! [voice_separation]
//! strict_monophony = true
//! ```

pub mod loader;

pub use loader::{
    apply_env_overrides, apply_overrides_from, discover_config_files,
    discover_config_files_with_override, load_from_file, merge_tables, ConfigSources,
};

use std::path::{Path, PathBuf};

use anyhow::Context;
use music_understand::ConversionOptions;
use thiserror::Error;
use tracing::debug;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to encode options: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Invalid options: {0}")]
    Invalid(#[from] midi_analysis::Error),
}

/// Load options from all sources.
pub fn load() -> Result<ConversionOptions, ConfigError> {
    let (options, _sources) = load_with_sources_from(None)?;
    Ok(options)
}

/// Load options with `config_path` standing in for the local override.
///
/// System and user files still load first.
pub fn load_from(config_path: Option<&Path>) -> Result<ConversionOptions, ConfigError> {
    let (options, _sources) = load_with_sources_from(config_path)?;
    Ok(options)
}

/// Load options and report where the values came from.
pub fn load_with_sources_from(
    config_path: Option<&Path>,
) -> Result<(ConversionOptions, ConfigSources), ConfigError> {
    let files = discover_config_files_with_override(config_path);
    load_files(&files)
}

/// Merge the given files over the defaults, then apply the environment.
pub fn load_files(files: &[PathBuf]) -> Result<(ConversionOptions, ConfigSources), ConfigError> {
    let mut sources = ConfigSources::default();
    let mut merged = default_table()?;

    for path in files {
        let table = load_from_file(path)?;
        merge_tables(&mut merged, table);
        sources.files.push(path.clone());
    }

    let mut options: ConversionOptions =
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: files.last().cloned().unwrap_or_default(),
                message: e.to_string(),
            })?;

    apply_env_overrides(&mut options, &mut sources);
    debug!(
        files = sources.files.len(),
        env_overrides = sources.env_overrides.len(),
        "conversion options loaded"
    );

    Ok((options, sources))
}

/// Load, then reject options the pipeline cannot honor.
pub fn load_and_validate(config_path: Option<&Path>) -> anyhow::Result<ConversionOptions> {
    let (options, sources) =
        load_with_sources_from(config_path).context("loading conversion options")?;
    options.validate().with_context(|| {
        format!(
            "validating conversion options from {} file(s) and {:?}",
            sources.files.len(),
            sources.env_overrides
        )
    })?;
    Ok(options)
}

/// Render options as a config file that loads back to the same value.
pub fn to_toml(options: &ConversionOptions) -> Result<String, ConfigError> {
    let mut output = String::from("# midi-transform conversion options\n\n");
    output.push_str(&toml::to_string_pretty(options)?);
    Ok(output)
}

fn default_table() -> Result<toml::Table, ConfigError> {
    match toml::Value::try_from(ConversionOptions::default())? {
        toml::Value::Table(table) => Ok(table),
        _ => Ok(toml::Table::new()),
    }
}
