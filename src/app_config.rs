//! Configuration file and runtime settings for the CLI.
//!
//! The optional file lives at `$XDG_CONFIG_HOME/bookshelf/config.toml` and uses
//! plain `key = value` lines. Precedence for every setting is CLI flag, then
//! environment, then file, then built-in default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bookshelf_core::StoragePaths;
use bookshelf_core::download::FetchTimeouts;

use crate::cli::Args;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "BOOKSHELF_DATA_DIR";

/// File name of the library database inside the data directory.
pub const DATABASE_FILE: &str = "library.db";

/// Values read from the config file; all optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    /// Data directory for the database and book files.
    pub data_dir: Option<PathBuf>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Idle transfer timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Total transfer timeout in seconds.
    pub resource_timeout_secs: Option<u64>,
    /// Default verbosity when no flag is given.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates values against the ranges the CLI accepts.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("request_timeout_secs", self.request_timeout_secs)?;
        validate_timeout_secs("resource_timeout_secs", self.resource_timeout_secs)?;

        if let (Some(request), Some(resource)) =
            (self.request_timeout_secs, self.resource_timeout_secs)
            && resource < request
        {
            bail!(
                "Invalid config: `resource_timeout_secs` ({resource}) must not be shorter than `request_timeout_secs` ({request})"
            );
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Tracing filter level for this setting.
    #[must_use]
    pub fn level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Settings after merging flags, environment, file and defaults.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Storage layout rooted at the data directory.
    pub storage: StoragePaths,
    /// Path of the library database.
    pub database_path: PathBuf,
    /// Timeouts for the HTTP client.
    pub timeouts: FetchTimeouts,
    /// Default tracing level before `RUST_LOG` is applied.
    pub log_level: &'static str,
    /// Whether progress output is suppressed.
    pub quiet: bool,
}

impl RuntimeSettings {
    /// Merges CLI flags, `BOOKSHELF_DATA_DIR`, and the file config.
    pub fn resolve(args: &Args, file: Option<&FileConfig>) -> Result<Self> {
        let env_dir = env_var_non_empty_os(DATA_DIR_ENV).map(PathBuf::from);
        Self::resolve_with_env(args, file, env_dir)
    }

    fn resolve_with_env(
        args: &Args,
        file: Option<&FileConfig>,
        env_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let file_dir = file.and_then(|cfg| cfg.data_dir.clone());
        let storage = match args.data_dir.clone().or(env_dir).or(file_dir) {
            Some(dir) => StoragePaths::new(dir),
            None => StoragePaths::default_location()
                .context("Could not determine a data directory; pass --data-dir")?,
        };
        let database_path = storage.base_dir().join(DATABASE_FILE);

        let defaults = FetchTimeouts::default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map_or(fallback, Duration::from_secs)
        };
        let timeouts = FetchTimeouts {
            connect: secs(file.and_then(|c| c.connect_timeout_secs), defaults.connect),
            request: secs(file.and_then(|c| c.request_timeout_secs), defaults.request),
            resource: secs(file.and_then(|c| c.resource_timeout_secs), defaults.resource),
        };

        let file_verbosity = file.and_then(|c| c.verbosity);
        let log_level = if args.quiet {
            VerbositySetting::Quiet.level()
        } else {
            match args.verbose {
                0 => file_verbosity.unwrap_or(VerbositySetting::Default).level(),
                1 => VerbositySetting::Verbose.level(),
                _ => VerbositySetting::Debug.level(),
            }
        };
        let quiet = args.quiet
            || (args.verbose == 0 && file_verbosity == Some(VerbositySetting::Quiet));

        Ok(Self {
            storage,
            database_path,
            timeouts,
            log_level,
            quiet,
        })
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bookshelf/config.toml`
/// 2. `$HOME/.config/bookshelf/config.toml`
/// 3. the platform config directory
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    let base = env_var_non_empty_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env_var_non_empty_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .or_else(dirs::config_dir)?;
    Some(base.join("bookshelf").join("config.toml"))
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file from the default path, if one exists.
pub fn load_default_file_config() -> Result<Option<FileConfig>> {
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "data_dir" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `data_dir` value on line {line_no}"))?;
                cfg.data_dir = Some(PathBuf::from(parsed));
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `connect_timeout_secs` value on line {line_no}")
                })?);
            }
            "request_timeout_secs" => {
                cfg.request_timeout_secs = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `request_timeout_secs` value on line {line_no}")
                })?);
            }
            "resource_timeout_secs" => {
                cfg.resource_timeout_secs = Some(parse_integer_u64(value).with_context(|| {
                    format!("Invalid `resource_timeout_secs` value on line {line_no}")
                })?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `verbosity` value on line {line_no}"))?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    if token.starts_with('-') {
        bail!("Expected non-negative integer");
    }
    Ok(token.parse::<u64>()?)
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
