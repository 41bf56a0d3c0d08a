// Configuration loading and parsing (engine.toml).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use seedline_core::anchors::{is_band_boundary, MAX_BRACKET_SIZE};
use seedline_core::ScoringRules;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// engine.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub database: DatabaseSettings,
    pub snapshots: SnapshotRetention,
    pub seeding: SeedingConfig,
    pub scoring: ScoringRules,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Empty resolves to the platform data directory;
    /// `":memory:"` opens an ephemeral database.
    #[serde(default)]
    pub path: String,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: ":memory:".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseSettings {
    /// The database location, with an empty path resolved to
    /// `<data dir>/seedline.db`.
    pub fn resolved_path(&self) -> Result<PathBuf, ConfigError> {
        if !self.path.is_empty() {
            return Ok(PathBuf::from(&self.path));
        }
        let dirs = ProjectDirs::from("", "", "seedline").ok_or_else(|| {
            ConfigError::ValidationError {
                field: "database.path".into(),
                message: "empty and no home directory to derive a default from".into(),
            }
        })?;
        Ok(dirs.data_dir().join("seedline.db"))
    }
}

/// Snapshot caps per tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SnapshotRetention {
    pub max_count: usize,
    pub max_total_bytes: usize,
}

impl Default for SnapshotRetention {
    fn default() -> Self {
        SnapshotRetention {
            max_count: 50,
            max_total_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SeedFallback {
    pub max_draw: u32,
    pub seeds: u32,
}

/// Seed counts for tournaments that do not set their own.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedingConfig {
    #[serde(default)]
    pub fallback: Vec<SeedFallback>,
    pub default_seeds: u32,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        SeedingConfig {
            fallback: vec![
                SeedFallback { max_draw: 16, seeds: 4 },
                SeedFallback { max_draw: 32, seeds: 8 },
                SeedFallback { max_draw: 64, seeds: 16 },
            ],
            default_seeds: 32,
        }
    }
}

impl SeedingConfig {
    pub fn seeds_for_draw(&self, draw_size: u32) -> u32 {
        self.fallback
            .iter()
            .find(|row| draw_size <= row.max_draw)
            .map_or(self.default_seeds, |row| row.seeds)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/engine.toml` relative to `base_dir`.
///
/// This does not copy defaults; see [`load_config_at`].
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("engine.toml");
    let text = read_file(&path)?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;

    Ok(config)
}

/// Copy every file of `defaults/` that `config/` is missing and return the
/// copied paths. `.example` files stay behind and existing files are never
/// overwritten. A base with only `config/` is accepted as is.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        return if config_dir.is_dir() {
            Ok(vec![])
        } else {
            Err(copy_error(format!(
                "no defaults/ or config/ directory under {}",
                base_dir.display()
            )))
        };
    }
    fs::create_dir_all(&config_dir)
        .map_err(|e| copy_error(format!("creating {}: {e}", config_dir.display())))?;

    let mut copied = Vec::new();
    for source in default_files(&defaults_dir)? {
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = config_dir.join(name);
        if install_default(&source, &target)? {
            debug!(path = %target.display(), "default config installed");
            copied.push(target);
        }
    }
    copied.sort();
    Ok(copied)
}

/// Prepare `base_dir` and load its engine config.
pub fn load_config_at(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn copy_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// Regular files of `dir`, minus `.example` templates.
fn default_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let listing =
        fs::read_dir(dir).map_err(|e| copy_error(format!("reading {}: {e}", dir.display())))?;
    let mut files = Vec::new();
    for item in listing {
        let path = item
            .map_err(|e| copy_error(format!("reading {}: {e}", dir.display())))?
            .path();
        let is_example = path.extension().is_some_and(|ext| ext == "example");
        if path.is_file() && !is_example {
            files.push(path);
        }
    }
    Ok(files)
}

/// Write `source` to `target` unless `target` already exists. Returns
/// whether anything was written.
fn install_default(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    let mut dest = match fs::OpenOptions::new().write(true).create_new(true).open(target) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(copy_error(format!("creating {}: {e}", target.display()))),
    };
    let content =
        fs::read(source).map_err(|e| copy_error(format!("reading {}: {e}", source.display())))?;
    dest.write_all(&content)
        .map_err(|e| copy_error(format!("writing {}: {e}", target.display())))?;
    Ok(true)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.busy_timeout_ms == 0 {
        return Err(invalid("database.busy_timeout_ms", "must be greater than 0"));
    }

    if config.snapshots.max_count == 0 {
        return Err(invalid("snapshots.max_count", "must be greater than 0"));
    }
    if config.snapshots.max_total_bytes == 0 {
        return Err(invalid("snapshots.max_total_bytes", "must be greater than 0"));
    }

    let seeding = &config.seeding;
    for (i, row) in seeding.fallback.iter().enumerate() {
        let field = format!("seeding.fallback[{i}]");
        if !is_band_boundary(row.seeds as usize) {
            return Err(invalid(
                &field,
                format!("seeds must be 0 or a power of two, got {}", row.seeds),
            ));
        }
        if row.seeds > row.max_draw {
            return Err(invalid(
                &field,
                format!("{} seeds cannot fit a draw of {}", row.seeds, row.max_draw),
            ));
        }
        if i > 0 && seeding.fallback[i - 1].max_draw >= row.max_draw {
            return Err(invalid(&field, "max_draw must be strictly increasing"));
        }
    }
    if !is_band_boundary(seeding.default_seeds as usize) || seeding.default_seeds > MAX_BRACKET_SIZE {
        return Err(invalid(
            "seeding.default_seeds",
            format!("must be a power of two up to {MAX_BRACKET_SIZE}, got {}", seeding.default_seeds),
        ));
    }

    config
        .scoring
        .validate()
        .map_err(|e| invalid("scoring", e.to_string()))?;

    Ok(())
}
