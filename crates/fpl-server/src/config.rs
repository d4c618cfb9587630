// Configuration loading and parsing (server.toml plus PORT / CACHE_TTL overrides).

use fpl_core::scoring::CaptainMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

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
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub planner: PlannerConfig,
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire server.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    server: ServerConfig,
    upstream: UpstreamConfig,
    planner: PlannerSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct PlannerSection {
    default_mode: String,
    hit_allowance: i64,
    min_transfer_gain: f64,
    template_threshold: f64,
}

/// Planner defaults applied by the routes.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    pub default_mode: CaptainMode,
    /// Tenths of a million added to the bank when a hit is allowed.
    pub hit_allowance: i64,
    pub min_transfer_gain: f64,
    pub template_threshold: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            default_mode: CaptainMode::Safe,
            hit_allowance: fpl_core::transfers::HIT_ALLOWANCE,
            min_transfer_gain: 0.5,
            template_threshold: fpl_core::analysis::DEFAULT_TEMPLATE_THRESHOLD,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/server.toml` relative to `base_dir`, without
/// environment overrides and without copying defaults.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    load_config_with(base_dir, |_| None)
}

/// Load `config/server.toml`, apply `PORT` and `CACHE_TTL` from `lookup`,
/// then validate.
pub fn load_config_with<F>(base_dir: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = base_dir.join("config").join(SERVER_FILE);
    let text = read_file(&path)?;
    let file: ServerFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let mut server = file.server;
    let mut upstream = file.upstream;

    if let Some(port) = lookup("PORT") {
        server.port = parse_override("PORT", &port)?;
    }
    if let Some(ttl) = lookup("CACHE_TTL") {
        upstream.cache_ttl_secs = parse_override("CACHE_TTL", &ttl)?;
    }

    let default_mode =
        CaptainMode::from_str_mode(&file.planner.default_mode).ok_or_else(|| ConfigError::ValidationError {
            field: "planner.default_mode".into(),
            message: format!("must be `safe` or `aggressive`, got `{}`", file.planner.default_mode),
        })?;

    let config = Config {
        server,
        upstream,
        planner: PlannerConfig {
            default_mode,
            hit_allowance: file.planner.hit_allowance,
            min_transfer_gain: file.planner.min_transfer_gain,
            template_threshold: file.planner.template_threshold,
        },
    };

    validate(&config)?;

    Ok(config)
}

const SERVER_FILE: &str = "server.toml";

/// Seed `config/server.toml` from `defaults/server.toml` on first start.
/// Returns the written path, or `None` when a config file is already there.
pub fn ensure_server_config(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(SERVER_FILE);
    if target.exists() {
        return Ok(None);
    }
    let source = base_dir.join("defaults").join(SERVER_FILE);
    let copy_err = |what: &str, path: &Path, e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to {what} {}: {e}", path.display()),
    };

    let mut defaults = std::fs::File::open(&source).map_err(|e| copy_err("open", &source, e))?;
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(|e| copy_err("create", dir, e))?;
    }
    // create_new: a concurrent start that already wrote the file wins.
    let mut dest = match std::fs::OpenOptions::new().write(true).create_new(true).open(&target) {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(copy_err("create", &target, e)),
    };
    std::io::copy(&mut defaults, &mut dest).map_err(|e| copy_err("write", &target, e))?;
    Ok(Some(target))
}

/// Loads config relative to the working directory, or the crate directory
/// when the working directory has neither `defaults/` nor `config/`.
/// Copies defaults first and applies environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    let base = if cwd.join("defaults").exists() || cwd.join("config").exists() {
        cwd
    } else {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    };
    if let Some(path) = ensure_server_config(&base)? {
        tracing::info!(path = %path.display(), "wrote default config");
    }
    load_config_with(&base, |key| std::env::var(key).ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn parse_override<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::ValidationError {
        field: name.to_string(),
        message: format!("not a valid number: `{raw}`"),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    let upstream = &config.upstream;
    if upstream.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "upstream.base_url".into(),
            message: "must not be empty".into(),
        });
    }
    if upstream.timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "upstream.timeout_secs".into(),
            message: "must be greater than 0".into(),
        });
    }
    if upstream.cache_max_entries == 0 {
        return Err(ConfigError::ValidationError {
            field: "upstream.cache_max_entries".into(),
            message: "must be greater than 0".into(),
        });
    }

    let planner = &config.planner;
    if planner.hit_allowance < 0 {
        return Err(ConfigError::ValidationError {
            field: "planner.hit_allowance".into(),
            message: format!("must be >= 0, got {}", planner.hit_allowance),
        });
    }
    if !(planner.min_transfer_gain >= 0.0) {
        return Err(ConfigError::ValidationError {
            field: "planner.min_transfer_gain".into(),
            message: format!("must be >= 0, got {}", planner.min_transfer_gain),
        });
    }
    if !(0.0..=100.0).contains(&planner.template_threshold) {
        return Err(ConfigError::ValidationError {
            field: "planner.template_threshold".into(),
            message: format!(
                "must be between 0 and 100 inclusive, got {}",
                planner.template_threshold
            ),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
