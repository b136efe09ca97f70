use anyhow::{Context, Result};
use garde::Validate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEMPERATURE: f64 = 0.35;
pub const DEFAULT_INTERPRETER: &str = "python";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MEDIA_URL: &str = "/media/";

/// Optional TOML file named by `REWIND_CONFIG`. Every key is optional; the
/// environment wins over anything set here.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub temperature: Option<f64>,
    pub request_timeout_secs: Option<u64>,
    pub interpreter: Option<String>,
    pub timeout_secs: Option<u64>,
    pub media_root: Option<PathBuf>,
    pub media_url: Option<String>,
    pub static_root: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[derive(Debug, Clone, Validate)]
pub struct Config {
    #[garde(length(min = 1))]
    pub host: String,
    #[garde(skip)]
    pub port: u16,
    /// Model API key. Without one every generation degrades to an error comment.
    #[garde(skip)]
    pub api_key: Option<String>,
    #[garde(length(min = 1))]
    pub model: String,
    #[garde(length(min = 1))]
    pub api_base: String,
    #[garde(range(min = 0.0, max = 2.0))]
    pub temperature: f64,
    /// Limit on one whole model call, stream included.
    #[garde(range(min = 1))]
    pub request_timeout_secs: u64,
    #[garde(length(min = 1))]
    pub interpreter: String,
    #[garde(range(min = 1))]
    pub timeout_secs: u64,
    #[garde(skip)]
    pub media_root: PathBuf,
    #[garde(length(min = 1))]
    pub media_url: String,
    #[garde(skip)]
    pub static_root: PathBuf,
    #[garde(skip)]
    pub scratch_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            interpreter: DEFAULT_INTERPRETER.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            media_root: PathBuf::from("media"),
            media_url: DEFAULT_MEDIA_URL.to_string(),
            static_root: PathBuf::from("static"),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl Config {
    /// Build from the process environment.
    ///
    /// | Env Var | Default | Purpose |
    /// |---------|---------|---------|
    /// | `REWIND_CONFIG` | (none) | TOML file with defaults for the keys below |
    /// | `HOST` / `PORT` | `0.0.0.0` / `8000` | Listen address |
    /// | `GOOGLE_API_KEY` | (none) | Generative Language API key |
    /// | `REWIND_MODEL` | `gemini-1.5-flash` | Model name |
    /// | `REWIND_API_BASE` | Google v1beta endpoint | API base URL |
    /// | `REWIND_TEMPERATURE` | `0.35` | Sampling temperature |
    /// | `REWIND_REQUEST_TIMEOUT_SECS` | `60` | Limit on one model call |
    /// | `REWIND_INTERPRETER` | `python` | Executable that runs the generated script |
    /// | `REWIND_TIMEOUT_SECS` | `120` | Wall-clock limit per run |
    /// | `MEDIA_ROOT` / `MEDIA_URL` | `media` / `/media/` | Where charts land and how they are served |
    /// | `STATIC_ROOT` | `static` | Static assets |
    /// | `REWIND_SCRATCH_DIR` | OS temp dir | Parent of per-run temp directories |
    pub fn from_env() -> Result<Self> {
        let file = match std::env::var("REWIND_CONFIG") {
            Ok(path) if !path.is_empty() => FileConfig::load(Path::new(&path))?,
            _ => FileConfig::default(),
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Layer `lookup` (usually the environment) over `file` over the defaults.
    pub fn from_sources(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            host: get("HOST").or(file.host).unwrap_or(defaults.host),
            port: match get("PORT") {
                Some(v) => v.trim().parse().with_context(|| format!("Invalid PORT: {v}"))?,
                None => file.port.unwrap_or(defaults.port),
            },
            api_key: get("GOOGLE_API_KEY").or(file.api_key),
            model: get("REWIND_MODEL").or(file.model).unwrap_or(defaults.model),
            api_base: get("REWIND_API_BASE")
                .or(file.api_base)
                .unwrap_or(defaults.api_base),
            temperature: match get("REWIND_TEMPERATURE") {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid REWIND_TEMPERATURE: {v}"))?,
                None => file.temperature.unwrap_or(defaults.temperature),
            },
            request_timeout_secs: match get("REWIND_REQUEST_TIMEOUT_SECS") {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid REWIND_REQUEST_TIMEOUT_SECS: {v}"))?,
                None => file
                    .request_timeout_secs
                    .unwrap_or(defaults.request_timeout_secs),
            },
            interpreter: get("REWIND_INTERPRETER")
                .or(file.interpreter)
                .unwrap_or(defaults.interpreter),
            timeout_secs: match get("REWIND_TIMEOUT_SECS") {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid REWIND_TIMEOUT_SECS: {v}"))?,
                None => file.timeout_secs.unwrap_or(defaults.timeout_secs),
            },
            media_root: get("MEDIA_ROOT")
                .map(PathBuf::from)
                .or(file.media_root)
                .unwrap_or(defaults.media_root),
            media_url: get("MEDIA_URL")
                .or(file.media_url)
                .unwrap_or(defaults.media_url),
            static_root: get("STATIC_ROOT")
                .map(PathBuf::from)
                .or(file.static_root)
                .unwrap_or(defaults.static_root),
            scratch_dir: get("REWIND_SCRATCH_DIR")
                .map(PathBuf::from)
                .or(file.scratch_dir)
                .unwrap_or(defaults.scratch_dir),
        };

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
