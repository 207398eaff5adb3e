//! Configuration module for pixelstream.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.
//!
//! The classic flags (`-image`, `-host`, `-n`, ...) are accepted with a
//! single dash; see [`normalize_args`].

use clap::Parser;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Seed used when deterministic mode is requested without an explicit seed.
pub const DETERMINISTIC_SEED: u64 = 1;

/// Command-line arguments for the streaming client
#[derive(Parser, Debug)]
#[command(name = "pixelstream")]
#[command(author = "pixelstream authors")]
#[command(version = "0.1.0")]
#[command(about = "Streams an image to a pixelflut canvas", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Image file name (PNG, JPEG or GIF)
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Host and port to connect to
    #[arg(long)]
    pub host: Option<String>,

    /// Start of the image on the canvas (x)
    #[arg(short = 'x', long = "x")]
    pub x: Option<u32>,

    /// Start of the image on the canvas (y)
    #[arg(short = 'y', long = "y")]
    pub y: Option<u32>,

    /// Number of concurrent connections
    #[arg(short = 'n', long = "n")]
    pub n: Option<usize>,

    /// Send one full pass per connection, then stop
    #[arg(long)]
    pub once: bool,

    /// Initialise the RNG deterministically
    #[arg(long)]
    pub deterministic: bool,

    /// Explicit RNG seed for the pixel order
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Dial timeout in milliseconds
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Socket send buffer size in bytes
    #[arg(long)]
    pub send_buffer: Option<usize>,

    /// Disable Nagle's algorithm on every connection
    #[arg(long)]
    pub no_delay: bool,

    /// First reconnect delay in milliseconds
    #[arg(long)]
    pub backoff_initial_ms: Option<u64>,

    /// Upper bound on the reconnect delay in milliseconds
    #[arg(long)]
    pub backoff_max_ms: Option<u64>,

    /// Number of runtime threads (defaults to number of CPU cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub backoff: BackoffToml,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Canvas server and placement
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            x: 0,
            y: 0,
        }
    }
}

/// Source image and pixel order
#[derive(Debug, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image")]
    pub path: PathBuf,
    #[serde(default)]
    pub deterministic: bool,
    pub seed: Option<u64>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            path: default_image(),
            deterministic: false,
            seed: None,
        }
    }
}

/// Connection pool settings
#[derive(Debug, Deserialize)]
pub struct ConnectionsConfig {
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub once: bool,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    pub send_buffer: Option<usize>,
    #[serde(default)]
    pub no_delay: bool,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            once: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            send_buffer: None,
            no_delay: false,
        }
    }
}

/// Reconnect backoff bounds
#[derive(Debug, Deserialize)]
pub struct BackoffToml {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffToml {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

/// Run length and runtime sizing
#[derive(Debug, Deserialize, Default)]
pub struct RunConfig {
    pub duration_secs: Option<u64>,
    pub threads: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "localhost:1234".to_string()
}

fn default_image() -> PathBuf {
    PathBuf::from("image.png")
}

fn default_count() -> usize {
    1
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_backoff_initial_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Reconnect backoff bounds, resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub image: PathBuf,
    pub host: String,
    pub offset_x: u32,
    pub offset_y: u32,
    pub connections: usize,
    pub once: bool,
    pub deterministic: bool,
    pub seed: Option<u64>,
    pub duration: Option<Duration>,
    pub connect_timeout: Duration,
    pub send_buffer: Option<usize>,
    pub no_delay: bool,
    pub backoff: BackoffConfig,
    pub threads: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse_from(normalize_args(std::env::args_os()));

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence) and validate.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            image: cli.image.unwrap_or(toml_config.image.path),
            host: cli.host.unwrap_or(toml_config.target.host),
            offset_x: cli.x.unwrap_or(toml_config.target.x),
            offset_y: cli.y.unwrap_or(toml_config.target.y),
            connections: cli.n.unwrap_or(toml_config.connections.count),
            once: cli.once || toml_config.connections.once,
            deterministic: cli.deterministic || toml_config.image.deterministic,
            seed: cli.seed.or(toml_config.image.seed),
            duration: cli
                .duration
                .or(toml_config.run.duration_secs)
                .map(Duration::from_secs),
            connect_timeout: Duration::from_millis(
                cli.connect_timeout_ms
                    .unwrap_or(toml_config.connections.connect_timeout_ms),
            ),
            send_buffer: cli.send_buffer.or(toml_config.connections.send_buffer),
            no_delay: cli.no_delay || toml_config.connections.no_delay,
            backoff: BackoffConfig {
                initial: Duration::from_millis(
                    cli.backoff_initial_ms
                        .unwrap_or(toml_config.backoff.initial_ms),
                ),
                max: Duration::from_millis(
                    cli.backoff_max_ms.unwrap_or(toml_config.backoff.max_ms),
                ),
            },
            threads: cli.threads.or(toml_config.run.threads),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.connections == 0 {
            return Err(ConfigError::Invalid("number of connections must be at least 1"));
        }
        if self.backoff.initial > self.backoff.max {
            return Err(ConfigError::Invalid(
                "initial backoff must not exceed maximum backoff",
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid("connect timeout must be positive"));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Invalid("runtime threads must be at least 1"));
        }
        Ok(())
    }

    /// Seed for the pixel permutation.
    ///
    /// An explicit seed always wins. Deterministic mode falls back to
    /// [`DETERMINISTIC_SEED`]; otherwise the wall clock is used.
    pub fn resolve_seed(&self) -> u64 {
        match (self.seed, self.deterministic) {
            (Some(seed), _) => seed,
            (None, true) => DETERMINISTIC_SEED,
            (None, false) => chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default() as u64,
        }
    }
}

/// Rewrite single-dash long flags (`-image`) to their double-dash form.
///
/// Single-letter flags, negative numbers and `--` forms pass through.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 {
                return arg;
            }
            match arg.to_str() {
                Some(s) if is_single_dash_long(s) => OsString::from(format!("-{s}")),
                _ => arg,
            }
        })
        .collect()
}

fn is_single_dash_long(arg: &str) -> bool {
    let bytes = arg.as_bytes();
    bytes.len() > 2 && bytes[0] == b'-' && bytes[1] != b'-' && !bytes[1].is_ascii_digit()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {err}", path = .0.display(), err = .1)]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{path}': {err}", path = .0.display(), err = .1)]
    TomlParse(PathBuf, toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        let args = std::iter::once("pixelstream")
            .chain(args.iter().copied())
            .map(OsString::from);
        CliArgs::try_parse_from(normalize_args(args)).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::merge(parse(&[]), TomlConfig::default()).unwrap();
        assert_eq!(config.image, PathBuf::from("image.png"));
        assert_eq!(config.host, "localhost:1234");
        assert_eq!(config.offset_x, 0);
        assert_eq!(config.offset_y, 0);
        assert_eq!(config.connections, 1);
        assert!(!config.once);
        assert!(!config.deterministic);
        assert_eq!(config.duration, None);
        assert_eq!(config.backoff.initial, Duration::from_millis(100));
        assert_eq!(config.backoff.max, Duration::from_millis(5000));
    }

    #[test]
    fn test_single_dash_flags() {
        let cli = parse(&[
            "-image",
            "cat.gif",
            "-host",
            "canvas:1337",
            "-x",
            "10",
            "-y=20",
            "-n",
            "8",
            "-once",
            "-deterministic",
        ]);
        let config = Config::merge(cli, TomlConfig::default()).unwrap();
        assert_eq!(config.image, PathBuf::from("cat.gif"));
        assert_eq!(config.host, "canvas:1337");
        assert_eq!(config.offset_x, 10);
        assert_eq!(config.offset_y, 20);
        assert_eq!(config.connections, 8);
        assert!(config.once);
        assert!(config.deterministic);
    }

    #[test]
    fn test_normalize_args() {
        let args = ["prog", "-image", "-x", "-5", "--host", "-n=2", "-x=1", "-"]
            .into_iter()
            .map(OsString::from);
        let normalized: Vec<_> = normalize_args(args);
        let expected: Vec<OsString> = [
            "prog", "--image", "-x", "-5", "--host", "--n=2", "--x=1", "-",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        assert_eq!(normalized, expected);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [target]
            host = "10.0.0.1:1234"
            x = 100
            y = 200

            [image]
            path = "logo.png"
            seed = 42

            [connections]
            count = 16
            once = true
            send_buffer = 65536

            [backoff]
            initial_ms = 10
            max_ms = 1000

            [run]
            duration_secs = 30

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.target.host, "10.0.0.1:1234");
        assert_eq!(config.target.x, 100);
        assert_eq!(config.image.seed, Some(42));
        assert_eq!(config.connections.count, 16);
        assert_eq!(config.connections.send_buffer, Some(65536));
        assert_eq!(config.connections.connect_timeout_ms, 5000);
        assert_eq!(config.logging.level, "debug");

        let merged = Config::merge(parse(&["-n", "2"]), config).unwrap();
        assert_eq!(merged.connections, 2);
        assert_eq!(merged.offset_y, 200);
        assert!(merged.once);
        assert_eq!(merged.duration, Some(Duration::from_secs(30)));
        assert_eq!(merged.backoff.max, Duration::from_secs(1));
        assert_eq!(merged.log_level, "debug");
    }

    #[test]
    fn test_rejects_zero_connections() {
        let err = Config::merge(parse(&["-n", "0"]), TomlConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let cli = parse(&["--backoff-initial-ms", "500", "--backoff-max-ms", "10"]);
        assert!(Config::merge(cli, TomlConfig::default()).is_err());
    }

    #[test]
    fn test_negative_offset_rejected() {
        let args = ["pixelstream", "-x", "-5"].into_iter().map(OsString::from);
        assert!(CliArgs::try_parse_from(normalize_args(args)).is_err());
    }

    #[test]
    fn test_resolve_seed() {
        let mut config = Config::merge(parse(&["-deterministic"]), TomlConfig::default()).unwrap();
        assert_eq!(config.resolve_seed(), DETERMINISTIC_SEED);

        config.seed = Some(7);
        assert_eq!(config.resolve_seed(), 7);
    }
}
