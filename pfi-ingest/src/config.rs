//! Configuration resolution for pfi-ingest
//!
//! Provides multi-tier configuration resolution with CLI → ENV → TOML → default
//! priority. Each setting resolves independently; a setting found in more than
//! one tier is logged as a warning since the lower tiers are silently ignored.

use crate::error::{ImportError, ImportResult};
use crate::services::frame_sampler::{SamplingConfig, DEFAULT_FRAME_INTERVAL_SECS};
use crate::services::profile_parse_client::ParseClientConfig;
use crate::utils::RetryPolicy;
use pfi_common::config::{resolve_data_folder, TomlConfig};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const PROFILE_ENV: &str = "PFI_PROFILE";
pub const INTERVAL_ENV: &str = "PFI_FRAME_INTERVAL";
pub const MAX_FRAMES_ENV: &str = "PFI_MAX_FRAMES";
pub const MAX_DIMENSION_ENV: &str = "PFI_MAX_DIMENSION";
pub const LANGUAGES_ENV: &str = "PFI_OCR_LANGUAGES";
pub const CONCURRENCY_ENV: &str = "PFI_OCR_CONCURRENCY";
pub const SYNC_BASE_URL_ENV: &str = "PFI_SYNC_BASE_URL";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Execution context the pipeline runs in
///
/// `Constrained` is for memory-limited hosts (share extensions, small
/// containers) and caps both frame count and frame size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionProfile {
    #[default]
    Foreground,
    Constrained,
}

impl ExecutionProfile {
    pub fn max_frames(&self) -> u32 {
        match self {
            ExecutionProfile::Foreground => 30,
            ExecutionProfile::Constrained => 20,
        }
    }

    pub fn max_dimension(&self) -> u32 {
        match self {
            ExecutionProfile::Foreground => 2000,
            ExecutionProfile::Constrained => 720,
        }
    }

    /// Sampling defaults for this context
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            interval_seconds: DEFAULT_FRAME_INTERVAL_SECS,
            max_frames: self.max_frames(),
            max_dimension: self.max_dimension(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionProfile::Foreground => "foreground",
            ExecutionProfile::Constrained => "constrained",
        }
    }
}

impl fmt::Display for ExecutionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionProfile {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "foreground" => Ok(ExecutionProfile::Foreground),
            "constrained" => Ok(ExecutionProfile::Constrained),
            other => Err(ImportError::Config(format!(
                "unknown execution profile {:?} (expected \"foreground\" or \"constrained\")",
                other
            ))),
        }
    }
}

/// Values given on the command line (highest priority)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub data_folder: Option<PathBuf>,
    pub profile: Option<ExecutionProfile>,
    pub interval_seconds: Option<f64>,
    pub max_frames: Option<u32>,
    pub max_dimension: Option<u32>,
    pub concurrency: Option<usize>,
    pub sync_base_url: Option<String>,
}

/// Fully resolved pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub data_folder: PathBuf,
    pub log_level: String,
    pub profile: ExecutionProfile,
    pub sampling: SamplingConfig,
    /// BCP 47 tags handed to the recognizer
    pub languages: Vec<String>,
    /// Recognitions in flight at once
    pub concurrency: usize,
    pub sync_base_url: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl IngestConfig {
    /// Resolve every setting from CLI, environment, TOML and defaults, then validate
    pub fn resolve(cli: &CliOverrides, toml_config: &TomlConfig) -> ImportResult<Self> {
        let profile = match resolve_setting(
            "execution profile",
            cli.profile,
            PROFILE_ENV,
            toml_config
                .sampling
                .profile
                .as_deref()
                .map(ExecutionProfile::from_str)
                .transpose()?,
        )? {
            Some(profile) => profile,
            None => ExecutionProfile::default(),
        };
        let defaults = profile.sampling();

        let sampling = SamplingConfig {
            interval_seconds: resolve_setting(
                "frame interval",
                cli.interval_seconds,
                INTERVAL_ENV,
                toml_config.sampling.interval_seconds,
            )?
            .unwrap_or(defaults.interval_seconds),
            max_frames: resolve_setting(
                "max frames",
                cli.max_frames,
                MAX_FRAMES_ENV,
                toml_config.sampling.max_frames,
            )?
            .unwrap_or(defaults.max_frames),
            max_dimension: resolve_setting(
                "max dimension",
                cli.max_dimension,
                MAX_DIMENSION_ENV,
                toml_config.sampling.max_dimension,
            )?
            .unwrap_or(defaults.max_dimension),
        };

        let languages = resolve_setting(
            "recognition languages",
            None,
            LANGUAGES_ENV,
            toml_config.recognition.languages.clone().map(LanguageList),
        )?
        .map(|list| list.0)
        .unwrap_or_else(|| vec!["en-US".to_string()]);

        let concurrency = resolve_setting(
            "recognition concurrency",
            cli.concurrency,
            CONCURRENCY_ENV,
            toml_config.recognition.concurrency,
        )?
        .unwrap_or(1);

        let sync_base_url = resolve_setting(
            "sync base URL",
            cli.sync_base_url.clone(),
            SYNC_BASE_URL_ENV,
            toml_config.sync.base_url.clone(),
        )?;

        let sync = &toml_config.sync;
        let retry = RetryPolicy {
            max_attempts: sync.max_attempts.unwrap_or(RetryPolicy::default().max_attempts),
            initial_backoff: match sync.initial_backoff_secs {
                Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
                Some(secs) => {
                    return Err(ImportError::Config(format!(
                        "initial_backoff_secs must be a non-negative number, got {}",
                        secs
                    )))
                }
                None => RetryPolicy::default().initial_backoff,
            },
            ..RetryPolicy::default()
        };

        let config = Self {
            data_folder: resolve_data_folder(cli.data_folder.as_deref(), toml_config),
            log_level: toml_config.logging.level.clone(),
            profile,
            sampling,
            languages,
            concurrency,
            sync_base_url,
            request_timeout: Duration::from_secs(
                sync.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            connect_timeout: Duration::from_secs(
                sync.connect_timeout_secs.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            retry,
        };

        config.validate()?;
        debug!(?config, "Resolved ingest configuration");
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> ImportResult<()> {
        let s = &self.sampling;
        if !s.interval_seconds.is_finite() || s.interval_seconds <= 0.0 {
            return Err(ImportError::Config(format!(
                "frame interval must be positive, got {}",
                s.interval_seconds
            )));
        }
        if s.max_frames == 0 {
            return Err(ImportError::Config("max frames must be at least 1".into()));
        }
        if s.max_dimension == 0 {
            return Err(ImportError::Config("max dimension must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ImportError::Config(
                "recognition concurrency must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ImportError::Config("max_attempts must be at least 1".into()));
        }
        if let Some(url) = &self.sync_base_url {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| ImportError::Config(format!("invalid sync base URL {:?}: {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ImportError::Config(format!(
                    "sync base URL must be http or https, got {:?}",
                    url
                )));
            }
        }
        Ok(())
    }

    /// Parse client settings
    ///
    /// # Errors
    /// `Config` when no sync base URL is configured anywhere.
    pub fn parse_client_config(&self) -> ImportResult<ParseClientConfig> {
        let base_url = self.sync_base_url.clone().ok_or_else(|| {
            ImportError::Config(format!(
                "Sync base URL not configured. Please configure using one of:\n\
                 1. Command line: --sync-url https://api.example.com\n\
                 2. Environment: {}=https://api.example.com\n\
                 3. TOML config: [sync] base_url = \"https://api.example.com\"",
                SYNC_BASE_URL_ENV
            ))
        })?;

        Ok(ParseClientConfig {
            base_url,
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            retry: self.retry,
        })
    }
}

/// Comma-separated list from the environment
#[derive(Debug, Clone)]
struct LanguageList(Vec<String>);

impl FromStr for LanguageList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tags: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if tags.is_empty() {
            return Err("empty language list".to_string());
        }
        Ok(LanguageList(tags))
    }
}

/// Resolve one setting across tiers
///
/// **Priority:** CLI → ENV → TOML
///
/// Returns `None` when no tier provides a value. An environment value that
/// does not parse is an error rather than a silent fallback.
fn resolve_setting<T>(
    name: &str,
    cli_value: Option<T>,
    env_var: &str,
    toml_value: Option<T>,
) -> ImportResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let env_value = match std::env::var(env_var) {
        Ok(raw) if !raw.trim().is_empty() => Some(raw.trim().parse::<T>().map_err(|e| {
            ImportError::Config(format!("{}={:?} is invalid: {}", env_var, raw, e))
        })?),
        _ => None,
    };

    let mut sources = Vec::new();
    if cli_value.is_some() {
        sources.push("command line");
    }
    if env_value.is_some() {
        sources.push("environment");
    }
    if toml_value.is_some() {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            name,
            sources.join(", "),
            sources[0]
        );
    }

    Ok(cli_value.or(env_value).or(toml_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            PROFILE_ENV,
            INTERVAL_ENV,
            MAX_FRAMES_ENV,
            MAX_DIMENSION_ENV,
            LANGUAGES_ENV,
            CONCURRENCY_ENV,
            SYNC_BASE_URL_ENV,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_are_foreground_profile() {
        clear_env();
        let config = IngestConfig::resolve(&CliOverrides::default(), &TomlConfig::default()).unwrap();

        assert_eq!(config.profile, ExecutionProfile::Foreground);
        assert_eq!(config.sampling.interval_seconds, 0.5);
        assert_eq!(config.sampling.max_frames, 30);
        assert_eq!(config.sampling.max_dimension, 2000);
        assert_eq!(config.languages, vec!["en-US".to_string()]);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.sync_base_url.is_none());
    }

    #[test]
    #[serial]
    fn test_constrained_profile_from_toml() {
        clear_env();
        let mut toml_config = TomlConfig::default();
        toml_config.sampling.profile = Some("Constrained".into());

        let config = IngestConfig::resolve(&CliOverrides::default(), &toml_config).unwrap();
        assert_eq!(config.sampling.max_frames, 20);
        assert_eq!(config.sampling.max_dimension, 720);
    }

    #[test]
    #[serial]
    fn test_cli_beats_env_beats_toml() {
        clear_env();
        std::env::set_var(MAX_FRAMES_ENV, "12");
        std::env::set_var(MAX_DIMENSION_ENV, "900");
        let mut toml_config = TomlConfig::default();
        toml_config.sampling.max_frames = Some(5);
        toml_config.sampling.max_dimension = Some(500);
        toml_config.sampling.interval_seconds = Some(1.0);
        let cli = CliOverrides {
            max_frames: Some(8),
            ..Default::default()
        };

        let config = IngestConfig::resolve(&cli, &toml_config).unwrap();
        clear_env();

        assert_eq!(config.sampling.max_frames, 8);
        assert_eq!(config.sampling.max_dimension, 900);
        assert_eq!(config.sampling.interval_seconds, 1.0);
    }

    #[test]
    #[serial]
    fn test_bad_env_value_is_config_error() {
        clear_env();
        std::env::set_var(MAX_FRAMES_ENV, "lots");
        let result = IngestConfig::resolve(&CliOverrides::default(), &TomlConfig::default());
        clear_env();

        assert!(matches!(result, Err(ImportError::Config(msg)) if msg.contains(MAX_FRAMES_ENV)));
    }

    #[test]
    #[serial]
    fn test_languages_from_env_list() {
        clear_env();
        std::env::set_var(LANGUAGES_ENV, "en-US, es ,");
        let config = IngestConfig::resolve(&CliOverrides::default(), &TomlConfig::default()).unwrap();
        clear_env();

        assert_eq!(config.languages, vec!["en-US".to_string(), "es".to_string()]);
    }

    #[test]
    #[serial]
    fn test_validation_rejects_unusable_values() {
        clear_env();
        for cli in [
            CliOverrides { interval_seconds: Some(0.0), ..Default::default() },
            CliOverrides { max_frames: Some(0), ..Default::default() },
            CliOverrides { max_dimension: Some(0), ..Default::default() },
            CliOverrides { concurrency: Some(0), ..Default::default() },
            CliOverrides { sync_base_url: Some("not a url".into()), ..Default::default() },
            CliOverrides { sync_base_url: Some("ftp://example.com".into()), ..Default::default() },
        ] {
            let result = IngestConfig::resolve(&cli, &TomlConfig::default());
            assert!(matches!(result, Err(ImportError::Config(_))), "{:?}", cli);
        }
    }

    #[test]
    #[serial]
    fn test_sync_settings_from_toml() {
        clear_env();
        let mut toml_config = TomlConfig::default();
        toml_config.sync.base_url = Some("https://parse.example.com/".into());
        toml_config.sync.max_attempts = Some(5);
        toml_config.sync.initial_backoff_secs = Some(0.25);
        toml_config.sync.request_timeout_secs = Some(12);

        let config = IngestConfig::resolve(&CliOverrides::default(), &toml_config).unwrap();
        let client = config.parse_client_config().unwrap();

        assert_eq!(client.endpoint(), "https://parse.example.com/v1/profile/parse");
        assert_eq!(client.retry.max_attempts, 5);
        assert_eq!(client.retry.initial_backoff, Duration::from_millis(250));
        assert_eq!(client.request_timeout, Duration::from_secs(12));
    }

    #[test]
    #[serial]
    fn test_missing_sync_url_explains_options() {
        clear_env();
        let config = IngestConfig::resolve(&CliOverrides::default(), &TomlConfig::default()).unwrap();
        match config.parse_client_config() {
            Err(ImportError::Config(msg)) => assert!(msg.contains(SYNC_BASE_URL_ENV)),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("foreground".parse::<ExecutionProfile>().unwrap(), ExecutionProfile::Foreground);
        assert_eq!(" CONSTRAINED ".parse::<ExecutionProfile>().unwrap(), ExecutionProfile::Constrained);
        assert!("background".parse::<ExecutionProfile>().is_err());
    }
}
