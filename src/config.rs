use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "SELFLIKE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub flags: FlagsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Skips the bearer token bootstrap when set.
    #[serde(default)]
    pub bearer_token: String,
    /// Raw `Cookie` header of the logged-in session; must contain `ct0`.
    #[serde(default)]
    pub cookie: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bearer_token: String::new(),
            cookie: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("selflike/{}", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_rate_limit_code")]
    pub rate_limit_code: i64,
    #[serde(default = "default_bootstrap_script_prefix")]
    pub bootstrap_script_prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_timeout(),
            rate_limit_code: default_rate_limit_code(),
            bootstrap_script_prefix: default_bootstrap_script_prefix(),
        }
    }
}

fn default_base_url() -> String {
    crate::api::DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_rate_limit_code() -> i64 {
    crate::api::RATE_LIMIT_ERROR_CODE
}

fn default_bootstrap_script_prefix() -> String {
    "https://abs.twimg.com/responsive-web/client-web/main.".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Address the page was loaded from; relative links resolve against it.
    #[serde(default = "default_page_url")]
    pub page_url: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_container")]
    pub container: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_url: default_page_url(),
            host: default_host(),
            container: default_container(),
        }
    }
}

fn default_page_url() -> String {
    "https://twitter.com/home".into()
}

fn default_host() -> String {
    "twitter.com".into()
}

fn default_container() -> String {
    "article".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollConfig {
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            retry_delay: default_retry_delay(),
        }
    }
}

fn default_interval() -> Duration {
    crate::poll::DEFAULT_INTERVAL
}

fn default_retry_delay() -> Duration {
    Duration::ZERO
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FlagsConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub stats: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        let from_file = read_config_file(path)?;
        cfg = merge_config(cfg, from_file);
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = apply_env(cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.session.bearer_token.is_empty() {
        base.session.bearer_token = other.session.bearer_token;
    }
    if !other.session.cookie.is_empty() {
        base.session.cookie = other.session.cookie;
    }
    if !other.session.user_agent.is_empty() {
        base.session.user_agent = other.session.user_agent;
    }

    if !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.timeout.is_zero() {
        base.api.timeout = other.api.timeout;
    }
    base.api.rate_limit_code = other.api.rate_limit_code;
    if !other.api.bootstrap_script_prefix.is_empty() {
        base.api.bootstrap_script_prefix = other.api.bootstrap_script_prefix;
    }

    if !other.scan.page_url.is_empty() {
        base.scan.page_url = other.scan.page_url;
    }
    if !other.scan.host.is_empty() {
        base.scan.host = other.scan.host;
    }
    if !other.scan.container.is_empty() {
        base.scan.container = other.scan.container;
    }

    base.poll = other.poll;
    base.flags = other.flags;

    base
}

/// Environment variables override single keys of an already loaded config,
/// e.g. `SELFLIKE_POLL__INTERVAL=250ms`.
fn apply_env(mut cfg: Config, prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "session.bearer_token" => cfg.session.bearer_token = value,
        "session.cookie" => cfg.session.cookie = value,
        "session.user_agent" => cfg.session.user_agent = value,
        "api.base_url" => cfg.api.base_url = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "api.rate_limit_code" => {
            if let Ok(parsed) = value.parse::<i64>() {
                cfg.api.rate_limit_code = parsed;
            }
        }
        "api.bootstrap_script_prefix" => cfg.api.bootstrap_script_prefix = value,
        "scan.page_url" => cfg.scan.page_url = value,
        "scan.host" => cfg.scan.host = value,
        "scan.container" => cfg.scan.container = value,
        "poll.interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.poll.interval = duration;
            }
        }
        "poll.retry_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.poll.retry_delay = duration;
            }
        }
        "flags.debug" => cfg.flags.debug = parse_bool(&value),
        "flags.verbose" => cfg.flags.verbose = parse_bool(&value),
        "flags.stats" => cfg.flags.stats = parse_bool(&value),
        _ => {}
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True")
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("selflike").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            env_prefix: Some("SELFLIKE_TEST_DEFAULTS".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.scan.container, "article");
        assert_eq!(cfg.api.rate_limit_code, 88);
        assert_eq!(cfg.poll.interval, Duration::from_millis(100));
        assert_eq!(cfg.poll.retry_delay, Duration::ZERO);
    }

    #[test]
    fn reads_yaml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "session:\n  cookie: \"ct0=abc\"\npoll:\n  interval: 2s\n  retry_delay: 1m\nflags:\n  stats: true\n",
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("SELFLIKE_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.session.cookie, "ct0=abc");
        assert_eq!(cfg.poll.interval, Duration::from_secs(2));
        assert_eq!(cfg.poll.retry_delay, Duration::from_secs(60));
        assert!(cfg.flags.stats);
        assert_eq!(cfg.scan.host, "twitter.com");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = load(LoadOptions {
            config_file: Some(dir.path().join("nope.yaml")),
            env_prefix: Some("SELFLIKE_TEST_MISSING".into()),
        });
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides() {
        env::set_var("SELFLIKE_TEST_ENV_POLL__INTERVAL", "250ms");
        env::set_var("SELFLIKE_TEST_ENV_FLAGS__DEBUG", "true");
        let cfg = load(LoadOptions {
            env_prefix: Some("SELFLIKE_TEST_ENV".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.poll.interval, Duration::from_millis(250));
        assert!(cfg.flags.debug);
        env::remove_var("SELFLIKE_TEST_ENV_POLL__INTERVAL");
        env::remove_var("SELFLIKE_TEST_ENV_FLAGS__DEBUG");
    }
}
