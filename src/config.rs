//! Environment-driven configuration
//!
//! Values are read once at startup (after `dotenvy` has loaded any `.env`
//! file) and passed explicitly to the pieces that need them.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::cookie::Jar;

use crate::dispatch::DispatchConfig;
use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://gamesense.pub/forums";
const COMPOSE_PATH: &str = "/pmsnew.php?mdl=post";

#[derive(Debug, Clone)]
pub struct Config {
    /// Forum root, without a trailing slash
    pub base_url: String,
    /// Raw `Cookie` header carrying the logged-in session
    pub cookie: Option<String>,
    pub request_timeout: Duration,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `FORUM_BASE_URL` | `https://gamesense.pub/forums` |
    /// | `FORUM_COOKIE` | unset |
    /// | `GIVEAWAY_SEND_DELAY_SECS` | 30 |
    /// | `GIVEAWAY_MAX_ATTEMPTS` | 3 |
    /// | `GIVEAWAY_RETRY_BACKOFF_SECS` | 30 |
    /// | `GIVEAWAY_REQUEST_TIMEOUT_SECS` | 30 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but with a caller-supplied variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DispatchConfig::default();

        let base_url = lookup("FORUM_BASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "FORUM_BASE_URL",
                value: base_url,
                reason: "must start with http:// or https://",
            });
        }

        let cookie = lookup("FORUM_COOKIE").filter(|c| !c.trim().is_empty());

        let delay_between_sends = seconds(&lookup, "GIVEAWAY_SEND_DELAY_SECS")?
            .unwrap_or(defaults.delay_between_sends);
        let retry_backoff = seconds(&lookup, "GIVEAWAY_RETRY_BACKOFF_SECS")?
            .unwrap_or(defaults.retry_backoff);

        let max_attempts = match lookup("GIVEAWAY_MAX_ATTEMPTS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "GIVEAWAY_MAX_ATTEMPTS",
                        value: raw,
                        reason: "expected a whole number of at least 1",
                    });
                }
            },
            None => defaults.max_attempts,
        };

        let request_timeout = seconds(&lookup, "GIVEAWAY_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(Duration::from_secs(30));
        if request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "GIVEAWAY_REQUEST_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "a request timeout is required",
            });
        }

        Ok(Self {
            base_url,
            cookie,
            request_timeout,
            dispatch: DispatchConfig {
                delay_between_sends,
                max_attempts,
                retry_backoff,
            },
        })
    }

    /// Private-message compose endpoint
    pub fn compose_url(&self) -> String {
        format!("{}{COMPOSE_PATH}", self.base_url)
    }

    /// Cookie jar holding the forum session, seeded from `FORUM_COOKIE`.
    ///
    /// Every client of one run must share this jar so cookies the forum
    /// rotates mid-run reach the next request.
    pub fn session_jar(&self) -> Result<Arc<Jar>, ConfigError> {
        seeded_jar(&self.base_url, self.cookie.as_deref())
    }
}

/// Jar scoped to `base_url`, seeded from a raw `Cookie` header value
/// (`name=value; other=value`).
pub fn seeded_jar(base_url: &str, cookie: Option<&str>) -> Result<Arc<Jar>, ConfigError> {
    let url = Url::parse(base_url).map_err(|_| ConfigError::Invalid {
        key: "FORUM_BASE_URL",
        value: base_url.to_string(),
        reason: "not a valid URL",
    })?;

    let jar = Jar::default();
    for pair in cookie
        .into_iter()
        .flat_map(|header| header.split(';'))
        .map(str::trim)
        .filter(|pair| pair.contains('='))
    {
        jar.add_cookie_str(&format!("{pair}; Path=/"), &url);
    }

    Ok(Arc::new(jar))
}

fn seconds<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid {
                    key,
                    value: raw,
                    reason: "expected a whole number of seconds",
                })
        })
        .transpose()
}
