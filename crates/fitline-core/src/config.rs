//! Process configuration, loaded once at startup.

use std::time::Duration;

use url::Url;

use crate::backoff::{Jitter, RetryPolicy};
use crate::batch::DEFAULT_BATCH_SIZE;
use crate::dispatch::{DEFAULT_MAX_CONCURRENT, DispatchConfig};
use crate::error::AppError;
use crate::pool::{Credential, CredentialPool, EgressPool, EgressRoute, RoundRobinPool};

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "tngtech/deepseek-r1t2-chimera:free";
/// Default number of matching batches in flight.
pub const DEFAULT_MATCH_MAX_CONCURRENT: usize = 10;

/// Immutable configuration for the completion service and the dispatcher.
///
/// The credential and egress pools are built once here. Clones of the config
/// and every pool handed out by it share one rotation cursor.
#[derive(Debug, Clone)]
pub struct FitlineConfig {
    pub api_url: Url,
    pub model: String,
    pub credentials: CredentialPool,
    pub egress: EgressPool,
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub match_max_concurrent: usize,
    pub retry: RetryPolicy,
    pub jitter: Jitter,
}

impl FitlineConfig {
    /// Read configuration from environment variables.
    ///
    /// - `FITLINE_API_KEYS` (comma/newline separated), `FITLINE_API_KEY`,
    ///   `FITLINE_API_KEY_2` … `FITLINE_API_KEY_5`: at least one is required
    /// - `FITLINE_PROXIES` (optional, one route per line)
    /// - `FITLINE_API_URL`, `FITLINE_MODEL`
    /// - `FITLINE_BATCH_SIZE` (4), `FITLINE_MAX_CONCURRENT` (3),
    ///   `FITLINE_MATCH_MAX_CONCURRENT` (10), `FITLINE_MAX_ATTEMPTS` (3),
    ///   `FITLINE_BACKOFF_UNIT_SECS` (10), `FITLINE_JITTER_MIN_MS` (1000),
    ///   `FITLINE_JITTER_MAX_MS` (3000), `FITLINE_RETRY_TRANSIENT` (false)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let raw_url = get("FITLINE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&raw_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid FITLINE_API_URL '{raw_url}': {e}"))
        })?;
        let model = get("FITLINE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let credentials = parse_credentials(&get);
        if credentials.is_empty() {
            return Err(AppError::ConfigError(
                "No API keys configured. Set FITLINE_API_KEYS or FITLINE_API_KEY.".into(),
            ));
        }

        let credentials = RoundRobinPool::new("credential", credentials)?;
        let egress = RoundRobinPool::new(
            "egress",
            match get("FITLINE_PROXIES") {
                None => vec![EgressRoute::Direct],
                Some(raw) => parse_proxies(&raw)?,
            },
        )?;

        let batch_size = positive(&get, "FITLINE_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let max_concurrent = positive(&get, "FITLINE_MAX_CONCURRENT", DEFAULT_MAX_CONCURRENT)?;
        let match_max_concurrent = positive(
            &get,
            "FITLINE_MATCH_MAX_CONCURRENT",
            DEFAULT_MATCH_MAX_CONCURRENT,
        )?;

        let defaults = RetryPolicy::default();
        let max_attempts = positive(&get, "FITLINE_MAX_ATTEMPTS", defaults.max_attempts as usize)?;
        let backoff_secs = number(
            &get,
            "FITLINE_BACKOFF_UNIT_SECS",
            defaults.backoff_unit.as_secs(),
        )?;
        let retry = RetryPolicy::default()
            .with_max_attempts(u32::try_from(max_attempts).unwrap_or(u32::MAX))
            .with_backoff_unit(Duration::from_secs(backoff_secs))
            .with_retry_transient(flag(&get, "FITLINE_RETRY_TRANSIENT", false)?);

        let default_jitter = Jitter::default();
        let jitter = Jitter::new(
            Duration::from_millis(number(
                &get,
                "FITLINE_JITTER_MIN_MS",
                default_jitter.min.as_millis() as u64,
            )?),
            Duration::from_millis(number(
                &get,
                "FITLINE_JITTER_MAX_MS",
                default_jitter.max.as_millis() as u64,
            )?),
        );

        let config = Self {
            api_url,
            model,
            credentials,
            egress,
            batch_size,
            max_concurrent,
            match_max_concurrent,
            retry,
            jitter,
        };
        tracing::debug!(
            credentials = config.credentials.len(),
            egress_routes = config.egress.len(),
            batch_size,
            max_concurrent,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Handle on the shared credential pool.
    pub fn credential_pool(&self) -> CredentialPool {
        self.credentials.clone()
    }

    /// Handle on the shared egress pool.
    pub fn egress_pool(&self) -> EgressPool {
        self.egress.clone()
    }

    /// Dispatcher tuning for resume parsing and single-item workloads.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_concurrent: self.max_concurrent,
            retry: self.retry.clone(),
            jitter: self.jitter.clone(),
        }
    }

    /// Dispatcher tuning for candidate matching.
    pub fn match_dispatch_config(&self) -> DispatchConfig {
        self.dispatch_config()
            .with_max_concurrent(self.match_max_concurrent)
    }
}

fn parse_credentials(get: &impl Fn(&str) -> Option<String>) -> Vec<Credential> {
    let mut keys: Vec<String> = get("FITLINE_API_KEYS")
        .map(|raw| {
            raw.split([',', '\n'])
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    keys.extend(get("FITLINE_API_KEY"));
    keys.extend((2..=5).filter_map(|n| get(&format!("FITLINE_API_KEY_{n}"))));

    keys.into_iter().map(Credential::new).collect()
}

/// Parse one route per line: `host:port*user*password` or a full proxy URL.
///
/// Invalid lines are skipped; an input with no valid line is an error.
pub fn parse_proxies(raw: &str) -> Result<Vec<EgressRoute>, AppError> {
    let mut routes = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_proxy_line(line) {
            Ok(url) => routes.push(EgressRoute::Proxy(url)),
            Err(reason) => {
                tracing::warn!(line = line_no + 1, %reason, "Skipping invalid proxy entry");
            }
        }
    }

    if routes.is_empty() {
        return Err(AppError::ConfigError(
            "FITLINE_PROXIES is set but contains no valid proxy".into(),
        ));
    }
    Ok(routes)
}

fn parse_proxy_line(line: &str) -> Result<String, String> {
    let url = if line.contains("://") {
        Url::parse(line).map_err(|e| e.to_string())?
    } else {
        let parts: Vec<&str> = line.split('*').map(str::trim).collect();
        let [host_port, user, password, ..] = parts.as_slice() else {
            return Err("expected host:port*user*password".to_string());
        };
        let mut url = Url::parse(&format!("http://{host_port}")).map_err(|e| e.to_string())?;
        url.set_username(user)
            .map_err(|()| "username cannot be set".to_string())?;
        url.set_password(Some(*password))
            .map_err(|()| "password cannot be set".to_string())?;
        url
    };

    if url.host_str().is_none_or(str::is_empty) {
        return Err("missing host".to_string());
    }
    match url.scheme() {
        "http" | "https" | "socks5" | "socks5h" => Ok(url.to_string()),
        other => Err(format!("unsupported proxy scheme '{other}'")),
    }
}

fn number(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> Result<u64, AppError> {
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            AppError::ConfigError(format!(
                "Invalid {name} '{raw}': must be a non-negative integer"
            ))
        }),
    }
}

fn positive(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: usize,
) -> Result<usize, AppError> {
    let Some(raw) = get(name) else {
        return Ok(default);
    };
    let parsed: usize = raw.parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {name} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{name} must be at least 1")));
    }
    Ok(parsed)
}

fn flag(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> Result<bool, AppError> {
    let Some(raw) = get(name) else {
        return Ok(default);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::ConfigError(format!(
            "Invalid {name} '{raw}': expected true or false"
        ))),
    }
}
