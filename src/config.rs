//! Application configuration loaded from environment variables.
//!
//! Credentials are optional and read from:
//! - `KRAKEN_API_KEY` - API key for Kraken authentication
//! - `KRAKEN_API_SECRET` - base64 API secret for Kraken authentication
//!
//! Endpoints and timing can be overridden with `KRAKEN_WEBSOCKET_URL`,
//! `KRAKEN_WEBSOCKET_AUTH_URL`, `KRAKEN_REST_URL`,
//! `KRAKEN_PING_INTERVAL_SECS`, `KRAKEN_REQUEST_TIMEOUT_SECS` and
//! `KRAKEN_CA_PEM` (path to a pinned CA bundle).

use std::path::PathBuf;
use std::time::Duration;

/// Default public WebSocket endpoint.
pub const DEFAULT_WEBSOCKET_URL: &str = "wss://ws.kraken.com";

/// Default authenticated WebSocket endpoint.
pub const DEFAULT_WEBSOCKET_AUTH_URL: &str = "wss://ws-auth.kraken.com";

/// Default REST endpoint.
pub const DEFAULT_REST_URL: &str = "https://api.kraken.com";

const DEFAULT_PING_INTERVAL_SECS: u64 = 27;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub kraken: KrakenConfig,
}

/// Kraken-specific configuration values.
#[derive(Debug, Clone)]
pub struct KrakenConfig {
    pub websocket_url: String,
    pub websocket_auth_url: String,
    pub rest_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Keepalive cadence for both sockets.
    pub ping_interval: Duration,
    /// Upper bound on every correlated request.
    pub request_timeout: Duration,
    pub ca_pem: Option<PathBuf>,
}

impl Default for KrakenConfig {
    fn default() -> Self {
        Self {
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            websocket_auth_url: DEFAULT_WEBSOCKET_AUTH_URL.to_string(),
            rest_url: DEFAULT_REST_URL.to_string(),
            api_key: None,
            api_secret: None,
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            ca_pem: None,
        }
    }
}

impl KrakenConfig {
    /// Returns `true` if both API credentials are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}

/// Loads the application configuration from environment variables.
///
/// API credentials are optional (unauthenticated mode) but when one is
/// set both must be present.
///
/// # Errors
///
/// Returns [`LinkError::Config`](crate::LinkError::Config) if only one of
/// the two credential variables is set or a numeric variable does not
/// parse.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let defaults = KrakenConfig::default();

    let api_key = non_empty_var("KRAKEN_API_KEY");
    let api_secret = non_empty_var("KRAKEN_API_SECRET");

    match (&api_key, &api_secret) {
        (Some(_), None) => {
            return Err(crate::LinkError::Config(
                "KRAKEN_API_KEY is set but KRAKEN_API_SECRET is missing".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(crate::LinkError::Config(
                "KRAKEN_API_SECRET is set but KRAKEN_API_KEY is missing".to_string(),
            ));
        }
        _ => {}
    }

    Ok(AppConfig {
        kraken: KrakenConfig {
            websocket_url: non_empty_var("KRAKEN_WEBSOCKET_URL").unwrap_or(defaults.websocket_url),
            websocket_auth_url: non_empty_var("KRAKEN_WEBSOCKET_AUTH_URL")
                .unwrap_or(defaults.websocket_auth_url),
            rest_url: non_empty_var("KRAKEN_REST_URL").unwrap_or(defaults.rest_url),
            api_key,
            api_secret,
            ping_interval: secs_var("KRAKEN_PING_INTERVAL_SECS")?
                .unwrap_or(defaults.ping_interval),
            request_timeout: secs_var("KRAKEN_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout),
            ca_pem: non_empty_var("KRAKEN_CA_PEM").map(PathBuf::from),
        },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Parses a positive number of seconds from an environment variable.
fn secs_var(name: &str) -> crate::Result<Option<Duration>> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(None);
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
        _ => Err(crate::LinkError::Config(format!(
            "{name} must be a positive number of seconds, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: [&str; 8] = [
        "KRAKEN_API_KEY",
        "KRAKEN_API_SECRET",
        "KRAKEN_WEBSOCKET_URL",
        "KRAKEN_WEBSOCKET_AUTH_URL",
        "KRAKEN_REST_URL",
        "KRAKEN_PING_INTERVAL_SECS",
        "KRAKEN_REQUEST_TIMEOUT_SECS",
        "KRAKEN_CA_PEM",
    ];

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Helper that clears all config vars, applies `vars`, runs `f`, then
    /// restores the originals.
    ///
    /// Serialized through `ENV_LOCK` so parallel test threads never
    /// observe each other's environment.
    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let originals: Vec<(&str, Option<String>)> = ALL_VARS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        for k in ALL_VARS {
            // SAFETY: env access is serialized by ENV_LOCK.
            unsafe { std::env::remove_var(k) };
        }
        for (k, v) in vars {
            if let Some(val) = v {
                // SAFETY: env access is serialized by ENV_LOCK.
                unsafe { std::env::set_var(k, val) };
            }
        }

        f();

        for (k, original) in originals {
            // SAFETY: restoring original values under the same lock.
            unsafe {
                match original {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn defaults_without_env_vars() {
        with_env(&[], || {
            let config = fetch_config().unwrap();
            assert_eq!(config.kraken.websocket_url, DEFAULT_WEBSOCKET_URL);
            assert_eq!(config.kraken.websocket_auth_url, DEFAULT_WEBSOCKET_AUTH_URL);
            assert_eq!(config.kraken.rest_url, DEFAULT_REST_URL);
            assert_eq!(config.kraken.ping_interval, Duration::from_secs(27));
            assert!(config.kraken.api_key.is_none());
            assert!(!config.kraken.has_credentials());
        });
    }

    #[test]
    fn loads_credentials_from_env() {
        with_env(
            &[
                ("KRAKEN_API_KEY", Some("test-key")),
                ("KRAKEN_API_SECRET", Some("test-secret")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.kraken.api_key.as_deref(), Some("test-key"));
                assert_eq!(config.kraken.api_secret.as_deref(), Some("test-secret"));
                assert!(config.kraken.has_credentials());
            },
        );
    }

    #[test]
    fn custom_endpoints_and_timing() {
        with_env(
            &[
                ("KRAKEN_WEBSOCKET_URL", Some("ws://127.0.0.1:9000")),
                ("KRAKEN_REST_URL", Some("http://127.0.0.1:9001")),
                ("KRAKEN_PING_INTERVAL_SECS", Some("5")),
                ("KRAKEN_REQUEST_TIMEOUT_SECS", Some("3")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.kraken.websocket_url, "ws://127.0.0.1:9000");
                assert_eq!(config.kraken.rest_url, "http://127.0.0.1:9001");
                assert_eq!(config.kraken.ping_interval, Duration::from_secs(5));
                assert_eq!(config.kraken.request_timeout, Duration::from_secs(3));
            },
        );
    }

    #[test]
    fn rejects_key_without_secret() {
        with_env(&[("KRAKEN_API_KEY", Some("key-only"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("KRAKEN_API_SECRET is missing"));
        });
    }

    #[test]
    fn rejects_secret_without_key() {
        with_env(&[("KRAKEN_API_SECRET", Some("secret-only"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("KRAKEN_API_KEY is missing"));
        });
    }

    #[test]
    fn rejects_zero_ping_interval() {
        with_env(&[("KRAKEN_PING_INTERVAL_SECS", Some("0"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("KRAKEN_PING_INTERVAL_SECS"));
        });
    }

    #[test]
    fn empty_values_treated_as_absent() {
        with_env(
            &[
                ("KRAKEN_API_KEY", Some("")),
                ("KRAKEN_API_SECRET", Some("")),
                ("KRAKEN_WEBSOCKET_URL", Some("")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.kraken.websocket_url, DEFAULT_WEBSOCKET_URL);
                assert!(config.kraken.api_key.is_none());
                assert!(config.kraken.api_secret.is_none());
            },
        );
    }
}
