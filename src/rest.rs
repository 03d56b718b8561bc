//! Kraken REST client: envelope unwrapping and signed requests.
//!
//! Every Kraken REST response is wrapped in `{"error": [...], "result": T}`.
//! Entries in `error` starting with `E` are hard errors that fail the call;
//! any other entry is a warning that is logged while the call still
//! succeeds. Only the endpoints the realtime client depends on are wrapped
//! here; everything else goes through [`RestClient::send_http_request`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::Result;
use crate::auth::{SigningContext, is_auth_error};

const TOKEN_PATH: &str = "/0/private/GetWebSocketsToken";

/// The `error` member is a string on some endpoints and a list on others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    One(String),
    Many(Vec<String>),
}

impl ErrorField {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) if s.is_empty() => Vec::new(),
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Option<ErrorField>,
    result: Option<T>,
}

/// Splits envelope messages into `(errors, warnings)` by their leading
/// severity character.
#[must_use]
pub fn split_messages(messages: Vec<String>) -> (Vec<String>, Vec<String>) {
    messages.into_iter().partition(|m| m.starts_with('E'))
}

/// Result of `/0/public/Time`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerTime {
    pub unixtime: i64,
    pub rfc1123: String,
}

/// Result of `/0/public/SystemStatus`.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemStatusInfo {
    /// `online`, `maintenance`, `cancel_only` or `post_only`.
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct TokenResult {
    token: String,
    #[serde(default)]
    expires: u64,
}

/// HTTP client for the Kraken REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    signing: Arc<SigningContext>,
}

impl RestClient {
    /// Builds a client for `base_url` (e.g. `https://api.kraken.com`).
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Tls`](crate::LinkError::Tls) if the HTTP client
    /// cannot be built.
    pub fn new(
        base_url: &str,
        tls_config: rustls::ClientConfig,
        signing: Arc<SigningContext>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls_config)
            .timeout(timeout)
            .build()
            .map_err(|e| crate::LinkError::Tls(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            signing,
        })
    }

    /// Returns the signing context shared with the WebSocket client.
    #[must_use]
    pub fn signing(&self) -> &Arc<SigningContext> {
        &self.signing
    }

    /// Sends a request and unwraps the response envelope into `T`.
    ///
    /// `GET` requests are public and carry `params` as a query string.
    /// `POST` requests are signed: `params` and a fresh nonce are sent as a
    /// form body with `API-Key` and `API-Sign` headers.
    ///
    /// # Errors
    ///
    /// - transport failures as [`LinkError::Http`](crate::LinkError::Http)
    /// - rejected credentials as [`LinkError::Auth`](crate::LinkError::Auth)
    /// - other `E` errors as [`LinkError::Api`](crate::LinkError::Api)
    pub async fn send_http_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let request = if method == Method::GET {
            self.http.get(&url).query(params)
        } else {
            let signed = self.signing.sign_request(path, params)?;
            debug!(path, nonce = signed.nonce, "Sending signed request");
            self.http
                .request(method, &url)
                .header("API-Key", signed.api_key)
                .header("API-Sign", signed.signature)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(signed.body)
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(crate::LinkError::Api(vec![format!(
                    "HTTP {status} from {path}"
                )]));
            }
        };

        let messages = envelope.error.map(ErrorField::into_vec).unwrap_or_default();
        let (errors, warnings) = split_messages(messages);

        for warning in &warnings {
            warn!(path, warning = warning.as_str(), "Kraken API warning");
        }

        if !errors.is_empty() {
            if errors.iter().any(|e| is_auth_error(e)) {
                self.signing.invalidate_token();
                return Err(crate::LinkError::Auth(errors.join(", ")));
            }
            return Err(crate::LinkError::Api(errors));
        }

        envelope.result.ok_or_else(|| {
            crate::LinkError::MalformedMessage(format!("missing result in response from {path}"))
        })
    }

    /// Fetches the exchange server time.
    ///
    /// # Errors
    ///
    /// See [`RestClient::send_http_request`].
    pub async fn server_time(&self) -> Result<ServerTime> {
        self.send_http_request(Method::GET, "/0/public/Time", &[])
            .await
    }

    /// Fetches the exchange system status.
    ///
    /// # Errors
    ///
    /// See [`RestClient::send_http_request`].
    pub async fn system_status(&self) -> Result<SystemStatusInfo> {
        self.send_http_request(Method::GET, "/0/public/SystemStatus", &[])
            .await
    }

    /// Fetches a fresh WebSocket authentication token and caches it in the
    /// signing context.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::MissingCredentials`](crate::LinkError::MissingCredentials)
    /// without credentials, otherwise see [`RestClient::send_http_request`].
    pub async fn get_websockets_token(&self) -> Result<String> {
        let result: TokenResult = self
            .send_http_request(Method::POST, TOKEN_PATH, &[])
            .await?;
        if result.token.is_empty() {
            return Err(crate::LinkError::Auth(
                "empty token in GetWebSocketsToken response".into(),
            ));
        }

        info!(expires = result.expires, "Obtained WebSocket authentication token");
        self.signing.store_token(result.token.clone());
        Ok(result.token)
    }

    /// Returns the cached WS token, fetching a new one when it is missing
    /// or about to expire.
    ///
    /// # Errors
    ///
    /// See [`RestClient::get_websockets_token`].
    pub async fn ws_token(&self) -> Result<String> {
        match self.signing.cached_token() {
            Some(token) => Ok(token),
            None => self.get_websockets_token().await,
        }
    }
}
