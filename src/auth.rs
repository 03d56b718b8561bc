//! Kraken request signing and WebSocket token lifetime.
//!
//! Authenticated REST calls carry an `API-Key` header and an `API-Sign`
//! header computed from a strictly increasing nonce. Authenticated
//! WebSocket channels and order actions instead carry a short-lived token
//! obtained via the
//! [`GetWebSocketsToken`](https://docs.kraken.com/api/docs/rest-api/get-websockets-token)
//! REST endpoint. The token is valid for 15 minutes after creation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use base64::prelude::*;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::Result;

/// Token is valid for 15 minutes; refresh 1 minute before expiry.
pub const TOKEN_REFRESH_AFTER: Duration = Duration::from_secs(14 * 60);

/// API key and secret pair.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: Zeroizing<String>,
}

impl Credentials {
    /// Creates a credential pair. The secret is the base64 string issued
    /// by Kraken.
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: Zeroizing::new(api_secret.into()),
        }
    }

    /// Returns the raw API key sent in the `API-Key` header.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Headers and body for one signed REST call.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub api_key: String,
    pub signature: String,
    pub nonce: u64,
    /// Form-encoded body, `nonce` included.
    pub body: String,
}

#[derive(Clone)]
struct WsToken {
    value: Zeroizing<String>,
    fetched_at: Instant,
}

/// Per-client signing state: credentials, nonce counter and WS token.
///
/// Each client owns its own context, so two accounts in one process never
/// share a nonce sequence.
pub struct SigningContext {
    credentials: Option<Credentials>,
    last_nonce: AtomicU64,
    token: Mutex<Option<WsToken>>,
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("credentials", &self.credentials)
            .field("last_nonce", &self.last_nonce.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SigningContext {
    /// Creates a context; `None` means public endpoints only.
    #[must_use]
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            last_nonce: AtomicU64::new(0),
            token: Mutex::new(None),
        }
    }

    /// Returns `true` if credentials are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Returns a strictly monotonically-increasing nonce with nanosecond
    /// resolution.
    ///
    /// Uses the wall-clock as the baseline but guarantees that successive
    /// calls always return a value larger than the previous one, even when
    /// the clock resolution is too coarse or the clock jumps backwards.
    pub fn next_nonce(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let mut prev = self.last_nonce.load(Ordering::Relaxed);
        loop {
            let nonce = now.max(prev + 1);
            match self.last_nonce.compare_exchange_weak(
                prev,
                nonce,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return nonce,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Signs a private REST call to `path` with the given form parameters.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::MissingCredentials`](crate::LinkError::MissingCredentials)
    /// without credentials, or [`LinkError::Auth`](crate::LinkError::Auth)
    /// if the secret is not valid base64.
    pub fn sign_request(&self, path: &str, params: &[(&str, String)]) -> Result<SignedRequest> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(crate::LinkError::MissingCredentials)?;

        let nonce = self.next_nonce();
        let mut form: Vec<(&str, String)> = Vec::with_capacity(params.len() + 1);
        form.push(("nonce", nonce.to_string()));
        form.extend(params.iter().cloned());
        let body = serde_urlencoded::to_string(&form)
            .map_err(|e| crate::LinkError::Auth(format!("failed to encode body: {e}")))?;

        let signature = sign(&credentials.api_secret, path, nonce, &body)?;

        Ok(SignedRequest {
            api_key: credentials.api_key.clone(),
            signature,
            nonce,
            body,
        })
    }

    /// Returns the cached WS token if it is still fresh.
    #[must_use]
    pub fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|t| t.fetched_at.elapsed() < TOKEN_REFRESH_AFTER)
            .map(|t| t.value.to_string())
    }

    /// Stores a freshly fetched WS token.
    pub fn store_token(&self, token: String) {
        let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(WsToken {
            value: Zeroizing::new(token),
            fetched_at: Instant::now(),
        });
        debug!("Stored WebSocket authentication token");
    }

    /// Drops the WS token so the next authenticated action fetches a new one.
    pub fn invalidate_token(&self) {
        let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            warn!("WebSocket authentication token invalidated");
        }
    }
}

/// Computes the `API-Sign` header value.
///
/// Algorithm: `Base64(HMAC-SHA512(Base64Decode(secret), path + SHA256(nonce + post_data)))`
///
/// # Errors
///
/// Returns [`LinkError::Auth`](crate::LinkError::Auth) if the secret is not
/// valid base64.
pub fn sign(api_secret: &str, path: &str, nonce: u64, post_data: &str) -> Result<String> {
    let secret = Zeroizing::new(
        BASE64_STANDARD
            .decode(api_secret)
            .map_err(|e| crate::LinkError::Auth(format!("invalid base64 api_secret: {e}")))?,
    );

    let mut sha256 = Sha256::new();
    sha256.update(format!("{nonce}{post_data}").as_bytes());
    let sha256_digest = sha256.finalize();

    let mut hmac_input = Vec::from(path.as_bytes());
    hmac_input.extend_from_slice(&sha256_digest);

    let mut mac = Hmac::<Sha512>::new_from_slice(&secret)
        .map_err(|e| crate::LinkError::Auth(format!("invalid HMAC key: {e}")))?;
    mac.update(&hmac_input);
    let result = mac.finalize().into_bytes();

    Ok(BASE64_STANDARD.encode(result))
}

/// Returns `true` if an exchange error string means the key, signature,
/// nonce or token was rejected.
#[must_use]
pub fn is_auth_error(message: &str) -> bool {
    message.starts_with("EAPI:Invalid key")
        || message.starts_with("EAPI:Invalid signature")
        || message.starts_with("EAPI:Invalid nonce")
        || message.starts_with("EAuth")
        || message.starts_with("ESession:Invalid session")
        || message.starts_with("EGeneral:Permission denied")
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL_PATH: &str = "/0/private/GetWebSocketsToken";

    #[test]
    fn sign_produces_deterministic_output() {
        let secret = BASE64_STANDARD.encode([0u8; 32]);
        let nonce = 1_000_000_000_000u64;
        let post_data = "nonce=1000000000000";

        let sig1 = sign(&secret, URL_PATH, nonce, post_data).unwrap();
        let sig2 = sign(&secret, URL_PATH, nonce, post_data).unwrap();
        assert_eq!(sig1, sig2);

        // HMAC-SHA512 output is 64 bytes.
        assert_eq!(BASE64_STANDARD.decode(&sig1).unwrap().len(), 64);
    }

    #[test]
    fn sign_matches_kraken_documentation_example() {
        let secret = "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";
        let post_data = "nonce=1616492376594&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25";

        let sig = sign(secret, "/0/private/AddOrder", 1616492376594, post_data).unwrap();
        assert_eq!(
            sig,
            "4/dpxb3iT4tp/ZCVEwSnEsLxx0bqyhLpdfOpc6fn7OR8+UClSV5n9E6aSS8MPtnRfp32bAb0nmbRn6H8ndwLUQ=="
        );
    }

    #[test]
    fn sign_rejects_invalid_base64_secret() {
        let result = sign("not-valid-base64!!!", URL_PATH, 123, "nonce=123");
        assert!(matches!(result, Err(crate::LinkError::Auth(_))));
    }

    #[test]
    fn next_nonce_is_strictly_monotonic() {
        let ctx = SigningContext::new(None);
        let mut prev = ctx.next_nonce();
        for _ in 0..1_000 {
            let current = ctx.next_nonce();
            assert!(current > prev, "nonce did not increase: {prev} -> {current}");
            prev = current;
        }
    }

    #[test]
    fn contexts_do_not_share_nonce_state() {
        let a = SigningContext::new(None);
        let b = SigningContext::new(None);
        a.last_nonce.store(u64::MAX / 2, Ordering::Relaxed);

        assert!(b.next_nonce() < u64::MAX / 2);
    }

    #[test]
    fn sign_request_puts_nonce_first_in_body() {
        let secret = BASE64_STANDARD.encode([7u8; 64]);
        let ctx = SigningContext::new(Some(Credentials::new("key", secret)));

        let signed = ctx
            .sign_request("/0/private/Balance", &[("asset", "XBT".to_string())])
            .unwrap();

        assert_eq!(signed.api_key, "key");
        assert_eq!(signed.body, format!("nonce={}&asset=XBT", signed.nonce));
    }

    #[test]
    fn sign_request_without_credentials_fails() {
        let ctx = SigningContext::new(None);
        let result = ctx.sign_request("/0/private/Balance", &[]);
        assert!(matches!(result, Err(crate::LinkError::MissingCredentials)));
    }

    #[test]
    fn token_cache_and_invalidation() {
        let ctx = SigningContext::new(None);
        assert!(ctx.cached_token().is_none());

        ctx.store_token("abc".into());
        assert_eq!(ctx.cached_token().as_deref(), Some("abc"));

        ctx.invalidate_token();
        assert!(ctx.cached_token().is_none());
    }

    #[test]
    fn classifies_auth_errors() {
        assert!(is_auth_error("EAPI:Invalid nonce"));
        assert!(is_auth_error("ESession:Invalid session"));
        assert!(!is_auth_error("EOrder:Unknown order"));
    }
}
