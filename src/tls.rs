//! TLS client configuration shared by the REST and WebSocket clients.
//!
//! By default the webpki root set is trusted. When a CA bundle path is
//! configured, only the certificates in that bundle are trusted, which
//! pins the chain for `ws.kraken.com`, `ws-auth.kraken.com` and
//! `api.kraken.com`.

use std::path::Path;

use rustls::ClientConfig;

use crate::Result;

/// Builds a [`ClientConfig`] for outgoing connections.
///
/// # Errors
///
/// Returns [`LinkError::Tls`](crate::LinkError::Tls) if the CA bundle
/// cannot be read, cannot be parsed, or contains no certificate.
pub fn build_tls_config(ca_pem: Option<&Path>) -> Result<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();

    match ca_pem {
        Some(path) => {
            let pem = std::fs::read(path).map_err(|e| {
                crate::LinkError::Tls(format!("failed to read CA PEM {}: {e}", path.display()))
            })?;

            let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| crate::LinkError::Tls(format!("failed to parse CA PEM: {e}")))?;

            let (added, _ignored) = root_store.add_parsable_certificates(certs);
            if added == 0 {
                return Err(crate::LinkError::Tls(format!(
                    "no usable certificate in {}",
                    path.display()
                )));
            }
        }
        None => root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let config = ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
        .with_safe_default_protocol_versions()
        .map_err(|e| crate::LinkError::Tls(format!("unsupported protocol versions: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builds_with_webpki_roots() {
        assert!(build_tls_config(None).is_ok());
    }

    #[test]
    fn rejects_missing_file() {
        let err = build_tls_config(Some(Path::new("/nonexistent/ca.pem"))).unwrap_err();
        assert!(err.to_string().contains("failed to read CA PEM"));
    }

    #[test]
    fn rejects_bundle_without_certificates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let err = build_tls_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("no usable certificate"));
    }
}
