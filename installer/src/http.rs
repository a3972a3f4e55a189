//! HTTP access for source resolution and package download.
//!
//! Provides a trait-based abstraction over the three requests the pipeline
//! needs (a metadata-only probe, a document fetch, and a streamed download)
//! so that tests can substitute canned responses without network access.

use crate::config::NetworkSettings;
use std::fmt;
use std::fs::File;
use std::path::Path;
use ureq::ResponseExt;
use ureq::http::header::CONTENT_TYPE;

/// Metadata reported by a metadata-only request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    /// HTTP status code of the final response.
    pub status: u16,
    /// The `Content-Type` header, if the server sent one.
    pub content_type: Option<String>,
    /// The URL that answered after following redirects.
    pub final_url: String,
}

/// A fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    /// The URL that answered after following redirects; relative links in
    /// the body resolve against it.
    pub final_url: String,
    /// The decoded body.
    pub body: String,
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReceipt {
    /// Number of bytes written to the destination file.
    pub bytes: u64,
    /// The URL that answered after following redirects.
    pub final_url: String,
}

/// A failed HTTP exchange, with whatever diagnostics the transport offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// The URL that was requested.
    pub url: String,
    /// HTTP status code, when the server answered with a non-success status.
    pub status: Option<u16>,
    /// URL of the final response after redirects, when known.
    pub final_url: Option<String>,
    /// Human-readable description of the failure.
    pub reason: String,
}

impl TransportError {
    /// Build an error for `url` without status information.
    #[must_use]
    pub fn new(url: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_owned(),
            status: None,
            final_url: None,
            reason: reason.into(),
        }
    }

    /// Build an error for a non-success status code.
    #[must_use]
    pub fn status(url: &str, status: u16) -> Self {
        Self {
            url: url.to_owned(),
            status: Some(status),
            final_url: None,
            reason: format!("server answered HTTP {status}"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request to {} failed: {}", self.url, self.reason)?;
        if let Some(final_url) = self.final_url.as_deref().filter(|u| *u != self.url) {
            write!(f, " (final URL {final_url})")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportError {}

/// HTTP operations consumed by the pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient {
    /// Issue a metadata-only request (no body) for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection failure, timeout, or a
    /// non-success status.
    fn probe(&self, url: &str) -> Result<ResponseMeta, TransportError>;

    /// Fetch `url` and return the body as text, with the URL that served it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection failure, timeout, a
    /// non-success status, or an unreadable body.
    fn fetch_text(&self, url: &str) -> Result<TextDocument, TransportError>;

    /// Stream the body of `url` into a new file at `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on any transfer failure, including failure
    /// to create or write `dest`.
    fn download_to(&self, url: &str, dest: &Path) -> Result<DownloadReceipt, TransportError>;
}

/// Production client built on a shared `ureq` agent.
pub struct UreqHttpClient {
    agent: ureq::Agent,
}

impl UreqHttpClient {
    /// Build a client whose timeouts come from `settings`.
    #[must_use]
    pub fn new(settings: &NetworkSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(settings.connect_timeout()))
            .timeout_global(Some(settings.request_timeout()))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl HttpClient for UreqHttpClient {
    fn probe(&self, url: &str) -> Result<ResponseMeta, TransportError> {
        let response = self
            .agent
            .head(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Ok(ResponseMeta {
            status: response.status().as_u16(),
            content_type,
            final_url: response.get_uri().to_string(),
        })
    }

    fn fetch_text(&self, url: &str) -> Result<TextDocument, TransportError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let final_url = response.get_uri().to_string();
        match response.into_body().read_to_string() {
            Ok(body) => Ok(TextDocument { final_url, body }),
            Err(e) => Err(TransportError {
                final_url: Some(final_url),
                ..TransportError::new(url, e.to_string())
            }),
        }
    }

    fn download_to(&self, url: &str, dest: &Path) -> Result<DownloadReceipt, TransportError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let final_url = response.get_uri().to_string();
        let with_final = |reason: String| TransportError {
            final_url: Some(final_url.clone()),
            ..TransportError::new(url, reason)
        };

        let mut file = File::create(dest)
            .map_err(|e| with_final(format!("cannot create {}: {e}", dest.display())))?;
        let bytes = std::io::copy(&mut response.into_body().as_reader(), &mut file)
            .map_err(|e| with_final(format!("transfer interrupted: {e}")))?;
        file.sync_all()
            .map_err(|e| with_final(format!("cannot flush {}: {e}", dest.display())))?;

        Ok(DownloadReceipt {
            bytes,
            final_url: final_url.clone(),
        })
    }
}

/// Map a ureq error to a [`TransportError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> TransportError {
    match err {
        ureq::Error::StatusCode(code) => TransportError::status(url, *code),
        other => TransportError::new(url, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::not_found(404)]
    #[case::server_error(503)]
    fn status_errors_keep_the_code(#[case] code: u16) {
        let err = ureq::Error::StatusCode(code);
        let mapped = map_ureq_error("https://example.test/upd.exe", &err);
        assert_eq!(mapped.status, Some(code));
        assert!(mapped.reason.contains(&code.to_string()));
    }

    #[test]
    fn other_errors_have_no_status() {
        let err = ureq::Error::HostNotFound;
        let mapped = map_ureq_error("https://example.test/upd.exe", &err);
        assert_eq!(mapped.status, None);
    }

    #[test]
    fn display_mentions_redirect_target() {
        let err = TransportError {
            final_url: Some("https://mirror.example.test/upd.exe".to_owned()),
            ..TransportError::status("https://example.test/upd.exe", 403)
        };
        let text = err.to_string();
        assert!(text.contains("https://example.test/upd.exe"));
        assert!(text.contains("HTTP 403"));
        assert!(text.contains("final URL https://mirror.example.test/upd.exe"));
    }

    #[test]
    fn display_omits_unchanged_final_url() {
        let err = TransportError {
            final_url: Some("https://example.test/a.zip".to_owned()),
            ..TransportError::new("https://example.test/a.zip", "connection reset")
        };
        assert!(!err.to_string().contains("final URL"));
    }
}
