// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP client wrapper with authentication, WebDAV extension methods and
//! `ETag` handling.

use reqwest::{Client, Method, RequestBuilder, Response, redirect};

use crate::config::{AuthMethod, CardDavConfig};
use crate::error::CardDavError;
use crate::types::ETag;

/// HTTP client for `CardDAV` operations.
///
/// Redirect following is disabled so the discovery state machine can vet
/// every redirect before following it.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    config: CardDavConfig,
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: CardDavConfig) -> Result<Self, CardDavError> {
        let mut builder = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::none());
        if config.ignore_ssl_errors {
            tracing::debug!("ignoring SSL certificate errors due to account policy");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build()?;
        Ok(Self { client, config })
    }

    /// Resolves a WebDAV extension method name (`PROPFIND`, `REPORT`).
    pub fn extension_method(name: &str) -> Result<Method, CardDavError> {
        Method::from_bytes(name.as_bytes())
            .map_err(|e| CardDavError::Http(format!("invalid method {name}: {e}")))
    }

    /// Builds a request with authentication headers.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut req = self.client.request(method, url);

        match &self.config.auth {
            AuthMethod::Basic { username, password } => {
                req = req.basic_auth(username, Some(password));
            }
            AuthMethod::Bearer { token } => {
                req = req.bearer_auth(token);
            }
            AuthMethod::None => {}
        }

        req
    }

    /// Builds a PROPFIND request with the given depth and XML body.
    pub fn propfind(&self, url: &str, depth: &str, body: String) -> Result<RequestBuilder, CardDavError> {
        Ok(self
            .request(Self::extension_method("PROPFIND")?, url)
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", depth)
            .body(body))
    }

    /// Builds a REPORT request with an XML body and an optional depth.
    pub fn report(
        &self,
        url: &str,
        depth: Option<&str>,
        body: String,
    ) -> Result<RequestBuilder, CardDavError> {
        let mut req = self
            .request(Self::extension_method("REPORT")?, url)
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(body);
        if let Some(depth) = depth {
            req = req.header("Depth", depth);
        }
        Ok(req)
    }

    /// Sends a request, surfacing only transport-level failures.
    ///
    /// HTTP status handling is left to the caller; discovery treats 404/405
    /// and redirects as state-machine transitions rather than errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent at all.
    pub async fn send(&self, req: RequestBuilder) -> Result<Response, CardDavError> {
        Ok(req.send().await?)
    }

    /// Maps a non-success status to an error: 401 becomes
    /// [`CardDavError::Unauthorized`], other non-2xx statuses become
    /// [`CardDavError::UnexpectedStatus`].
    pub fn check_status(resp: &Response) -> Result<(), CardDavError> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            Err(CardDavError::Unauthorized)
        } else {
            Err(CardDavError::UnexpectedStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            })
        }
    }

    /// Adds an `If-Match` header for conditional writes.
    pub fn if_match(req: RequestBuilder, etag: &ETag) -> RequestBuilder {
        req.header("If-Match", etag.as_str())
    }

    /// Extracts the `ETag` response header, if present.
    ///
    /// Header lookup is case-insensitive; some servers reply `etag` or
    /// `Etag`.
    #[must_use]
    pub fn response_etag(resp: &Response) -> Option<ETag> {
        resp.headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(|s| ETag::new(s.to_string()))
    }
}
