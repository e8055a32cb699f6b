// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// `CardDAV` engine errors.
#[non_exhaustive]
#[derive(Debug)]
pub enum CardDavError {
    /// HTTP transport error (network, DNS, SSL).
    Http(String),

    /// The server answered 401; the account credentials need a refresh.
    Unauthorized,

    /// An unexpected HTTP status outside the discovery fallback paths.
    UnexpectedStatus {
        /// The HTTP status code.
        status: u16,
        /// The request URL.
        url: String,
    },

    /// Discovery exhausted the well-known and root fallbacks without finding
    /// a principal or an addressbook home.
    DiscoveryFailed(String),

    /// A circular or host-changing redirect was refused as potentially
    /// hostile.
    RedirectRefused {
        /// The URL the redirecting request targeted.
        from: String,
        /// The redirect target.
        to: String,
    },

    /// XML parsing/writing error, or a response missing required elements.
    Xml(String),

    /// vCard conversion failure.
    Vcard(String),

    /// A contact violated a sync-state invariant (e.g. a modified contact
    /// without the compound GUID prefix).
    InvalidState(String),

    /// Configuration error.
    Config(String),
}

impl fmt::Display for CardDavError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Unauthorized => write!(f, "authentication required (HTTP 401)"),
            Self::UnexpectedStatus { status, url } => {
                write!(f, "unexpected HTTP status {status} from {url}")
            }
            Self::DiscoveryFailed(e) => write!(f, "CardDAV discovery failed: {e}"),
            Self::RedirectRefused { from, to } => {
                write!(f, "refusing redirect from {from} to {to}")
            }
            Self::Xml(e) => write!(f, "XML error: {e}"),
            Self::Vcard(e) => write!(f, "vCard conversion error: {e}"),
            Self::InvalidState(e) => write!(f, "sync state invariant violated: {e}"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
        }
    }
}

impl std::error::Error for CardDavError {}

impl From<reqwest::Error> for CardDavError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<quick_xml::Error> for CardDavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<std::io::Error> for CardDavError {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(format!("IO error: {e}"))
    }
}

impl From<url::ParseError> for CardDavError {
    fn from(e: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {e}"))
    }
}

impl From<cardsync_vcard::Error> for CardDavError {
    fn from(e: cardsync_vcard::Error) -> Self {
        Self::Vcard(e.to_string())
    }
}
