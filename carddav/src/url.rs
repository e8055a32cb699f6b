// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! URL composition rules for `CardDAV` requests.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

use crate::error::CardDavError;

/// Everything but unreserved characters, for encoding vCard filenames.
const FILENAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Parses an account server address into an absolute URL.
///
/// Scheme-less addresses such as `carddav.example.net` default to `https://`.
pub fn normalize_server_url(input: &str) -> Result<Url, CardDavError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CardDavError::Config("server url is empty".to_string()));
    }

    match Url::parse(trimmed) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Url::parse(&format!(
            "https://{trimmed}/"
        ))?),
        Err(e) => Err(e.into()),
    }
}

/// Replaces the path of `base` with a server-relative `path`.
///
/// Servers sometimes return paths in percent-encoded form (`%40` for `@`);
/// such paths are eagerly decoded so the URL layer re-encodes them once.
#[must_use]
pub fn with_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    if path.is_empty() {
        return url;
    }

    let decoded;
    let mut path = if path.contains("%40") {
        decoded = percent_decode(path);
        decoded.as_str()
    } else {
        path
    };

    let prefixed;
    if !path.starts_with('/') {
        prefixed = format!("/{path}");
        path = &prefixed;
    }
    url.set_path(path);
    url
}

/// The `/.well-known/carddav` bootstrap URL for the host of `base`.
#[must_use]
pub fn well_known(base: &Url) -> Url {
    let mut url = base.clone();
    url.set_path("/.well-known/carddav");
    url.set_query(None);
    url
}

/// The root URL for the host of `base`.
#[must_use]
pub fn root(base: &Url) -> Url {
    let mut url = base.clone();
    url.set_path("/");
    url.set_query(None);
    url
}

/// The verdict on a redirect received during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectCheck {
    /// Safe to follow.
    Allowed,
    /// No URL component changed; following would loop forever.
    Circular,
    /// Host change or unsanctioned cross-path redirect.
    Refused,
}

/// Vets a discovery redirect.
///
/// The only sanctioned cross-path redirect is away from the
/// `.well-known/carddav` bootstrap path; host changes are treated as
/// potentially hostile.
#[must_use]
pub fn check_redirect(orig: &Url, redir: &Url) -> RedirectCheck {
    let host_changed = orig.host_str() != redir.host_str();
    let path_changed = orig.path() != redir.path();
    let scheme_changed = orig.scheme() != redir.scheme();
    let port_changed = orig.port_or_known_default() != redir.port_or_known_default();
    let valid_path_redirect =
        orig.path().ends_with(".well-known/carddav") || orig.path() == redir.path();

    if !host_changed && !path_changed && !scheme_changed && !port_changed {
        RedirectCheck::Circular
    } else if host_changed || !valid_path_redirect {
        RedirectCheck::Refused
    } else {
        RedirectCheck::Allowed
    }
}

/// Percent-decodes a server-supplied path.
#[must_use]
pub fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Trailing-slash-insensitive path equality.
#[must_use]
pub fn paths_equivalent(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/') && !a.is_empty() && !b.is_empty()
}

/// Composes the href for one multiget member.
///
/// The final path segment is percent-encoded. URIs that neither end in
/// `.vcf` nor live under the addressbook path are treated as bare UIDs and
/// expanded to `<path>/<uid>.vcf`.
#[must_use]
pub fn multiget_href(addressbook_path: &str, uri: &str) -> String {
    let encoded = encode_last_segment(uri);
    if uri.starts_with(addressbook_path) {
        encoded
    } else {
        format!("{addressbook_path}/{encoded}.vcf")
    }
}

fn encode_last_segment(uri: &str) -> String {
    match uri.rfind('/') {
        Some(pos) if pos > 0 => {
            let (dir, name) = uri.split_at(pos + 1);
            format!("{dir}{}", utf8_percent_encode(name, FILENAME))
        }
        _ => uri.to_string(),
    }
}

/// Whether a response href carries a recognized non-vCard suffix
/// (`.ics`, `.eml`, ...), marking it as a non-contact resource.
#[must_use]
pub fn has_non_vcf_suffix(uri: &str) -> bool {
    let bytes = uri.as_bytes();
    if bytes.len() <= 5 {
        return false;
    }
    let dot_suffix =
        bytes[bytes.len() - 4] == b'.' || bytes[bytes.len() - 3] == b'.';
    dot_suffix && !uri.to_ascii_lowercase().ends_with(".vcf")
}
