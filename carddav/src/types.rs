// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;

use cardsync_vcard::Contact;

/// Server resource path.
///
/// A `Href` represents the percent-decoded path of a resource on a `CardDAV`
/// server, such as `/addressbooks/johndoe/contacts/abc.vcf`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Href(String);

impl Href {
    /// Creates a new `Href` from a string.
    #[must_use]
    pub const fn new(href: String) -> Self {
        Self(href)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Href {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Href {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Href {
    fn from(href: String) -> Self {
        Self(href)
    }
}

impl From<&str> for Href {
    fn from(href: &str) -> Self {
        Self(href.to_string())
    }
}

/// Entity tag for change detection.
///
/// An `ETag` is an opaque per-resource version tag, used with `If-Match` for
/// optimistic concurrency control and compared for delta detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ETag(String);

impl ETag {
    /// Creates a new `ETag` from a string.
    #[must_use]
    pub const fn new(etag: String) -> Self {
        Self(etag)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ETag {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ETag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ETag {
    fn from(etag: String) -> Self {
        Self(etag)
    }
}

impl From<&str> for ETag {
    fn from(etag: &str) -> Self {
        Self(etag.to_string())
    }
}

/// One remote address book collection.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    /// Percent-decoded server path of the collection.
    pub url: Href,
    /// Human-readable collection name.
    pub display_name: Option<String>,
    /// Collection tag; changes whenever any member resource changes.
    pub ctag: Option<String>,
    /// RFC 6578 sync token; presence implies webdav-sync support.
    pub sync_token: Option<String>,
    /// Derived from `DAV:current-user-privilege-set` (no write privilege).
    pub read_only: bool,
}

impl AddressBook {
    /// Creates an address book descriptor for a server path.
    #[must_use]
    pub fn new(url: Href) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }
}

/// How a remote resource changed relative to the last sync checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Resource unknown locally.
    Added,
    /// Resource known locally with a different etag.
    Modified,
    /// Resource known locally but gone from the server.
    Removed,
    /// Resource known locally with the same etag.
    Unmodified,
}

/// Lightweight per-contact remote descriptor.
#[derive(Debug, Clone)]
pub struct ResourceChange {
    /// Percent-decoded resource path.
    pub uri: Href,
    /// Server etag, when reported.
    pub etag: Option<ETag>,
    /// Classification against the local uri→etag map.
    pub change: ChangeType,
}

/// The outcome of one per-collection delta stage.
#[derive(Debug, Clone, Default)]
pub struct CollectionDelta {
    /// Remotely added contacts, fully fetched.
    pub additions: Vec<Contact>,
    /// Remotely modified contacts, fully fetched.
    pub modifications: Vec<Contact>,
    /// Remotely removed resources.
    pub removals: Vec<ResourceChange>,
    /// Resources unchanged since the checkpoint.
    pub unmodified: Vec<ResourceChange>,
    /// Every remote URI seen during delta detection, used to suppress
    /// duplicate uploads of partial-upsync artifacts.
    pub known_uris: HashSet<String>,
    /// The sync token to checkpoint for this collection.
    pub sync_token: Option<String>,
}

impl CollectionDelta {
    /// Whether the delta carries no remote changes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.modifications.is_empty() && self.removals.is_empty()
    }
}

/// Contacts to persist locally after a completed upsync, carrying compound
/// GUIDs and any etags refreshed from `PUT` response headers.
#[derive(Debug, Clone, Default)]
pub struct UpsyncOutcome {
    /// Echoes of uploaded additions.
    pub additions: Vec<Contact>,
    /// Echoes of uploaded modifications.
    pub modifications: Vec<Contact>,
}
