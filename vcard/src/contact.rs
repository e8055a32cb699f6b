// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Store-neutral contact model produced by the codec.

use jiff::Timestamp;
use jiff::civil::Date;

/// Structured name, mirroring the five components of the vCard `N` property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Name {
    /// Family name (surname).
    pub family: String,
    /// Given name.
    pub given: String,
    /// Additional (middle) names.
    pub additional: String,
    /// Honorific prefix.
    pub prefix: String,
    /// Honorific suffix.
    pub suffix: String,
}

impl Name {
    /// Whether no name component carries any data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.family.is_empty()
            && self.given.is_empty()
            && self.additional.is_empty()
            && self.prefix.is_empty()
            && self.suffix.is_empty()
    }

    /// Derives a structured name from a display label by splitting on
    /// whitespace. A single token becomes the given name; two become
    /// given + family; more fill the additional slot in between.
    #[must_use]
    pub fn decompose(label: &str) -> Self {
        let tokens: Vec<&str> = label.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Self::default(),
            [given] => Self {
                given: (*given).to_string(),
                ..Self::default()
            },
            [given, family] => Self {
                given: (*given).to_string(),
                family: (*family).to_string(),
                ..Self::default()
            },
            [given, middle @ .., family] => Self {
                given: (*given).to_string(),
                additional: middle.join(" "),
                family: (*family).to_string(),
                ..Self::default()
            },
        }
    }

    /// Space-joined non-empty components, for display-label synthesis.
    #[must_use]
    pub fn display_label(&self) -> String {
        [&self.given, &self.additional, &self.family]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// An email address with its vCard `TYPE` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    /// The address itself.
    pub address: String,
    /// `TYPE` parameter values, upper-cased (`HOME`, `WORK`, `PREF`, ...).
    pub types: Vec<String>,
}

/// A phone number with its vCard `TYPE` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Phone {
    /// The number, as written in the source vCard.
    pub number: String,
    /// `TYPE` parameter values, upper-cased (`CELL`, `VOICE`, ...).
    pub types: Vec<String>,
}

/// A postal address, mirroring the seven components of the vCard `ADR`
/// property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Post office box.
    pub po_box: String,
    /// Extended address (apartment, suite).
    pub extended: String,
    /// Street address.
    pub street: String,
    /// Locality (city).
    pub locality: String,
    /// Region (state, province).
    pub region: String,
    /// Postal code.
    pub postal_code: String,
    /// Country name.
    pub country: String,
    /// `TYPE` parameter values, upper-cased.
    pub types: Vec<String>,
}

impl Address {
    /// Whether every address component is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.po_box.is_empty()
            && self.extended.is_empty()
            && self.street.is_empty()
            && self.locality.is_empty()
            && self.region.is_empty()
            && self.postal_code.is_empty()
            && self.country.is_empty()
    }
}

/// A contact as synchronized with a `CardDAV` server.
///
/// `uid` holds the plain server-side UID immediately after parsing; the sync
/// engine rewrites it to the compound `"<account>:AB:<book>:<uid>"` form
/// (see [`compound_uid`]) before the contact reaches the local store, and
/// strips the prefix again on upsync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contact {
    /// Server UID or compound GUID, see type-level docs.
    pub uid: String,
    /// Structured name.
    pub name: Name,
    /// The `FN` display label.
    pub formatted_name: Option<String>,
    /// Nickname.
    pub nickname: Option<String>,
    /// Birthday (date portion only).
    pub birthday: Option<Date>,
    /// `X-GENDER` value.
    pub gender: Option<String>,
    /// `REV` last-modified timestamp.
    pub rev: Option<Timestamp>,
    /// Email addresses.
    pub emails: Vec<Email>,
    /// Phone numbers.
    pub phones: Vec<Phone>,
    /// Postal addresses.
    pub addresses: Vec<Address>,
    /// Web URLs.
    pub urls: Vec<String>,
    /// Avatar URL from a `PHOTO` property.
    pub photo_url: Option<String>,
    /// Organization name.
    pub org: Option<String>,
    /// Job title.
    pub title: Option<String>,
    /// Role within the organization.
    pub role: Option<String>,
    /// `X-SIP` address.
    pub sip: Option<String>,
    /// `X-JABBER` address.
    pub jabber: Option<String>,
    /// Free-form note.
    pub note: Option<String>,

    /// Server etag observed when this contact was fetched or written.
    pub etag: Option<String>,
    /// Server resource path of the backing vCard.
    pub sync_uri: Option<String>,
    /// Raw content lines of properties the codec does not map, in source
    /// order. Re-emitted verbatim before `END:VCARD` on serialization.
    pub unsupported: Vec<String>,
}

impl Contact {
    /// Creates an empty contact.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the plain server UID if `uid` carries the compound prefix for
    /// the given account and address book, or `None` otherwise.
    #[must_use]
    pub fn server_uid(&self, account_id: u32, addressbook_url: &str) -> Option<&str> {
        self.uid
            .strip_prefix(&compound_prefix(account_id, addressbook_url))
    }

    /// Best display label: `FN`, then the structured name, then the nickname.
    #[must_use]
    pub fn display_label(&self) -> String {
        if let Some(fn_) = &self.formatted_name {
            if !fn_.is_empty() {
                return fn_.clone();
            }
        }
        let composed = self.name.display_label();
        if !composed.is_empty() {
            return composed;
        }
        self.nickname.clone().unwrap_or_default()
    }
}

/// The compound GUID prefix `"<account>:AB:<book>:"`.
///
/// RFC 6352 only requires a UID to be unique within a single collection, so
/// stored GUIDs are namespaced by account and address book.
#[must_use]
pub fn compound_prefix(account_id: u32, addressbook_url: &str) -> String {
    format!("{account_id}:AB:{addressbook_url}:")
}

/// The compound GUID `"<account>:AB:<book>:<uid>"` for a server UID.
#[must_use]
pub fn compound_uid(account_id: u32, addressbook_url: &str, uid: &str) -> String {
    format!("{account_id}:AB:{addressbook_url}:{uid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_decompose_single_token() {
        let name = Name::decompose("Cher");
        assert_eq!(name.given, "Cher");
        assert!(name.family.is_empty());
    }

    #[test]
    fn name_decompose_two_tokens() {
        let name = Name::decompose("John Doe");
        assert_eq!(name.given, "John");
        assert_eq!(name.family, "Doe");
        assert!(name.additional.is_empty());
    }

    #[test]
    fn name_decompose_many_tokens() {
        let name = Name::decompose("John Ronald Reuel Tolkien");
        assert_eq!(name.given, "John");
        assert_eq!(name.additional, "Ronald Reuel");
        assert_eq!(name.family, "Tolkien");
    }

    #[test]
    fn compound_uid_projection_is_injective() {
        let a = compound_uid(5, "/books/a/", "x");
        let b = compound_uid(5, "/books/b/", "x");
        let c = compound_uid(6, "/books/a/", "x");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn server_uid_requires_matching_prefix() {
        let mut contact = Contact::new();
        contact.uid = compound_uid(7, "/books/a/", "abc123");
        assert_eq!(contact.server_uid(7, "/books/a/"), Some("abc123"));
        assert_eq!(contact.server_uid(7, "/books/b/"), None);
        assert_eq!(contact.server_uid(8, "/books/a/"), None);
    }
}
