// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request body builders for `CardDAV` operations.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::CardDavError;
use crate::url::multiget_href;
use crate::xml::ns;

/// PROPFIND request builder.
#[derive(Debug)]
pub struct PropFindRequest {
    props: Vec<Prop>,
}

/// Properties to request in PROPFIND.
#[derive(Debug, Clone, Copy)]
pub enum Prop {
    /// The authenticated user's principal URL.
    CurrentUserPrincipal,
    /// The principal's addressbook home collection.
    AddressbookHomeSet,
    /// Resource type.
    ResourceType,
    /// Display name.
    DisplayName,
    /// Granted privileges, for read-only detection.
    CurrentUserPrivilegeSet,
    /// RFC 6578 sync token.
    SyncToken,
    /// calendarserver collection tag.
    GetCTag,
    /// `ETag`.
    GetETag,
}

impl Prop {
    const fn name(self) -> &'static str {
        match self {
            Self::CurrentUserPrincipal => "current-user-principal",
            Self::AddressbookHomeSet => "addressbook-home-set",
            Self::ResourceType => "resourcetype",
            Self::DisplayName => "displayname",
            Self::CurrentUserPrivilegeSet => "current-user-privilege-set",
            Self::SyncToken => "sync-token",
            Self::GetCTag => "getctag",
            Self::GetETag => "getetag",
        }
    }

    /// The namespace prefix this property is declared under.
    const fn prefix(self) -> &'static str {
        match self {
            Self::AddressbookHomeSet => "CARD",
            Self::GetCTag => "CS",
            Self::CurrentUserPrincipal
            | Self::ResourceType
            | Self::DisplayName
            | Self::CurrentUserPrivilegeSet
            | Self::SyncToken
            | Self::GetETag => "D",
        }
    }
}

impl PropFindRequest {
    /// Creates a new PROPFIND request.
    #[must_use]
    pub fn new() -> Self {
        Self { props: Vec::new() }
    }

    /// Adds a property to the request.
    pub fn add_property(&mut self, prop: Prop) -> &mut Self {
        self.props.push(prop);
        self
    }

    /// Builds the XML body for the PROPFIND request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        // <D:propfind xmlns:D="DAV:" ...>
        let mut propfind = BytesStart::new("D:propfind");
        propfind.push_attribute(("xmlns:D", ns::DAV));
        if self.props.iter().any(|p| p.prefix() == "CARD") {
            propfind.push_attribute(("xmlns:CARD", ns::CARDDAV));
        }
        if self.props.iter().any(|p| p.prefix() == "CS") {
            propfind.push_attribute(("xmlns:CS", ns::CALENDARSERVER));
        }
        writer.write_event(Event::Start(propfind))?;

        // <D:prop>
        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;

        for prop in &self.props {
            let elem = BytesStart::new(format!("{}:{}", prop.prefix(), prop.name()));
            writer.write_event(Event::Empty(elem))?;
        }

        // </D:prop>
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        // </D:propfind>
        writer.write_event(Event::End(BytesEnd::new("D:propfind")))?;

        into_string(writer)
    }
}

impl Default for PropFindRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// RFC 6578 `sync-collection` REPORT builder.
#[derive(Debug)]
pub struct SyncCollectionRequest {
    sync_token: String,
}

impl SyncCollectionRequest {
    /// Creates a sync-collection request carrying the previous sync token.
    #[must_use]
    pub fn new(sync_token: String) -> Self {
        Self { sync_token }
    }

    /// Builds the XML body for the sync-collection REPORT.
    ///
    /// The sync token value is XML-escaped; tokens are frequently URLs with
    /// `&` in them.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        // <D:sync-collection xmlns:D="DAV:">
        let mut root = BytesStart::new("D:sync-collection");
        root.push_attribute(("xmlns:D", ns::DAV));
        writer.write_event(Event::Start(root))?;

        // <D:sync-token>...</D:sync-token>
        writer.write_event(Event::Start(BytesStart::new("D:sync-token")))?;
        writer.write_event(Event::Text(BytesText::new(&self.sync_token)))?;
        writer.write_event(Event::End(BytesEnd::new("D:sync-token")))?;

        // <D:sync-level>1</D:sync-level>
        writer.write_event(Event::Start(BytesStart::new("D:sync-level")))?;
        writer.write_event(Event::Text(BytesText::new("1")))?;
        writer.write_event(Event::End(BytesEnd::new("D:sync-level")))?;

        // <D:prop><D:getetag/></D:prop>
        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        writer.write_event(Event::Empty(BytesStart::new("D:getetag")))?;
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        // </D:sync-collection>
        writer.write_event(Event::End(BytesEnd::new("D:sync-collection")))?;

        into_string(writer)
    }
}

/// `addressbook-multiget` REPORT builder.
#[derive(Debug)]
pub struct AddressbookMultigetRequest {
    addressbook_path: String,
    uris: Vec<String>,
}

impl AddressbookMultigetRequest {
    /// Creates a multiget request for members of the given addressbook.
    #[must_use]
    pub fn new(addressbook_path: String) -> Self {
        Self {
            addressbook_path,
            uris: Vec::new(),
        }
    }

    /// Adds a member URI to the request.
    pub fn add_uri(&mut self, uri: String) -> &mut Self {
        self.uris.push(uri);
        self
    }

    /// Builds the XML body for the addressbook-multiget REPORT.
    ///
    /// Each href has its final path segment percent-encoded; bare UIDs are
    /// expanded to fully-qualified `.vcf` paths under the addressbook.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        // <CARD:addressbook-multiget xmlns:D="DAV:" xmlns:CARD="...">
        let mut root = BytesStart::new("CARD:addressbook-multiget");
        root.push_attribute(("xmlns:D", ns::DAV));
        root.push_attribute(("xmlns:CARD", ns::CARDDAV));
        writer.write_event(Event::Start(root))?;

        // <D:prop><D:getetag/><CARD:address-data/></D:prop>
        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        writer.write_event(Event::Empty(BytesStart::new("D:getetag")))?;
        writer.write_event(Event::Empty(BytesStart::new("CARD:address-data")))?;
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        // <D:href> per member
        for uri in &self.uris {
            let href = multiget_href(&self.addressbook_path, uri);
            writer.write_event(Event::Start(BytesStart::new("D:href")))?;
            writer.write_event(Event::Text(BytesText::new(&href)))?;
            writer.write_event(Event::End(BytesEnd::new("D:href")))?;
        }

        // </CARD:addressbook-multiget>
        writer.write_event(Event::End(BytesEnd::new("CARD:addressbook-multiget")))?;

        into_string(writer)
    }
}

fn into_string(writer: Writer<Cursor<Vec<u8>>>) -> Result<String, CardDavError> {
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| CardDavError::Xml(format!("UTF-8 error: {e}")))
}
