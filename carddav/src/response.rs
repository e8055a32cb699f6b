// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Multistatus response parsing for WebDAV/`CardDAV` operations.
//!
//! Accepts a permissive superset of the shapes seen in the wild: a single
//! `response` element instead of a list, multiple `propstat` blocks per
//! response (Cozy), missing `addressbook` resource-type markers (Memotoo,
//! Kerio) and statuses at either the response or propstat level.

use std::collections::{HashMap, HashSet};

use cardsync_vcard::{Contact, compound_prefix};
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::CardDavError;
use crate::types::{AddressBook, ChangeType, ETag, Href, ResourceChange};
use crate::url::{has_non_vcf_suffix, paths_equivalent, percent_decode};

/// `WebDAV` multistatus response.
#[derive(Debug, Clone, Default)]
pub struct MultiStatusResponse {
    /// The response items.
    pub responses: Vec<ResponseItem>,
    /// The envelope-level RFC 6578 sync token, when present.
    pub sync_token: Option<String>,
}

/// Individual response in a multistatus.
#[derive(Debug, Clone, Default)]
pub struct ResponseItem {
    /// Percent-decoded resource path.
    pub href: Href,
    /// Response-level status (used by sync-collection deltas for removals).
    pub status: Option<String>,
    /// Property blocks.
    pub prop_stats: Vec<PropStat>,
}

/// Property block with its status.
#[derive(Debug, Clone, Default)]
pub struct PropStat {
    /// Parsed properties.
    pub props: Properties,
    /// The propstat status line.
    pub status: Option<String>,
}

/// WebDAV/`CardDAV` properties of one propstat block.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// `displayname`.
    pub display_name: Option<String>,
    /// `resourcetype` contents, when the property was present.
    pub resource_type: Option<ResourceType>,
    /// `getetag`.
    pub get_etag: Option<ETag>,
    /// calendarserver `getctag`.
    pub get_ctag: Option<String>,
    /// `sync-token` property.
    pub sync_token: Option<String>,
    /// `address-data` vCard payload.
    pub address_data: Option<String>,
    /// `addressbook-home-set` href.
    pub addressbook_home_set: Option<Href>,
    /// `current-user-principal` href.
    pub current_user_principal: Option<Href>,
    /// Privilege names under `current-user-privilege-set`.
    pub privileges: Option<Vec<String>>,
}

/// Contents of a `resourcetype` property.
#[derive(Debug, Clone, Default)]
pub struct ResourceType {
    /// Lower-cased local names of the child elements.
    pub names: Vec<String>,
    /// Whether the element carried non-whitespace text.
    pub has_text: bool,
}

impl ResourceType {
    fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// The interpretation of a PROPFIND reply to the user-information request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalLookup {
    /// The server returned the user principal path.
    Principal(Href),
    /// The server skipped ahead and returned addressbook information; the
    /// caller should short-circuit to collection-listing mode.
    AddressbookInformation,
    /// Neither a principal nor addressbook metadata was found.
    NotFound,
}

impl MultiStatusResponse {
    /// Parses a multistatus response from XML.
    ///
    /// # Errors
    ///
    /// Returns an error if XML parsing fails.
    #[expect(clippy::too_many_lines)]
    pub fn from_xml(xml: &str) -> Result<Self, CardDavError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        reader.config_mut().check_end_names = false;

        let mut result = Self::default();
        let mut current_response: Option<ResponseItem> = None;
        let mut current_props = Properties::default();
        let mut current_propstat_status: Option<String> = None;
        let mut in_response = false;
        let mut in_propstat = false;
        let mut in_prop = false;

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Eof => break,

                Event::Start(ref e) => match e.local_name().into_inner() {
                    b"response" => {
                        in_response = true;
                        current_response = Some(ResponseItem::default());
                    }
                    b"href" if in_response && !in_prop => {
                        let text = read_element_text(&mut reader, b"href")?;
                        if let Some(resp) = current_response.as_mut() {
                            resp.href = Href::new(percent_decode(text.trim()));
                        }
                    }
                    b"propstat" if in_response => {
                        in_propstat = true;
                        current_props = Properties::default();
                        current_propstat_status = None;
                    }
                    b"prop" => in_prop = true,

                    b"displayname" if in_prop => {
                        current_props.display_name =
                            Some(read_element_text(&mut reader, b"displayname")?);
                    }
                    b"resourcetype" if in_prop => {
                        current_props.resource_type =
                            Some(read_resource_type(&mut reader, &mut buf)?);
                    }
                    b"getetag" if in_prop => {
                        let text = read_element_text(&mut reader, b"getetag")?;
                        current_props.get_etag = Some(ETag::new(text));
                    }
                    b"getctag" if in_prop => {
                        current_props.get_ctag = Some(read_element_text(&mut reader, b"getctag")?);
                    }
                    b"sync-token" => {
                        let text = read_element_text(&mut reader, b"sync-token")?;
                        if in_prop {
                            current_props.sync_token = Some(text);
                        } else {
                            // RFC 6578 places the refreshed token directly
                            // under the multistatus envelope.
                            result.sync_token = Some(text);
                        }
                    }
                    b"address-data" if in_prop => {
                        current_props.address_data =
                            Some(read_element_text(&mut reader, b"address-data")?);
                    }
                    b"addressbook-home-set" if in_prop => {
                        if let Some(href) =
                            read_nested_href(&mut reader, &mut buf, b"addressbook-home-set")?
                        {
                            current_props.addressbook_home_set = Some(href);
                        }
                    }
                    b"current-user-principal" if in_prop => {
                        if let Some(href) =
                            read_nested_href(&mut reader, &mut buf, b"current-user-principal")?
                        {
                            current_props.current_user_principal = Some(href);
                        }
                    }
                    b"current-user-privilege-set" if in_prop => {
                        current_props.privileges =
                            Some(read_privileges(&mut reader, &mut buf)?);
                    }
                    b"status" => {
                        let text = read_element_text(&mut reader, b"status")?;
                        if in_propstat {
                            current_propstat_status = Some(text);
                        } else if in_response {
                            if let Some(resp) = current_response.as_mut() {
                                resp.status = Some(text);
                            }
                        }
                    }
                    _ => {}
                },

                Event::Empty(ref e) => match e.local_name().into_inner() {
                    b"resourcetype" if in_prop => {
                        current_props.resource_type = Some(ResourceType::default());
                    }
                    b"current-user-privilege-set" if in_prop => {
                        current_props.privileges = Some(Vec::new());
                    }
                    _ => {}
                },

                Event::End(ref e) => match e.local_name().into_inner() {
                    b"response" if in_response => {
                        in_response = false;
                        if let Some(resp) = current_response.take() {
                            result.responses.push(resp);
                        }
                    }
                    b"propstat" if in_propstat => {
                        in_propstat = false;
                        if let Some(resp) = current_response.as_mut() {
                            resp.prop_stats.push(PropStat {
                                props: std::mem::take(&mut current_props),
                                status: current_propstat_status.take(),
                            });
                        }
                    }
                    b"prop" => in_prop = false,
                    _ => {}
                },

                _ => {}
            }
            buf.clear();
        }

        Ok(result)
    }

    /// Interprets a reply to the current-user-information PROPFIND.
    ///
    /// Some servers (e.g. Zimbra) answer the principal request with
    /// addressbook information directly; a multi-response reply, or a
    /// single response carrying a ctag but no principal href, signal the
    /// short-circuit.
    #[must_use]
    pub fn user_principal(&self) -> PrincipalLookup {
        if self.responses.len() != 1 {
            return PrincipalLookup::AddressbookInformation;
        }

        let Some(response) = self.responses.first() else {
            return PrincipalLookup::NotFound;
        };

        let mut principal = None;
        let mut ctag = None;
        for prop_stat in &response.prop_stats {
            if let Some(href) = &prop_stat.props.current_user_principal {
                principal = Some(href.clone());
            }
            if let Some(tag) = &prop_stat.props.get_ctag {
                ctag = Some(tag.clone());
            }
            if let Some(status) = &prop_stat.status {
                if !status_is_2xx(status) {
                    tracing::warn!(status = %status, "non-OK status in user information response");
                }
            }
        }

        match (principal, ctag) {
            (Some(href), _) if !href.is_empty() => PrincipalLookup::Principal(href),
            (_, Some(_)) => PrincipalLookup::AddressbookInformation,
            _ => PrincipalLookup::NotFound,
        }
    }

    /// The first `addressbook-home-set` href in the reply.
    #[must_use]
    pub fn addressbook_home(&self) -> Option<Href> {
        self.responses.iter().find_map(|r| {
            r.prop_stats
                .iter()
                .find_map(|p| p.props.addressbook_home_set.clone())
        })
    }

    /// Extracts addressbook descriptors from an addressbook-information
    /// reply.
    ///
    /// Responses are classified as definite, probable or unlikely
    /// addressbooks; probables are used only when no definites exist, and
    /// unlikelies only when no probables exist either. When `home_path` is
    /// given, a response for the home collection itself is skipped.
    #[must_use]
    pub fn into_addressbooks(self, home_path: Option<&str>) -> Vec<AddressBook> {
        let mut definite = Vec::new();
        let mut probable = Vec::new();
        let mut unlikely = Vec::new();

        for response in self.responses {
            let url = response.href.clone();
            if let Some(home) = home_path {
                if paths_equivalent(&url, home) {
                    tracing::debug!(url = %url, "ignoring addressbook-home-set self reference");
                    continue;
                }
            }

            let mut book = AddressBook::new(url);
            let mut is_addressbook = TriState::Unknown;
            let mut resourcetype_status = TriState::Unknown;
            let mut other_status = TriState::Unknown;

            for prop_stat in &response.prop_stats {
                let props = &prop_stat.props;
                if let Some(ctag) = &props.get_ctag {
                    book.ctag = Some(ctag.clone());
                }
                if let Some(token) = &props.sync_token {
                    book.sync_token = Some(token.clone());
                }
                if let Some(name) = &props.display_name {
                    book.display_name = Some(name.clone());
                }
                if let Some(privileges) = &props.privileges {
                    book.read_only = !privileges.iter().any(|p| p == "write");
                }

                let for_resourcetype = props.resource_type.is_some();
                if let Some(resource_type) = &props.resource_type {
                    is_addressbook = classify_resource_type(resource_type, &book.url);
                }

                if let Some(status) = &prop_stat.status {
                    let ok = if status_is_2xx(status) {
                        TriState::Yes
                    } else {
                        tracing::debug!(status = %status, url = %book.url, "non-OK propstat status");
                        TriState::No
                    };
                    if for_resourcetype {
                        resourcetype_status = ok;
                    } else {
                        other_status = ok;
                    }
                }
            }

            if is_addressbook == TriState::Yes && resourcetype_status == TriState::Yes {
                tracing::debug!(url = %book.url, "have addressbook resource with status OK");
                definite.push(book);
            } else if response.prop_stats.len() == 1
                && is_addressbook == TriState::Unknown
                && other_status == TriState::Yes
            {
                // Implicit collection resourcetype with an OK status for the
                // remaining properties (Memotoo).
                tracing::debug!(url = %book.url, "have possible addressbook resource");
                probable.push(book);
            } else if is_addressbook == TriState::Unknown && resourcetype_status == TriState::Yes {
                // Kerio: the principal may serve as the addressbook url if
                // nothing better shows up.
                tracing::debug!(url = %book.url, "have unlikely addressbook resource");
                unlikely.push(book);
            } else {
                tracing::debug!(url = %book.url, "ignoring resource due to type or status");
            }
        }

        if !definite.is_empty() {
            definite
        } else if !probable.is_empty() {
            tracing::debug!("no certain addressbook resources; using possible resources");
            probable
        } else {
            tracing::debug!("no possible addressbook resources; using unlikely resources");
            unlikely
        }
    }

    /// Classifies a sync-collection REPORT reply against the local uri→etag
    /// map.
    ///
    /// 2xx responses with an etag become Added/Modified/Unmodified; 404
    /// responses become Removed. Addressbook self references and resources
    /// with recognized non-vCard suffixes are excluded.
    #[must_use]
    pub fn sync_delta(&self, local_etags: &HashMap<String, String>) -> Vec<ResourceChange> {
        let mut changes = Vec::new();

        for response in &self.responses {
            let uri = response.href.clone();
            let etag = response
                .prop_stats
                .iter()
                .find_map(|p| p.props.get_etag.clone());
            // Removals carry the status at the response level.
            let status = response
                .status
                .clone()
                .or_else(|| response.prop_stats.iter().find_map(|p| p.status.clone()));

            let Some(status) = status else {
                tracing::warn!(uri = %uri, "response without status in sync delta");
                continue;
            };

            if status_is_2xx(&status) {
                if uri.ends_with('/') {
                    tracing::debug!(uri = %uri, "ignoring non-contact (addressbook?) resource");
                    continue;
                }
                if has_non_vcf_suffix(&uri) {
                    tracing::debug!(uri = %uri, "ignoring non-contact resource");
                    continue;
                }
                let served = etag.as_ref().map_or("", |e| e.as_str());
                let change = match local_etags.get(uri.as_str()) {
                    None => ChangeType::Added,
                    Some(old) if served != old => ChangeType::Modified,
                    Some(_) => ChangeType::Unmodified,
                };
                changes.push(ResourceChange { uri, etag, change });
            } else if status.contains("404") {
                changes.push(ResourceChange {
                    uri,
                    etag,
                    change: ChangeType::Removed,
                });
            } else {
                tracing::warn!(uri = %uri, status = %status, "unknown response in sync delta");
            }
        }

        changes
    }

    /// Classifies a full getetag listing against the local uri→etag map.
    ///
    /// Every 2xx contact resource yields Added/Modified/Unmodified; local
    /// URIs missing from the listing yield synthetic Removed entries.
    #[must_use]
    pub fn contact_metadata(&self, local_etags: &HashMap<String, String>) -> Vec<ResourceChange> {
        let mut changes = Vec::new();
        let mut seen = HashSet::new();

        for response in &self.responses {
            let uri = response.href.clone();
            let etag = response
                .prop_stats
                .iter()
                .find_map(|p| p.props.get_etag.clone());
            let status = response
                .prop_stats
                .iter()
                .find_map(|p| p.status.clone())
                .or_else(|| response.status.clone());

            if uri.ends_with('/') {
                tracing::debug!(uri = %uri, "ignoring non-contact (addressbook?) resource");
                continue;
            }
            if has_non_vcf_suffix(&uri) {
                tracing::debug!(uri = %uri, "ignoring non-contact resource");
                continue;
            }

            match status {
                Some(status) if status_is_2xx(&status) => {
                    seen.insert(uri.to_string());
                    let served = etag.as_ref().map_or("", |e| e.as_str());
                    let change = match local_etags.get(uri.as_str()) {
                        None => ChangeType::Added,
                        Some(old) if served != old => ChangeType::Modified,
                        Some(_) => ChangeType::Unmodified,
                    };
                    changes.push(ResourceChange { uri, etag, change });
                }
                other => {
                    tracing::warn!(uri = %uri, status = ?other, "unknown response in contact metadata");
                }
            }
        }

        // Any locally known uri absent from the listing was deleted remotely.
        for (uri, etag) in local_etags {
            if !seen.contains(uri) {
                tracing::debug!(uri = %uri, "resource deleted on server");
                changes.push(ResourceChange {
                    uri: Href::new(uri.clone()),
                    etag: Some(ETag::new(etag.clone())),
                    change: ChangeType::Removed,
                });
            }
        }

        changes
    }

    /// Converts a multiget reply into contacts keyed by resource URI.
    ///
    /// Each `address-data` payload is parsed as a vCard; the served etag and
    /// URI are attached, and the UID is rewritten to the compound
    /// `"<account>:AB:<book>:<uid>"` form unless already prefixed. Contacts
    /// that fail to parse, or parse without a UID, are skipped.
    #[must_use]
    pub fn into_contacts(self, account_id: u32, addressbook_url: &str) -> HashMap<String, Contact> {
        let mut contacts = HashMap::new();

        for response in self.responses {
            let uri = response.href;
            let mut etag = None;
            let mut vcard = None;
            for prop_stat in &response.prop_stats {
                if let Some(e) = &prop_stat.props.get_etag {
                    etag = Some(e.clone());
                }
                if let Some(data) = &prop_stat.props.address_data {
                    vcard = Some(data.clone());
                }
            }

            let Some(vcard) = vcard else {
                tracing::warn!(uri = %uri, "multiget response without address-data");
                continue;
            };

            let mut contact = match cardsync_vcard::parse(&vcard) {
                Ok(contact) => contact,
                Err(err) => {
                    tracing::warn!(uri = %uri, %err, "skipping unparseable vCard");
                    continue;
                }
            };

            if contact.uid.is_empty() {
                tracing::warn!(uri = %uri, "contact import from vCard has no UID, skipping");
                continue;
            }

            let prefix = compound_prefix(account_id, addressbook_url);
            if !contact.uid.starts_with(&prefix) {
                contact.uid = format!("{prefix}{}", contact.uid);
            }
            contact.sync_uri = Some(uri.to_string());
            contact.etag = etag.map(|e| e.to_string());

            contacts.insert(uri.to_string(), contact);
        }

        contacts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriState {
    Unknown,
    Yes,
    No,
}

/// Evaluates a `resourcetype` against the addressbook heuristics.
fn classify_resource_type(resource_type: &ResourceType, url: &Href) -> TriState {
    let has_calendar = resource_type.contains("calendar");
    let has_proxy = resource_type
        .names
        .iter()
        .any(|n| n.starts_with("calendar-proxy"));
    let has_addressbook = resource_type.contains("addressbook");
    let has_collection = resource_type.contains("collection");
    let has_principal = resource_type.contains("principal");
    let key_count = resource_type.names.len() + usize::from(resource_type.has_text);

    if has_calendar || has_proxy {
        tracing::debug!(url = %url, "have calendar or proxy resource, ignoring");
        TriState::No
    } else if has_addressbook {
        TriState::Yes
    } else if has_collection
        && (key_count == 1
            || (key_count == 2 && resource_type.has_text)
            || (key_count == 3 && resource_type.has_text && has_principal))
    {
        // RFC 6352 §5.2 requires the addressbook marker, but some servers
        // (Memotoo, Kerio) omit it for plain collections.
        tracing::debug!(url = %url, "have probable addressbook resource");
        TriState::Unknown
    } else {
        tracing::debug!(url = %url, "have unknown non-addressbook resource");
        TriState::No
    }
}

/// Any HTTP 2xx status counts as success.
fn status_is_2xx(status: &str) -> bool {
    status
        .as_bytes()
        .windows(3)
        .any(|w| w[0] == b'2' && w[1].is_ascii_digit() && w[2].is_ascii_digit())
}

/// Accumulates the text content of the current element up to its end tag.
fn read_element_text(
    reader: &mut Reader<&[u8]>,
    end: &[u8],
) -> Result<String, CardDavError> {
    let mut text = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::End(ref e) if e.local_name().into_inner() == end => break,
            Event::Eof => {
                return Err(CardDavError::Xml("unexpected EOF".to_string()));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Reads the first nested `href` inside the current element.
fn read_nested_href(
    reader: &mut Reader<&[u8]>,
    buf: &mut Vec<u8>,
    end: &[u8],
) -> Result<Option<Href>, CardDavError> {
    let mut href = None;
    loop {
        match reader.read_event_into(buf)? {
            Event::Start(ref e) if e.local_name().into_inner() == b"href" => {
                let text = read_element_text(reader, b"href")?;
                if href.is_none() {
                    href = Some(Href::new(percent_decode(text.trim())));
                }
            }
            Event::End(ref e) if e.local_name().into_inner() == end => break,
            Event::Eof => return Err(CardDavError::Xml("unexpected EOF".to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(href)
}

/// Collects privilege names under `current-user-privilege-set`.
fn read_privileges(
    reader: &mut Reader<&[u8]>,
    buf: &mut Vec<u8>,
) -> Result<Vec<String>, CardDavError> {
    let mut privileges = Vec::new();
    loop {
        match reader.read_event_into(buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().into_inner()).to_lowercase();
                if name != "privilege" {
                    privileges.push(name);
                }
            }
            Event::End(ref e)
                if e.local_name().into_inner() == b"current-user-privilege-set" =>
            {
                break;
            }
            Event::Eof => return Err(CardDavError::Xml("unexpected EOF".to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(privileges)
}

/// Collects the contents of a `resourcetype` element.
fn read_resource_type(
    reader: &mut Reader<&[u8]>,
    buf: &mut Vec<u8>,
) -> Result<ResourceType, CardDavError> {
    let mut resource_type = ResourceType::default();
    let mut depth = 0usize;
    loop {
        match reader.read_event_into(buf)? {
            Event::Start(ref e) => {
                if depth == 0 {
                    let name =
                        String::from_utf8_lossy(e.local_name().into_inner()).to_lowercase();
                    resource_type.names.push(name);
                }
                depth += 1;
            }
            Event::Empty(ref e) => {
                if depth == 0 {
                    let name =
                        String::from_utf8_lossy(e.local_name().into_inner()).to_lowercase();
                    resource_type.names.push(name);
                }
            }
            Event::Text(e) => {
                if depth == 0 && !e.unescape()?.trim().is_empty() {
                    resource_type.has_text = true;
                }
            }
            Event::End(ref e) => {
                if e.local_name().into_inner() == b"resourcetype" && depth == 0 {
                    break;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => return Err(CardDavError::Xml("unexpected EOF".to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(resource_type)
}
