// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CardDAV` protocol engine.
//!
//! Drives the discovery state machine (RFC 6764 well-known bootstrapping,
//! principal → addressbook-home-set → addressbook enumeration), per-collection
//! delta detection (webdav-sync REPORT or ctag/etag comparison), multiget
//! fetching and the upsync fan-out.

use std::collections::{HashMap, HashSet};

use cardsync_vcard::{Contact, compound_prefix, compound_uid, to_vcard};
use futures::future::join_all;
use reqwest::{Method, StatusCode, header::LOCATION};
use url::Url;

use crate::config::CardDavConfig;
use crate::error::CardDavError;
use crate::http::HttpClient;
use crate::request::{AddressbookMultigetRequest, Prop, PropFindRequest, SyncCollectionRequest};
use crate::response::{MultiStatusResponse, PrincipalLookup};
use crate::types::{
    AddressBook, ChangeType, CollectionDelta, ETag, Href, ResourceChange, UpsyncOutcome,
};
use crate::url::{
    RedirectCheck, check_redirect, normalize_server_url, paths_equivalent, root, well_known,
    with_path,
};

/// Discovery progresses through these stages as fallbacks are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiscoveryStage {
    Started,
    WellKnown,
    Root,
    Redirected,
}

/// What discovery produced: a principal path to continue from, or the
/// addressbook list directly when the server short-circuits.
enum Discovered {
    Principal(Href),
    Addressbooks(Vec<AddressBook>),
}

const MAX_REDIRECTS: usize = 8;

/// `CardDAV` client for one account.
///
/// The client owns the resolved server URL; discovery may rewrite it when
/// the server redirects or the well-known/root fallbacks engage, so
/// [`CardDavClient::list_addressbooks`] must run before the delta and upsync
/// operations.
#[derive(Debug)]
pub struct CardDavClient {
    http: HttpClient,
    config: CardDavConfig,
    server: Url,
    tried_path_as_home_set: bool,
}

impl CardDavClient {
    /// Creates a new `CardDAV` client.
    ///
    /// # Errors
    ///
    /// Returns an error if the server URL is invalid or HTTP client
    /// initialization fails.
    pub fn new(config: CardDavConfig) -> Result<Self, CardDavError> {
        let server = normalize_server_url(&config.server_url)?;
        let http = HttpClient::new(config.clone())?;
        Ok(Self {
            http,
            config,
            server,
            tried_path_as_home_set: false,
        })
    }

    /// The currently resolved server base URL.
    #[must_use]
    pub fn server_url(&self) -> &Url {
        &self.server
    }

    /// Enumerates the account's address books.
    ///
    /// With a configured `addressbook_path` the discovery steps are skipped
    /// and the path is queried directly; if that yields nothing, the path is
    /// retried once as an addressbook-home-set URL. Otherwise the full
    /// RFC 6764 sequence runs: principal lookup (with well-known and root
    /// fallbacks), home-set lookup, then collection enumeration.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery exhausts its fallbacks, a redirect is
    /// refused, or the server replies with an unexpected status.
    pub async fn list_addressbooks(&mut self) -> Result<Vec<AddressBook>, CardDavError> {
        let configured = self
            .config
            .addressbook_path
            .clone()
            .filter(|p| !p.is_empty());

        if let Some(path) = configured {
            let books = self.addressbooks_at(&path, None).await?;
            if !books.is_empty() {
                return Ok(books);
            }
            if self.tried_path_as_home_set {
                return Err(CardDavError::DiscoveryFailed(
                    "configured addressbook path yielded no addressbooks".to_string(),
                ));
            }
            // The configured path may be the home set url rather than an
            // addressbook path; try it that way once.
            self.tried_path_as_home_set = true;
            tracing::debug!(path = %path, "path is not an addressbook path; trying as home set url");
            let home = self.addressbook_home(&path).await?;
            let skip = if paths_equivalent(&home, &path) {
                None
            } else {
                Some(home.as_str())
            };
            let books = self.addressbooks_at(&home, skip).await?;
            return if books.is_empty() {
                Err(CardDavError::DiscoveryFailed(
                    "unable to parse addressbook info from response".to_string(),
                ))
            } else {
                Ok(books)
            };
        }

        match self.discover_principal().await? {
            Discovered::Addressbooks(books) => Ok(books),
            Discovered::Principal(principal) => {
                let home = self.addressbook_home(&principal).await?;
                let books = self.addressbooks_at(&home, Some(&home)).await?;
                if books.is_empty() {
                    Err(CardDavError::DiscoveryFailed(
                        "no addressbooks found in home set".to_string(),
                    ))
                } else {
                    Ok(books)
                }
            }
        }
    }

    /// Runs the discovery state machine until a principal (or a direct
    /// addressbook-information reply) is found.
    async fn discover_principal(&mut self) -> Result<Discovered, CardDavError> {
        let mut stage = DiscoveryStage::Started;
        let mut redirects = 0usize;

        loop {
            let mut propfind = PropFindRequest::new();
            propfind.add_property(Prop::CurrentUserPrincipal);
            let body = propfind.build()?;

            let request_url = self.server.to_string();
            tracing::debug!(url = %request_url, ?stage, "requesting principal urls for user");
            let req = self.http.propfind(&request_url, "0", body)?;
            let resp = self.http.send(req).await?;
            let status = resp.status();

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        CardDavError::DiscoveryFailed("redirect without Location header".to_string())
                    })?;
                // Resolve relative redirects against the request URL.
                let target = self.server.join(location)?;
                match check_redirect(&self.server, &target) {
                    RedirectCheck::Circular => {
                        tracing::warn!(to = %target, "redirect specified is circular");
                        return Err(CardDavError::RedirectRefused {
                            from: request_url,
                            to: target.to_string(),
                        });
                    }
                    RedirectCheck::Refused => {
                        tracing::warn!(from = %request_url, to = %target, "unexpected redirect");
                        return Err(CardDavError::RedirectRefused {
                            from: request_url,
                            to: target.to_string(),
                        });
                    }
                    RedirectCheck::Allowed => {
                        redirects += 1;
                        if redirects > MAX_REDIRECTS {
                            return Err(CardDavError::DiscoveryFailed(
                                "too many redirects".to_string(),
                            ));
                        }
                        tracing::debug!(from = %request_url, to = %target, "following redirect");
                        self.server = target;
                        stage = DiscoveryStage::Redirected;
                        continue;
                    }
                }
            }

            if matches!(status.as_u16(), 404 | 405) {
                match stage {
                    DiscoveryStage::Started
                        if !self.server.path().ends_with(".well-known/carddav") =>
                    {
                        // RFC 6764 §6: bootstrap via the well-known URI when
                        // the initial context path fails.
                        tracing::debug!(status = status.as_u16(), "trying well-known URI");
                        self.server = well_known(&self.server);
                        stage = DiscoveryStage::WellKnown;
                        continue;
                    }
                    DiscoveryStage::Started | DiscoveryStage::WellKnown => {
                        // RFC 6764 §6: on 404 from the well-known URI, retry
                        // at the root. 405 included for non-conformant
                        // implementations.
                        tracing::debug!(status = status.as_u16(), "trying root URI");
                        self.server = root(&self.server);
                        stage = DiscoveryStage::Root;
                        continue;
                    }
                    DiscoveryStage::Root | DiscoveryStage::Redirected => {
                        return Err(CardDavError::DiscoveryFailed(format!(
                            "no principal found (HTTP {})",
                            status.as_u16()
                        )));
                    }
                }
            }

            HttpClient::check_status(&resp)?;
            let xml = resp.text().await?;
            let multistatus = MultiStatusResponse::from_xml(&xml)?;

            return match multistatus.user_principal() {
                PrincipalLookup::Principal(href) => Ok(Discovered::Principal(href)),
                PrincipalLookup::AddressbookInformation => {
                    // Some servers answer the principal request with
                    // addressbook information; skip the remaining steps.
                    let books = multistatus.into_addressbooks(None);
                    if books.is_empty() {
                        Err(CardDavError::DiscoveryFailed(
                            "unable to parse addressbook info from user principal response"
                                .to_string(),
                        ))
                    } else {
                        Ok(Discovered::Addressbooks(books))
                    }
                }
                PrincipalLookup::NotFound => Err(CardDavError::DiscoveryFailed(
                    "unable to parse user principal from response".to_string(),
                )),
            };
        }
    }

    /// Fetches the addressbook-home-set href for a principal path.
    async fn addressbook_home(&self, principal_path: &str) -> Result<Href, CardDavError> {
        tracing::debug!(path = %principal_path, "requesting addressbook urls for user");
        let mut propfind = PropFindRequest::new();
        propfind.add_property(Prop::AddressbookHomeSet);
        let body = propfind.build()?;

        let request_url = with_path(&self.server, principal_path).to_string();
        let req = self.http.propfind(&request_url, "0", body)?;
        let resp = self.http.send(req).await?;
        HttpClient::check_status(&resp)?;
        let xml = resp.text().await?;

        MultiStatusResponse::from_xml(&xml)?
            .addressbook_home()
            .filter(|home| !home.is_empty())
            .ok_or_else(|| {
                CardDavError::DiscoveryFailed(
                    "unable to parse addressbook home from response".to_string(),
                )
            })
    }

    /// Enumerates candidate collections under an addressbook-home path.
    async fn addressbooks_at(
        &self,
        home_path: &str,
        skip_self: Option<&str>,
    ) -> Result<Vec<AddressBook>, CardDavError> {
        tracing::debug!(path = %home_path, "requesting addressbook sync information");
        let mut propfind = PropFindRequest::new();
        propfind
            .add_property(Prop::ResourceType)
            .add_property(Prop::DisplayName)
            .add_property(Prop::CurrentUserPrivilegeSet)
            .add_property(Prop::SyncToken)
            .add_property(Prop::GetCTag);
        let body = propfind.build()?;

        let request_url = with_path(&self.server, home_path).to_string();
        let req = self.http.propfind(&request_url, "1", body)?;
        let resp = self.http.send(req).await?;
        HttpClient::check_status(&resp)?;
        let xml = resp.text().await?;

        Ok(MultiStatusResponse::from_xml(&xml)?.into_addressbooks(skip_self))
    }

    /// Computes the remote delta for one collection.
    ///
    /// Prefers an incremental webdav-sync REPORT when both old and new sync
    /// tokens are known; falls back to a full getetag listing when the
    /// server forgot the token, and to ctag comparison (or unconditional
    /// listing) when webdav-sync is unsupported. Fetches changed vCards via
    /// one addressbook-multiget.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, unexpected statuses outside
    /// the REPORT fallback path, or malformed responses.
    pub async fn collection_delta(
        &self,
        account_id: u32,
        addressbook: &AddressBook,
        prev_ctag: Option<&str>,
        prev_sync_token: Option<&str>,
        local_etags: &HashMap<String, String>,
    ) -> Result<CollectionDelta, CardDavError> {
        let book_url = addressbook.url.as_str();
        let new_ctag = addressbook.ctag.as_deref().filter(|s| !s.is_empty());
        let new_token = addressbook.sync_token.as_deref().filter(|s| !s.is_empty());
        let prev_ctag = prev_ctag.filter(|s| !s.is_empty());
        let prev_token = prev_sync_token.filter(|s| !s.is_empty());

        let (changes, refreshed_token) = match (new_token, new_ctag) {
            (None, None) => {
                // Neither token is available; manual delta detection.
                tracing::debug!(url = %book_url, "no sync-token or ctag, manual delta detection required");
                let changes = self.fetch_contact_metadata(book_url, local_etags).await?;
                (changes, None)
            }
            (None, Some(ctag)) => {
                if prev_ctag == Some(ctag) {
                    tracing::debug!(url = %book_url, "no changes since last sync");
                    return Ok(Self::no_op_delta(addressbook));
                }
                // First sync, or changes since: list etags and diff.
                let changes = self.fetch_contact_metadata(book_url, local_etags).await?;
                (changes, None)
            }
            (Some(token), _) => match prev_token {
                None => {
                    // First sync against a webdav-sync collection: full
                    // listing; the delta will be all remote additions.
                    let changes = self.fetch_contact_metadata(book_url, local_etags).await?;
                    (changes, None)
                }
                Some(prev) if prev != token => {
                    match self.fetch_sync_delta(book_url, prev, local_etags).await {
                        Ok((changes, refreshed)) => (changes, refreshed),
                        Err(err) => {
                            // The server is allowed to forget the sync token;
                            // retry with a full listing.
                            tracing::warn!(url = %book_url, %err, "sync-collection report failed, falling back to full listing");
                            let changes =
                                self.fetch_contact_metadata(book_url, local_etags).await?;
                            (changes, None)
                        }
                    }
                }
                Some(_) => {
                    tracing::debug!(url = %book_url, "no changes since last sync");
                    return Ok(Self::no_op_delta(addressbook));
                }
            },
        };

        let mut delta = CollectionDelta {
            sync_token: refreshed_token.or_else(|| addressbook.sync_token.clone()),
            ..CollectionDelta::default()
        };

        let mut additions: HashSet<String> = HashSet::new();
        let mut modifications: HashSet<String> = HashSet::new();
        let mut fetch_uris: Vec<String> = Vec::new();
        for change in changes {
            delta.known_uris.insert(change.uri.to_string());
            match change.change {
                ChangeType::Added => {
                    additions.insert(change.uri.to_string());
                    fetch_uris.push(change.uri.to_string());
                }
                ChangeType::Modified => {
                    modifications.insert(change.uri.to_string());
                    fetch_uris.push(change.uri.to_string());
                }
                ChangeType::Removed => delta.removals.push(change),
                ChangeType::Unmodified => delta.unmodified.push(change),
            }
        }

        tracing::debug!(
            url = %book_url,
            added = additions.len(),
            modified = modifications.len(),
            removed = delta.removals.len(),
            unmodified = delta.unmodified.len(),
            "calculated remote A/M/R/U"
        );

        if fetch_uris.is_empty() {
            tracing::debug!(url = %book_url, "no further data to fetch");
            return Ok(delta);
        }

        tracing::debug!(url = %book_url, count = fetch_uris.len(), "fetching vcard data");
        let contacts = self
            .fetch_contacts(account_id, book_url, &fetch_uris)
            .await?;
        for (uri, contact) in contacts {
            if additions.contains(&uri) {
                delta.additions.push(contact);
            } else if modifications.contains(&uri) {
                delta.modifications.push(contact);
            } else {
                tracing::warn!(uri = %uri, "ignoring unknown addition/modification");
            }
        }

        Ok(delta)
    }

    fn no_op_delta(addressbook: &AddressBook) -> CollectionDelta {
        CollectionDelta {
            sync_token: addressbook.sync_token.clone(),
            ..CollectionDelta::default()
        }
    }

    /// Full getetag listing for manual delta detection.
    async fn fetch_contact_metadata(
        &self,
        book_path: &str,
        local_etags: &HashMap<String, String>,
    ) -> Result<Vec<ResourceChange>, CardDavError> {
        tracing::debug!(url = %book_path, "requesting contact metadata for addressbook");
        let mut propfind = PropFindRequest::new();
        propfind.add_property(Prop::GetETag);
        let body = propfind.build()?;

        let request_url = with_path(&self.server, book_path).to_string();
        let req = self.http.propfind(&request_url, "1", body)?;
        let resp = self.http.send(req).await?;
        HttpClient::check_status(&resp)?;
        let xml = resp.text().await?;

        Ok(MultiStatusResponse::from_xml(&xml)?.contact_metadata(local_etags))
    }

    /// Incremental sync-collection REPORT.
    async fn fetch_sync_delta(
        &self,
        book_path: &str,
        sync_token: &str,
        local_etags: &HashMap<String, String>,
    ) -> Result<(Vec<ResourceChange>, Option<String>), CardDavError> {
        tracing::debug!(url = %book_path, "requesting immediate delta for addressbook");
        let body = SyncCollectionRequest::new(sync_token.to_string()).build()?;

        let request_url = with_path(&self.server, book_path).to_string();
        let req = self.http.report(&request_url, None, body)?;
        let resp = self.http.send(req).await?;
        HttpClient::check_status(&resp)?;
        let xml = resp.text().await?;

        let multistatus = MultiStatusResponse::from_xml(&xml)?;
        let refreshed = multistatus.sync_token.clone();
        Ok((multistatus.sync_delta(local_etags), refreshed))
    }

    /// Fetches full vCard data for the given member URIs.
    async fn fetch_contacts(
        &self,
        account_id: u32,
        book_path: &str,
        uris: &[String],
    ) -> Result<HashMap<String, Contact>, CardDavError> {
        let mut multiget = AddressbookMultigetRequest::new(book_path.to_string());
        for uri in uris {
            multiget.add_uri(uri.clone());
        }
        let body = multiget.build()?;

        let request_url = with_path(&self.server, book_path).to_string();
        let req = self.http.report(&request_url, Some("1"), body)?;
        let resp = self.http.send(req).await?;
        HttpClient::check_status(&resp)?;
        let xml = resp.text().await?;

        Ok(MultiStatusResponse::from_xml(&xml)?.into_contacts(account_id, book_path))
    }

    /// Uploads local changes for one collection.
    ///
    /// Additions `PUT` without `If-Match` under a freshly minted UID;
    /// modifications and deletions are conditional on the stored etag.
    /// Writes are dispatched concurrently; the collection is quiescent when
    /// every write has settled. A 405 response marks the collection
    /// write-restricted and is tolerated; other failures abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, 401, or non-2xx statuses
    /// other than 405.
    pub async fn upsync_updates(
        &self,
        account_id: u32,
        addressbook_url: &str,
        added: &[Contact],
        modified: &[Contact],
        removed: &[Contact],
        known_remote_uris: &HashSet<String>,
    ) -> Result<UpsyncOutcome, CardDavError> {
        tracing::debug!(
            url = %addressbook_url,
            added = added.len(),
            modified = modified.len(),
            removed = removed.len(),
            "upsyncing updates to addressbook"
        );

        let mut outcome = UpsyncOutcome::default();
        let mut ops: Vec<WriteOp> = Vec::new();

        // local additions
        for contact in added {
            let mut upload = contact.clone();
            let uid = match upload.server_uid(account_id, addressbook_url) {
                Some(plain) => plain.to_string(),
                None if !upload.uid.is_empty() => upload.uid.clone(),
                None => uuid::Uuid::new_v4().simple().to_string(),
            };
            upload.uid = uid.clone();

            let separator = if addressbook_url.ends_with('/') { "" } else { "/" };
            let uri = format!("{addressbook_url}{separator}{uid}.vcf");
            upload.sync_uri = Some(uri.clone());

            // Partial-upsync idempotence: a previous interrupted run may
            // have stored this contact on the server already.
            if known_remote_uris.contains(&uri) {
                tracing::debug!(uri = %uri, "contact was previously upsynced, skipping");
                continue;
            }

            // A new contact carries no foreign properties from the server.
            upload.unsupported.clear();
            let vcard = to_vcard(&upload);

            let mut echo = upload;
            echo.uid = compound_uid(account_id, addressbook_url, &uid);
            outcome.additions.push(echo);

            ops.push(WriteOp {
                kind: WriteKind::Put(vcard),
                uri,
                if_match: None,
                echo: Some((EchoKind::Addition, outcome.additions.len() - 1)),
            });
        }

        // local modifications
        let prefix = compound_prefix(account_id, addressbook_url);
        for contact in modified {
            if contact.uid.is_empty() {
                tracing::warn!("modified contact has no guid, skipping");
                continue;
            }
            let Some(plain_uid) = contact.uid.strip_prefix(&prefix) else {
                // Possible local data corruption; recover by skipping.
                tracing::warn!(guid = %contact.uid, "modified contact has guid with invalid form, skipping");
                continue;
            };
            let Some(uri) = contact.sync_uri.clone().filter(|u| !u.is_empty()) else {
                tracing::warn!(guid = %contact.uid, "modified contact has no server uri, skipping");
                continue;
            };

            // Reinstate the server-side UID for the uploaded vCard.
            let mut upload = contact.clone();
            upload.uid = plain_uid.to_string();
            let vcard = to_vcard(&upload);

            outcome.modifications.push(contact.clone());

            ops.push(WriteOp {
                kind: WriteKind::Put(vcard),
                uri,
                if_match: contact.etag.clone().filter(|e| !e.is_empty()),
                echo: Some((EchoKind::Modification, outcome.modifications.len() - 1)),
            });
        }

        // local removals
        for contact in removed {
            let Some(uri) = contact.sync_uri.clone().filter(|u| !u.is_empty()) else {
                tracing::warn!(guid = %contact.uid, "deleted contact server uri unknown, skipping");
                continue;
            };
            // An unconditional DELETE could destroy a concurrent server-side
            // modification; without a stored etag the write is skipped and
            // the next sync reconciles.
            let Some(etag) = contact.etag.clone().filter(|e| !e.is_empty()) else {
                tracing::warn!(uri = %uri, "deleted contact has no stored etag, skipping");
                continue;
            };
            ops.push(WriteOp {
                kind: WriteKind::Delete,
                uri,
                if_match: Some(etag),
                echo: None,
            });
        }

        if ops.is_empty() {
            tracing::debug!(url = %addressbook_url, "nothing to upsync");
            return Ok(outcome);
        }

        // Fan out all writes; quiescence is the join point.
        let results = join_all(ops.into_iter().map(|op| self.execute_write(op))).await;

        let mut failure = None;
        for result in results {
            match result {
                Ok(Some((EchoKind::Addition, index, Some(etag)))) => {
                    if let Some(echo) = outcome.additions.get_mut(index) {
                        echo.etag = Some(etag.to_string());
                    }
                }
                Ok(Some((EchoKind::Modification, index, Some(etag)))) => {
                    if let Some(echo) = outcome.modifications.get_mut(index) {
                        echo.etag = Some(etag.to_string());
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        tracing::debug!(url = %addressbook_url, "upsync complete for addressbook");
        Ok(outcome)
    }

    /// Executes one PUT/DELETE, returning the echo slot and any refreshed
    /// etag. 405 responses are tolerated and produce no echo update.
    async fn execute_write(
        &self,
        op: WriteOp,
    ) -> Result<Option<(EchoKind, usize, Option<ETag>)>, CardDavError> {
        let request_url = with_path(&self.server, &op.uri).to_string();
        let mut req = match &op.kind {
            WriteKind::Put(vcard) => self
                .http
                .request(Method::PUT, &request_url)
                .header("Content-Type", "text/vcard; charset=utf-8")
                .body(vcard.clone()),
            WriteKind::Delete => self.http.request(Method::DELETE, &request_url),
        };
        if let Some(etag) = &op.if_match {
            req = req.header("If-Match", etag);
        }

        let resp = self.http.send(req).await?;
        let status = resp.status();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            // The server has restricted writes to this collection; the rest
            // of the sync continues.
            tracing::warn!(uri = %op.uri, "405 MethodNotAllowed - is the collection read-only? continuing sync, this write failed");
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(CardDavError::Unauthorized);
        }
        if !status.is_success() {
            return Err(CardDavError::UnexpectedStatus {
                status: status.as_u16(),
                url: request_url,
            });
        }

        let etag = HttpClient::response_etag(&resp);
        if etag.is_none() && op.echo.is_some() {
            // Without a refreshed etag the next sync will spuriously detect
            // this write as a remote modification; content comparison in the
            // local store filters it then.
            tracing::warn!(uri = %op.uri, "no updated etag provided, write will appear as remote modification next sync");
        }
        Ok(op.echo.map(|(kind, index)| (kind, index, etag)))
    }
}

#[derive(Debug)]
enum WriteKind {
    Put(String),
    Delete,
}

#[derive(Debug, Clone, Copy)]
enum EchoKind {
    Addition,
    Modification,
}

#[derive(Debug)]
struct WriteOp {
    kind: WriteKind,
    uri: String,
    if_match: Option<String>,
    echo: Option<(EchoKind, usize)>,
}
