// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! One sync session per account.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cardsync_carddav::{AddressBook, CardDavClient, CardDavError, CollectionDelta};
use cardsync_vcard::Contact;
use futures::future::join_all;

use crate::auth::AuthProvider;
use crate::error::SyncError;
use crate::store::{CollectionRecord, ContactChanges, LocalStore};

/// Summary of a completed sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    /// Collections reconciled during this run.
    pub collections_synced: usize,
    /// Contacts downloaded as remote additions.
    pub remote_additions: usize,
    /// Contacts downloaded as remote modifications.
    pub remote_modifications: usize,
    /// Contacts deleted locally due to remote removals.
    pub remote_removals: usize,
    /// Contacts uploaded as local additions.
    pub uploaded_additions: usize,
    /// Contacts uploaded as local modifications.
    pub uploaded_modifications: usize,
    /// Contacts deleted from the server.
    pub uploaded_deletions: usize,
}

/// Cooperative cancellation handle for a running sync.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Requests the run to stop at its next suspension point. In-flight
    /// responses may be ignored; partial writes are accepted and reconciled
    /// by the next run.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives one bidirectional sync session against one account.
pub struct Syncer<A, S> {
    account_id: u32,
    auth: A,
    store: S,
    abort: AbortHandle,
}

impl<A, S> std::fmt::Debug for Syncer<A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Syncer")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

/// Per-collection work gathered before delta detection.
struct CollectionPlan {
    book: AddressBook,
    prev_ctag: Option<String>,
    prev_sync_token: Option<String>,
    local: ContactChanges,
}

impl<A: AuthProvider, S: LocalStore> Syncer<A, S> {
    /// Creates a syncer for one account.
    pub fn new(account_id: u32, auth: A, store: S) -> Self {
        Self {
            account_id,
            auth,
            store,
            abort: AbortHandle::default(),
        }
    }

    /// A handle the host can use to abort this run.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Consumes the syncer, handing back its collaborators.
    pub fn into_parts(self) -> (A, S) {
        (self.auth, self.store)
    }

    /// Enumerates the account's address books without syncing contacts,
    /// for account configuration.
    pub async fn determine_addressbooks(&mut self) -> Result<Vec<AddressBook>, SyncError> {
        let credentials = self.auth.credentials(self.account_id)?;
        let mut client = CardDavClient::new(credentials.into_config())?;
        let books = client
            .list_addressbooks()
            .await
            .map_err(|e| self.engine_error(e))?;
        Ok(dedup_books(books))
    }

    /// Runs one full sync session.
    ///
    /// Sequence: sign in, enumerate address books, reconcile the collection
    /// sets, compute per-collection deltas (concurrently), merge through the
    /// local store, upsync the resulting local changes, and checkpoint each
    /// collection once its writes have settled.
    pub async fn sync(&mut self) -> Result<SyncReport, SyncError> {
        tracing::debug!(account = self.account_id, "starting carddav sync");
        let credentials = self.auth.credentials(self.account_id)?;
        let mut client = CardDavClient::new(credentials.into_config())?;

        self.check_abort()?;
        let books = client
            .list_addressbooks()
            .await
            .map_err(|e| self.engine_error(e))?;
        let books = dedup_books(books);

        // Reconcile the remote collection list with the locally known set:
        // a collection is modified iff its (ctag, sync-token) pair moved.
        let local_collections = self.store.collection_changes()?;
        let mut plans: Vec<CollectionPlan> = Vec::new();
        let mut matched: HashSet<String> = HashSet::new();

        for local in local_collections
            .added
            .iter()
            .chain(local_collections.modified.iter())
            .chain(local_collections.unmodified.iter())
        {
            if local.path.is_empty() {
                continue;
            }
            match books.iter().find(|b| b.url.as_str() == local.path) {
                None => {
                    tracing::debug!(path = %local.path, "collection removed on server");
                    self.store.remove_collection(&local.path)?;
                }
                Some(book) => {
                    matched.insert(local.path.clone());
                    if local.ctag == book.ctag && local.sync_token == book.sync_token {
                        tracing::debug!(path = %local.path, "collection unmodified on server");
                    } else {
                        tracing::debug!(path = %local.path, "collection modified on server");
                    }
                    let local_contacts = self.store.contact_changes(&local.path)?;
                    plans.push(CollectionPlan {
                        book: book.clone(),
                        prev_ctag: local.ctag.clone(),
                        prev_sync_token: local.sync_token.clone(),
                        local: local_contacts,
                    });
                }
            }
        }

        for book in &books {
            if !matched.contains(book.url.as_str()) {
                tracing::debug!(path = %book.url, "collection added on server");
                plans.push(CollectionPlan {
                    book: book.clone(),
                    prev_ctag: None,
                    prev_sync_token: None,
                    local: ContactChanges::default(),
                });
            }
        }

        // Delta detection proceeds in parallel across collections; each
        // yields an independent A/M/R/U tuple.
        self.check_abort()?;
        let etag_maps: Vec<_> = plans.iter().map(|p| p.local.uri_etag_map()).collect();
        let deltas = join_all(plans.iter().zip(etag_maps.iter()).map(|(plan, etags)| {
            client.collection_delta(
                self.account_id,
                &plan.book,
                plan.prev_ctag.as_deref(),
                plan.prev_sync_token.as_deref(),
                etags,
            )
        }))
        .await;

        // All reads of a collection complete before any write begins.
        let mut report = SyncReport::default();
        for (plan, delta) in plans.into_iter().zip(deltas) {
            self.check_abort()?;
            let delta = delta.map_err(|e| self.engine_error(e))?;
            self.sync_collection(&client, plan, delta, &mut report)
                .await?;
            report.collections_synced += 1;
        }

        tracing::debug!(account = self.account_id, "carddav sync finished successfully");
        Ok(report)
    }

    /// Merges one collection's delta through the store, uploads the local
    /// changes and checkpoints the collection.
    async fn sync_collection(
        &mut self,
        client: &CardDavClient,
        plan: CollectionPlan,
        delta: CollectionDelta,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let path = plan.book.url.to_string();

        // The remote removal set is resolved to local contacts by uri.
        let removal_uris: HashSet<&str> =
            delta.removals.iter().map(|r| r.uri.as_str()).collect();
        let removed_contacts: Vec<Contact> = plan
            .local
            .added
            .iter()
            .chain(plan.local.modified.iter())
            .chain(plan.local.removed.iter())
            .chain(plan.local.unmodified.iter())
            .filter(|c| {
                c.sync_uri
                    .as_ref()
                    .is_some_and(|uri| removal_uris.contains(uri.as_str()))
            })
            .cloned()
            .collect();

        report.remote_additions += delta.additions.len();
        report.remote_modifications += delta.modifications.len();
        report.remote_removals += removed_contacts.len();

        let record = CollectionRecord {
            path: path.clone(),
            display_name: plan.book.display_name.clone(),
            ctag: plan.book.ctag.clone(),
            sync_token: delta.sync_token.clone(),
            read_only: plan.book.read_only,
        };

        // Two-way merge happens in the store; it hands back what to upload.
        let to_upload = self.store.apply_remote_changes(
            &record,
            &delta.additions,
            &delta.modifications,
            &removed_contacts,
        )?;

        report.uploaded_additions += to_upload.added.len();
        report.uploaded_modifications += to_upload.modified.len();
        report.uploaded_deletions += to_upload.removed.len();

        self.check_abort()?;
        let outcome = client
            .upsync_updates(
                self.account_id,
                &path,
                &to_upload.added,
                &to_upload.modified,
                &to_upload.removed,
                &delta.known_uris,
            )
            .await
            .map_err(|e| self.engine_error(e))?;

        self.store
            .store_upsynced(&path, &outcome.additions, &outcome.modifications)?;

        // Checkpoint the (ctag, sync-token) pair observed this run so the
        // next run computes a minimal delta.
        self.store.save_collection(&record)?;
        Ok(())
    }

    /// Maps an engine failure, flagging the account on 401.
    fn engine_error(&mut self, err: CardDavError) -> SyncError {
        if matches!(err, CardDavError::Unauthorized) {
            tracing::warn!(account = self.account_id, "credentials rejected, flagging account");
            self.auth.set_credentials_need_update(self.account_id);
        }
        SyncError::Engine(err)
    }

    fn check_abort(&self) -> Result<(), SyncError> {
        if self.abort.is_aborted() {
            tracing::debug!(account = self.account_id, "sync aborted by host");
            Err(SyncError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Drops duplicate collection urls, keeping the first occurrence.
fn dedup_books(books: Vec<AddressBook>) -> Vec<AddressBook> {
    let mut seen = HashSet::new();
    books
        .into_iter()
        .filter(|b| seen.insert(b.url.to_string()))
        .collect()
}
