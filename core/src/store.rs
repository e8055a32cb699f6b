// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Seam to the local contact database.
//!
//! The engine never mutates the store directly; it exchanges change sets
//! through this contract and leaves two-way merge decisions to the store.

use std::fmt;

use cardsync_vcard::Contact;

/// Checkpointed state of one collection in the local store.
#[derive(Debug, Clone, Default)]
pub struct CollectionRecord {
    /// Server path of the collection.
    pub path: String,
    /// Display name, as last seen on the server.
    pub display_name: Option<String>,
    /// Ctag observed at the last successful sync.
    pub ctag: Option<String>,
    /// Sync token observed at the last successful sync.
    pub sync_token: Option<String>,
    /// Whether the collection was write-restricted.
    pub read_only: bool,
}

/// Collection-level A/M/R/U since the last sync, as known locally.
#[derive(Debug, Clone, Default)]
pub struct CollectionChanges {
    /// Collections created locally.
    pub added: Vec<CollectionRecord>,
    /// Collections whose local state changed.
    pub modified: Vec<CollectionRecord>,
    /// Collections deleted locally.
    pub removed: Vec<CollectionRecord>,
    /// Collections untouched since the last sync.
    pub unmodified: Vec<CollectionRecord>,
}

/// Contact-level A/M/R/U for one collection, as known locally.
#[derive(Debug, Clone, Default)]
pub struct ContactChanges {
    /// Contacts created locally since the last sync.
    pub added: Vec<Contact>,
    /// Contacts modified locally.
    pub modified: Vec<Contact>,
    /// Contacts deleted locally.
    pub removed: Vec<Contact>,
    /// Contacts untouched locally.
    pub unmodified: Vec<Contact>,
}

impl ContactChanges {
    /// The uri→etag map over every locally known server resource, used for
    /// remote delta classification.
    #[must_use]
    pub fn uri_etag_map(&self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();
        for contact in self
            .modified
            .iter()
            .chain(self.removed.iter())
            .chain(self.unmodified.iter())
        {
            let Some(uri) = contact.sync_uri.as_ref().filter(|u| !u.is_empty()) else {
                tracing::warn!(guid = %contact.uid, "contact has empty sync target uri");
                continue;
            };
            if let Some(etag) = contact.etag.as_ref() {
                map.insert(uri.clone(), etag.clone());
            }
        }
        map
    }
}

/// Local changes to upload, as resolved by the store's two-way merge.
#[derive(Debug, Clone, Default)]
pub struct LocalChanges {
    /// Contacts to create on the server.
    pub added: Vec<Contact>,
    /// Contacts to overwrite on the server.
    pub modified: Vec<Contact>,
    /// Contacts to delete from the server.
    pub removed: Vec<Contact>,
}

/// The local contact database contract.
pub trait LocalStore {
    /// Collection-level changes since the last sync.
    fn collection_changes(&mut self) -> Result<CollectionChanges, StoreError>;

    /// Contact-level changes for one collection since the last sync.
    fn contact_changes(&mut self, collection_path: &str) -> Result<ContactChanges, StoreError>;

    /// Applies resolved remote changes and returns the local changes to
    /// upload (the store performs the two-way merge).
    fn apply_remote_changes(
        &mut self,
        collection: &CollectionRecord,
        added: &[Contact],
        modified: &[Contact],
        removed: &[Contact],
    ) -> Result<LocalChanges, StoreError>;

    /// Persists upsynced contacts with their refreshed GUIDs and etags.
    fn store_upsynced(
        &mut self,
        collection_path: &str,
        additions: &[Contact],
        modifications: &[Contact],
    ) -> Result<(), StoreError>;

    /// Checkpoints a collection's (ctag, sync-token) pair and metadata.
    fn save_collection(&mut self, collection: &CollectionRecord) -> Result<(), StoreError>;

    /// Drops a collection that disappeared from the server.
    fn remove_collection(&mut self, collection_path: &str) -> Result<(), StoreError>;
}

/// Failure reported by the local store.
#[derive(Debug, Clone)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}
