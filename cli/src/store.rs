// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! JSON-file contact store.
//!
//! Contacts are persisted as vCard text next to their sync metadata, so the
//! codec is the single source of truth for contact shape. This store tracks
//! no local edits; it mirrors the server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cardsync_core::{
    CollectionChanges, CollectionRecord, ContactChanges, LocalChanges, LocalStore, StoreError,
};
use cardsync_vcard::{Contact, parse, to_vcard};

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct StoreFile {
    #[serde(default)]
    collections: Vec<StoredCollection>,
    #[serde(default)]
    contacts: HashMap<String, Vec<StoredContact>>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoredCollection {
    path: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    ctag: Option<String>,
    #[serde(default)]
    sync_token: Option<String>,
    #[serde(default)]
    read_only: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoredContact {
    guid: String,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    sync_uri: Option<String>,
    vcard: String,
}

/// File-backed [`LocalStore`] implementation.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    data: StoreFile,
}

impl JsonStore {
    /// Opens (or initializes) the store at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let data = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        } else {
            StoreFile::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Total number of stored contacts.
    #[must_use]
    pub fn contact_count(&self) -> usize {
        self.data.contacts.values().map(Vec::len).sum()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(&self.data)
            .map_err(|e| StoreError(e.to_string()))?;
        std::fs::write(&self.path, text).map_err(|e| StoreError(e.to_string()))
    }

    fn decode(stored: &StoredContact) -> Option<Contact> {
        match parse(&stored.vcard) {
            Ok(mut contact) => {
                contact.uid = stored.guid.clone();
                contact.etag = stored.etag.clone();
                contact.sync_uri = stored.sync_uri.clone();
                Some(contact)
            }
            Err(err) => {
                tracing::warn!(guid = %stored.guid, %err, "stored vCard no longer parses, dropping");
                None
            }
        }
    }

    fn encode(contact: &Contact) -> StoredContact {
        StoredContact {
            guid: contact.uid.clone(),
            etag: contact.etag.clone(),
            sync_uri: contact.sync_uri.clone(),
            vcard: to_vcard(contact),
        }
    }
}

impl LocalStore for JsonStore {
    fn collection_changes(&mut self) -> Result<CollectionChanges, StoreError> {
        Ok(CollectionChanges {
            unmodified: self
                .data
                .collections
                .iter()
                .map(|c| CollectionRecord {
                    path: c.path.clone(),
                    display_name: c.display_name.clone(),
                    ctag: c.ctag.clone(),
                    sync_token: c.sync_token.clone(),
                    read_only: c.read_only,
                })
                .collect(),
            ..CollectionChanges::default()
        })
    }

    fn contact_changes(&mut self, collection_path: &str) -> Result<ContactChanges, StoreError> {
        let unmodified = self
            .data
            .contacts
            .get(collection_path)
            .map(|stored| stored.iter().filter_map(Self::decode).collect())
            .unwrap_or_default();
        Ok(ContactChanges {
            unmodified,
            ..ContactChanges::default()
        })
    }

    fn apply_remote_changes(
        &mut self,
        collection: &CollectionRecord,
        added: &[Contact],
        modified: &[Contact],
        removed: &[Contact],
    ) -> Result<LocalChanges, StoreError> {
        let entries = self.data.contacts.entry(collection.path.clone()).or_default();
        for contact in removed {
            entries.retain(|c| c.sync_uri != contact.sync_uri);
        }
        for contact in modified.iter().chain(added.iter()) {
            entries.retain(|c| c.sync_uri != contact.sync_uri);
            entries.push(Self::encode(contact));
        }
        // A mirror store has no local edits to push back.
        Ok(LocalChanges::default())
    }

    fn store_upsynced(
        &mut self,
        collection_path: &str,
        additions: &[Contact],
        modifications: &[Contact],
    ) -> Result<(), StoreError> {
        let entries = self
            .data
            .contacts
            .entry(collection_path.to_string())
            .or_default();
        for contact in additions.iter().chain(modifications.iter()) {
            entries.retain(|c| c.sync_uri != contact.sync_uri);
            entries.push(Self::encode(contact));
        }
        Ok(())
    }

    fn save_collection(&mut self, collection: &CollectionRecord) -> Result<(), StoreError> {
        self.data.collections.retain(|c| c.path != collection.path);
        self.data.collections.push(StoredCollection {
            path: collection.path.clone(),
            display_name: collection.display_name.clone(),
            ctag: collection.ctag.clone(),
            sync_token: collection.sync_token.clone(),
            read_only: collection.read_only,
        });
        self.persist()
    }

    fn remove_collection(&mut self, collection_path: &str) -> Result<(), StoreError> {
        self.data.collections.retain(|c| c.path != collection_path);
        self.data.contacts.remove(collection_path);
        self.persist()
    }
}
