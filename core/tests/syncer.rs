// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end sync runs against a mocked CardDAV server and an in-memory
//! store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cardsync_carddav::{AuthMethod, CardDavError};
use cardsync_core::{
    AuthError, AuthProvider, CollectionChanges, CollectionRecord, ContactChanges, Credentials,
    LocalChanges, LocalStore, StoreError, SyncError, Syncer,
};
use cardsync_vcard::Contact;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCOUNT: u32 = 7;
const BOOK_PATH: &str = "/a/joe/c/";

// ─── Test doubles ────────────────────────────────────────────────────────────

struct StaticAuth {
    server_url: String,
    flagged: Arc<AtomicBool>,
}

impl AuthProvider for StaticAuth {
    fn credentials(&mut self, _account_id: u32) -> Result<Credentials, AuthError> {
        Ok(Credentials {
            server_url: self.server_url.clone(),
            addressbook_path: None,
            auth: AuthMethod::None,
            ignore_ssl_errors: false,
        })
    }

    fn set_credentials_need_update(&mut self, _account_id: u32) {
        self.flagged.store(true, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct MemStore {
    collections: Vec<CollectionRecord>,
    contacts: HashMap<String, Vec<Contact>>,
    pending_uploads: HashMap<String, LocalChanges>,
    applied: Vec<(String, usize, usize, usize)>,
    upsynced: HashMap<String, (Vec<Contact>, Vec<Contact>)>,
    removed_collections: Vec<String>,
}

impl LocalStore for MemStore {
    fn collection_changes(&mut self) -> Result<CollectionChanges, StoreError> {
        Ok(CollectionChanges {
            unmodified: self.collections.clone(),
            ..CollectionChanges::default()
        })
    }

    fn contact_changes(&mut self, collection_path: &str) -> Result<ContactChanges, StoreError> {
        Ok(ContactChanges {
            unmodified: self.contacts.get(collection_path).cloned().unwrap_or_default(),
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
        self.applied.push((
            collection.path.clone(),
            added.len(),
            modified.len(),
            removed.len(),
        ));

        let entries = self.contacts.entry(collection.path.clone()).or_default();
        for contact in removed {
            entries.retain(|c| c.sync_uri != contact.sync_uri);
        }
        for contact in modified {
            entries.retain(|c| c.sync_uri != contact.sync_uri);
            entries.push(contact.clone());
        }
        entries.extend(added.iter().cloned());

        Ok(self
            .pending_uploads
            .remove(&collection.path)
            .unwrap_or_default())
    }

    fn store_upsynced(
        &mut self,
        collection_path: &str,
        additions: &[Contact],
        modifications: &[Contact],
    ) -> Result<(), StoreError> {
        self.upsynced.insert(
            collection_path.to_string(),
            (additions.to_vec(), modifications.to_vec()),
        );
        Ok(())
    }

    fn save_collection(&mut self, collection: &CollectionRecord) -> Result<(), StoreError> {
        self.collections.retain(|c| c.path != collection.path);
        self.collections.push(collection.clone());
        Ok(())
    }

    fn remove_collection(&mut self, collection_path: &str) -> Result<(), StoreError> {
        self.removed_collections.push(collection_path.to_string());
        self.collections.retain(|c| c.path != collection_path);
        self.contacts.remove(collection_path);
        Ok(())
    }
}

// ─── Server fixtures ─────────────────────────────────────────────────────────

const PRINCIPAL_XML: &str = r#"<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/</d:href>
    <d:propstat>
      <d:prop>
        <d:current-user-principal><d:href>/p/u/joe/</d:href></d:current-user-principal>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

const HOME_SET_XML: &str = r#"<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:response>
    <d:href>/p/u/joe/</d:href>
    <d:propstat>
      <d:prop>
        <card:addressbook-home-set><d:href>/a/joe/</d:href></card:addressbook-home-set>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

fn books_xml(ctag: &str) -> String {
    format!(
        r#"<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav" xmlns:cs="http://calendarserver.org/ns/">
  <d:response>
    <d:href>/a/joe/c/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/><card:addressbook/></d:resourcetype>
        <d:displayname>Contacts</d:displayname>
        <cs:getctag>{ctag}</cs:getctag>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#
    )
}

const LISTING_X_E1: &str = r#"<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/a/joe/c/x.vcf</d:href>
    <d:propstat>
      <d:prop><d:getetag>"e1"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

const MULTIGET_X: &str = r#"<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:response>
    <d:href>/a/joe/c/x.vcf</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"e1"</d:getetag>
        <card:address-data>BEGIN:VCARD
VERSION:3.0
UID:x-uid
FN:Xavier Example
END:VCARD
</card:address-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

async fn mount_discovery(server: &MockServer, ctag: &str) {
    Mock::given(method("PROPFIND"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(PRINCIPAL_XML, "application/xml"))
        .mount(server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/p/u/joe/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(HOME_SET_XML, "application/xml"))
        .mount(server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/a/joe/"))
        .respond_with(
            ResponseTemplate::new(207).set_body_raw(books_xml(ctag), "application/xml"),
        )
        .mount(server)
        .await;
}

fn syncer_for(server: &MockServer, store: MemStore) -> (Syncer<StaticAuth, MemStore>, Arc<AtomicBool>) {
    let flagged = Arc::new(AtomicBool::new(false));
    let auth = StaticAuth {
        server_url: server.uri(),
        flagged: flagged.clone(),
    };
    (Syncer::new(ACCOUNT, auth, store), flagged)
}

fn local_contact(uid: &str, uri: &str, etag: &str) -> Contact {
    let mut contact = Contact::new();
    contact.uid = format!("{ACCOUNT}:AB:{BOOK_PATH}:{uid}");
    contact.formatted_name = Some("Xavier Example".to_string());
    contact.sync_uri = Some(uri.to_string());
    contact.etag = Some(etag.to_string());
    contact
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_first_run_downloads_and_checkpoints() {
    let server = MockServer::start().await;
    mount_discovery(&server, "1").await;
    Mock::given(method("PROPFIND"))
        .and(path(BOOK_PATH))
        .respond_with(ResponseTemplate::new(207).set_body_raw(LISTING_X_E1, "application/xml"))
        .mount(&server)
        .await;
    Mock::given(method("REPORT"))
        .and(path(BOOK_PATH))
        .and(body_string_contains("addressbook-multiget"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(MULTIGET_X, "application/xml"))
        .mount(&server)
        .await;

    let (mut syncer, _flagged) = syncer_for(&server, MemStore::default());
    let report = syncer.sync().await.expect("Sync failed");

    assert_eq!(report.collections_synced, 1);
    assert_eq!(report.remote_additions, 1);
    assert_eq!(report.uploaded_additions, 0);

    let (_, store) = syncer.into_parts();

    // The downloaded contact carries the compound GUID and the served etag.
    let contacts = &store.contacts[BOOK_PATH];
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].uid, format!("{ACCOUNT}:AB:{BOOK_PATH}:x-uid"));
    assert_eq!(contacts[0].etag.as_deref(), Some("\"e1\""));

    // The checkpoint equals the values observed in the addressbook-info
    // response.
    assert_eq!(store.collections.len(), 1);
    assert_eq!(store.collections[0].path, BOOK_PATH);
    assert_eq!(store.collections[0].ctag.as_deref(), Some("1"));
    assert_eq!(store.collections[0].display_name.as_deref(), Some("Contacts"));

    // Downsync only: no writes were issued.
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method != "PUT" && r.method != "DELETE"));
}

#[tokio::test]
async fn sync_noop_run_reads_nothing_beyond_discovery() {
    let server = MockServer::start().await;
    mount_discovery(&server, "1").await;

    let mut store = MemStore::default();
    store.collections.push(CollectionRecord {
        path: BOOK_PATH.to_string(),
        display_name: Some("Contacts".to_string()),
        ctag: Some("1".to_string()),
        sync_token: None,
        read_only: false,
    });
    store
        .contacts
        .entry(BOOK_PATH.to_string())
        .or_default()
        .push(local_contact("x-uid", "/a/joe/c/x.vcf", "\"e1\""));

    let (mut syncer, _flagged) = syncer_for(&server, store);
    let report = syncer.sync().await.expect("Sync failed");

    assert_eq!(report.collections_synced, 1);
    assert_eq!(report.remote_additions, 0);
    assert_eq!(report.remote_modifications, 0);
    assert_eq!(report.remote_removals, 0);

    // Unchanged (ctag, sync-token) pair: only the three discovery reads, no
    // member listing, no writes.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.method == "PROPFIND"));
}

#[tokio::test]
async fn sync_uploads_local_modification_and_stores_echo() {
    let server = MockServer::start().await;
    mount_discovery(&server, "2").await;
    Mock::given(method("PROPFIND"))
        .and(path(BOOK_PATH))
        .respond_with(ResponseTemplate::new(207).set_body_raw(LISTING_X_E1, "application/xml"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/a/joe/c/x.vcf"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"e2\""))
        .expect(1)
        .mount(&server)
        .await;

    let mut store = MemStore::default();
    store.collections.push(CollectionRecord {
        path: BOOK_PATH.to_string(),
        display_name: Some("Contacts".to_string()),
        ctag: Some("1".to_string()),
        sync_token: None,
        read_only: false,
    });
    let contact = local_contact("x-uid", "/a/joe/c/x.vcf", "\"e1\"");
    store
        .contacts
        .entry(BOOK_PATH.to_string())
        .or_default()
        .push(contact.clone());
    store.pending_uploads.insert(
        BOOK_PATH.to_string(),
        LocalChanges {
            modified: vec![contact],
            ..LocalChanges::default()
        },
    );

    let (mut syncer, _flagged) = syncer_for(&server, store);
    let report = syncer.sync().await.expect("Sync failed");

    assert_eq!(report.uploaded_modifications, 1);

    let (_, store) = syncer.into_parts();

    // The echo carries the etag from the PUT response header.
    let (additions, modifications) = &store.upsynced[BOOK_PATH];
    assert!(additions.is_empty());
    assert_eq!(modifications.len(), 1);
    assert_eq!(modifications[0].etag.as_deref(), Some("\"e2\""));

    // The checkpoint advanced to the newly observed ctag.
    assert_eq!(store.collections[0].ctag.as_deref(), Some("2"));
}

#[tokio::test]
async fn sync_remote_removal_reaches_store() {
    let server = MockServer::start().await;
    mount_discovery(&server, "2").await;
    // The member listing is empty: x.vcf is gone from the server.
    Mock::given(method("PROPFIND"))
        .and(path(BOOK_PATH))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<d:multistatus xmlns:d="DAV:"></d:multistatus>"#,
            "application/xml",
        ))
        .mount(&server)
        .await;

    let mut store = MemStore::default();
    store.collections.push(CollectionRecord {
        path: BOOK_PATH.to_string(),
        ctag: Some("1".to_string()),
        ..CollectionRecord::default()
    });
    store
        .contacts
        .entry(BOOK_PATH.to_string())
        .or_default()
        .push(local_contact("x-uid", "/a/joe/c/x.vcf", "\"e1\""));

    let (mut syncer, _flagged) = syncer_for(&server, store);
    let report = syncer.sync().await.expect("Sync failed");

    assert_eq!(report.remote_removals, 1);

    let (_, store) = syncer.into_parts();
    assert_eq!(store.applied, vec![(BOOK_PATH.to_string(), 0, 0, 1)]);
    assert!(store.contacts[BOOK_PATH].is_empty());
}

#[tokio::test]
async fn sync_unauthorized_flags_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (mut syncer, flagged) = syncer_for(&server, MemStore::default());
    let err = syncer.sync().await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::Engine(CardDavError::Unauthorized)
    ));
    assert!(flagged.load(Ordering::Relaxed));
}

#[tokio::test]
async fn sync_aborted_before_any_request() {
    let flagged = Arc::new(AtomicBool::new(false));
    let auth = StaticAuth {
        server_url: "https://carddav.invalid".to_string(),
        flagged,
    };
    let mut syncer = Syncer::new(ACCOUNT, auth, MemStore::default());
    syncer.abort_handle().abort();

    let err = syncer.sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Aborted));
}

#[tokio::test]
async fn sync_drops_collection_removed_on_server() {
    let server = MockServer::start().await;
    mount_discovery(&server, "1").await;
    Mock::given(method("PROPFIND"))
        .and(path(BOOK_PATH))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<d:multistatus xmlns:d="DAV:"></d:multistatus>"#,
            "application/xml",
        ))
        .mount(&server)
        .await;

    let mut store = MemStore::default();
    store.collections.push(CollectionRecord {
        path: "/a/joe/old-book/".to_string(),
        ctag: Some("9".to_string()),
        ..CollectionRecord::default()
    });

    let (mut syncer, _flagged) = syncer_for(&server, store);
    syncer.sync().await.expect("Sync failed");

    let (_, store) = syncer.into_parts();
    assert_eq!(store.removed_collections, vec!["/a/joe/old-book/".to_string()]);
    // The surviving collection is the one discovered on the server.
    assert_eq!(store.collections.len(), 1);
    assert_eq!(store.collections[0].path, BOOK_PATH);
}

#[tokio::test]
async fn determine_addressbooks_lists_without_contact_sync() {
    let server = MockServer::start().await;
    mount_discovery(&server, "1").await;

    let (mut syncer, _flagged) = syncer_for(&server, MemStore::default());
    let books = syncer
        .determine_addressbooks()
        .await
        .expect("Failed to determine addressbooks");

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].url.as_str(), BOOK_PATH);
    assert_eq!(books[0].display_name.as_deref(), Some("Contacts"));

    // listing mode stops after collection enumeration
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}
