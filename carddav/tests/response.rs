// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsing tests.

use std::collections::HashMap;

use cardsync_carddav::{ChangeType, MultiStatusResponse, PrincipalLookup};

fn etags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn response_parse_user_principal() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<d:multistatus xmlns:d=\"DAV:\">
  <d:response>
    <d:href>/</d:href>
    <d:propstat>
      <d:prop>
        <d:current-user-principal>
          <d:href>/principals/users/johndoe/</d:href>
        </d:current-user-principal>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    assert_eq!(
        response.user_principal(),
        PrincipalLookup::Principal("/principals/users/johndoe/".into())
    );
}

#[test]
fn response_user_principal_with_ctag_short_circuits() {
    // Some servers reply to the principal request with addressbook
    // information; a ctag without a principal href signals the caller to
    // switch to collection-listing mode.
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<d:multistatus xmlns:d=\"DAV:\" xmlns:cs=\"http://calendarserver.org/ns/\">
  <d:response>
    <d:href>/addressbooks/johndoe/contacts/</d:href>
    <d:propstat>
      <d:prop>
        <cs:getctag>3145</cs:getctag>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    assert_eq!(
        response.user_principal(),
        PrincipalLookup::AddressbookInformation
    );
}

#[test]
fn response_user_principal_multiple_responses_short_circuits() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\">
  <d:response><d:href>/a/</d:href></d:response>
  <d:response><d:href>/b/</d:href></d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    assert_eq!(
        response.user_principal(),
        PrincipalLookup::AddressbookInformation
    );
}

#[test]
fn response_parse_addressbook_home() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<d:multistatus xmlns:d=\"DAV:\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\">
  <d:response>
    <d:href>/principals/users/johndoe/</d:href>
    <d:propstat>
      <d:prop>
        <card:addressbook-home-set>
          <d:href>/addressbooks/johndoe/</d:href>
        </card:addressbook-home-set>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    assert_eq!(
        response.addressbook_home().unwrap().as_str(),
        "/addressbooks/johndoe/"
    );
}

#[test]
fn response_addressbook_information_definite() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\" xmlns:cs=\"http://calendarserver.org/ns/\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\">
  <d:response>
    <d:href>/addressbooks/johndoe/contacts/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype>
          <d:collection />
          <card:addressbook />
        </d:resourcetype>
        <d:displayname>My Address Book</d:displayname>
        <d:current-user-privilege-set>
          <d:privilege><d:read /></d:privilege>
          <d:privilege><d:write /></d:privilege>
        </d:current-user-privilege-set>
        <cs:getctag>3145</cs:getctag>
        <d:sync-token>http://sabredav.org/ns/sync-token/3145</d:sync-token>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let books = response.into_addressbooks(Some("/addressbooks/johndoe/"));

    assert_eq!(books.len(), 1);
    let book = &books[0];
    assert_eq!(book.url.as_str(), "/addressbooks/johndoe/contacts/");
    assert_eq!(book.display_name.as_deref(), Some("My Address Book"));
    assert_eq!(book.ctag.as_deref(), Some("3145"));
    assert_eq!(
        book.sync_token.as_deref(),
        Some("http://sabredav.org/ns/sync-token/3145")
    );
    assert!(!book.read_only);
}

#[test]
fn response_addressbook_information_read_only_without_write_privilege() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\">
  <d:response>
    <d:href>/addressbooks/johndoe/shared/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype>
          <d:collection />
          <card:addressbook />
        </d:resourcetype>
        <d:current-user-privilege-set>
          <d:privilege><d:read /></d:privilege>
        </d:current-user-privilege-set>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let books = response.into_addressbooks(None);

    assert_eq!(books.len(), 1);
    assert!(books[0].read_only);
}

#[test]
fn response_addressbook_information_skips_home_self_reference() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\">
  <d:response>
    <d:href>/addressbooks/johndoe/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection /></d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/addressbooks/johndoe/contacts/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype>
          <d:collection />
          <card:addressbook />
        </d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    // home path differs only by trailing slash
    let books = response.into_addressbooks(Some("/addressbooks/johndoe"));

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].url.as_str(), "/addressbooks/johndoe/contacts/");
}

#[test]
fn response_addressbook_information_probable_collection_without_marker() {
    // Memotoo-style: RFC 6352 requires the addressbook resource type, but
    // some servers return a bare collection.
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\">
  <d:response>
    <d:href>/addressbooks/johndoe/contacts/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection /></d:resourcetype>
        <d:displayname>Contacts</d:displayname>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let books = response.into_addressbooks(None);

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].url.as_str(), "/addressbooks/johndoe/contacts/");
}

#[test]
fn response_addressbook_information_definite_wins_over_probable() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\">
  <d:response>
    <d:href>/addressbooks/johndoe/maybe/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection /></d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/addressbooks/johndoe/contacts/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype>
          <d:collection /><card:addressbook />
        </d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let books = response.into_addressbooks(None);

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].url.as_str(), "/addressbooks/johndoe/contacts/");
}

#[test]
fn response_addressbook_information_principal_only_is_unlikely() {
    // Kerio-style: the principal may serve as the addressbook url when
    // nothing else is usable.
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\">
  <d:response>
    <d:href>/principals/users/johndoe/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:principal /></d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let books = response.into_addressbooks(None);

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].url.as_str(), "/principals/users/johndoe/");
}

#[test]
fn response_addressbook_information_calendar_discarded() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\" xmlns:cal=\"urn:ietf:params:xml:ns:caldav\">
  <d:response>
    <d:href>/calendars/johndoe/default/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype>
          <d:collection /><cal:calendar />
        </d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let books = response.into_addressbooks(None);
    assert!(books.is_empty());
}

#[test]
fn response_addressbook_information_multiple_propstats() {
    // Cozy-style: one propstat carries the resourcetype, another carries
    // properties that the server reports 404 for.
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\" xmlns:cs=\"http://calendarserver.org/ns/\">
  <d:response>
    <d:href>/addressbooks/johndoe/contacts/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype>
          <d:collection /><card:addressbook />
        </d:resourcetype>
        <cs:getctag>1234</cs:getctag>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
    <d:propstat>
      <d:prop>
        <d:displayname />
      </d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let books = response.into_addressbooks(None);

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].ctag.as_deref(), Some("1234"));
}

#[test]
fn response_sync_delta_classifies_and_extracts_token() {
    // Spec scenario: modified x.vcf (etag changed), removed y.vcf (404).
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<d:multistatus xmlns:d=\"DAV:\">
  <d:response>
    <d:href>/a/joe/c/x.vcf</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>\"e2\"</d:getetag>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/a/joe/c/y.vcf</d:href>
    <d:status>HTTP/1.1 404 Not Found</d:status>
  </d:response>
  <d:sync-token>T2</d:sync-token>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    assert_eq!(response.sync_token.as_deref(), Some("T2"));

    let local = etags(&[("/a/joe/c/x.vcf", "\"e1\""), ("/a/joe/c/y.vcf", "\"e1\"")]);
    let changes = response.sync_delta(&local);

    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].uri.as_str(), "/a/joe/c/x.vcf");
    assert_eq!(changes[0].change, ChangeType::Modified);
    assert_eq!(changes[0].etag.as_ref().unwrap().as_str(), "\"e2\"");
    assert_eq!(changes[1].uri.as_str(), "/a/joe/c/y.vcf");
    assert_eq!(changes[1].change, ChangeType::Removed);
}

#[test]
fn response_sync_delta_single_response_shape() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\">
  <d:response>
    <d:href>/a/joe/c/newcard.vcf</d:href>
    <d:propstat>
      <d:prop><d:getetag>\"33441-34321\"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:sync-token>http://sabredav.org/ns/sync/5001</d:sync-token>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let changes = response.sync_delta(&HashMap::new());

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change, ChangeType::Added);
}

#[test]
fn response_sync_delta_excludes_non_contact_resources() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\">
  <d:response>
    <d:href>/a/joe/c/</d:href>
    <d:propstat>
      <d:prop><d:getetag>\"book\"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/a/joe/c/event.ics</d:href>
    <d:propstat>
      <d:prop><d:getetag>\"e9\"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/a/joe/c/suffixless</d:href>
    <d:propstat>
      <d:prop><d:getetag>\"e3\"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let changes = response.sync_delta(&HashMap::new());

    // the addressbook self reference and the .ics file are excluded, the
    // suffix-less member is kept
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].uri.as_str(), "/a/joe/c/suffixless");
}

#[test]
fn response_contact_metadata_manual_diff() {
    // Spec scenario: local {x: e1, y: e2}; server lists {x: e1, z: e3}.
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\">
  <d:response>
    <d:href>/a/joe/c/x.vcf</d:href>
    <d:propstat>
      <d:prop><d:getetag>\"e1\"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/a/joe/c/z.vcf</d:href>
    <d:propstat>
      <d:prop><d:getetag>\"e3\"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let local = etags(&[("/a/joe/c/x.vcf", "\"e1\""), ("/a/joe/c/y.vcf", "\"e2\"")]);
    let changes = response.contact_metadata(&local);

    assert_eq!(changes.len(), 3);
    let find = |uri: &str| {
        changes
            .iter()
            .find(|c| c.uri.as_str() == uri)
            .unwrap_or_else(|| panic!("missing change for {uri}"))
    };
    assert_eq!(find("/a/joe/c/x.vcf").change, ChangeType::Unmodified);
    assert_eq!(find("/a/joe/c/z.vcf").change, ChangeType::Added);
    let removed = find("/a/joe/c/y.vcf");
    assert_eq!(removed.change, ChangeType::Removed);
    assert_eq!(removed.etag.as_ref().unwrap().as_str(), "\"e2\"");
}

#[test]
fn response_contact_metadata_percent_decodes_hrefs() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\">
  <d:response>
    <d:href>/dav/user%40example.net/c/card%201.vcf</d:href>
    <d:propstat>
      <d:prop><d:getetag>\"e1\"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let changes = response.contact_metadata(&HashMap::new());

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].uri.as_str(), "/dav/user@example.net/c/card 1.vcf");
}

#[test]
fn response_contact_data_attaches_etag_uri_and_compound_guid() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\">
  <d:response>
    <d:href>/addressbooks/johndoe/contacts/abc-def-fez.vcf</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>\"2134-314\"</d:getetag>
        <card:address-data>BEGIN:VCARD
VERSION:3.0
FN:My Mother
UID:abc-def-fez-1234546578
END:VCARD
</card:address-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let contacts = response.into_contacts(7, "/addressbooks/johndoe/contacts/");

    assert_eq!(contacts.len(), 1);
    let contact = &contacts["/addressbooks/johndoe/contacts/abc-def-fez.vcf"];
    assert_eq!(
        contact.uid,
        "7:AB:/addressbooks/johndoe/contacts/:abc-def-fez-1234546578"
    );
    assert_eq!(contact.etag.as_deref(), Some("\"2134-314\""));
    assert_eq!(
        contact.sync_uri.as_deref(),
        Some("/addressbooks/johndoe/contacts/abc-def-fez.vcf")
    );
    assert_eq!(contact.formatted_name.as_deref(), Some("My Mother"));
}

#[test]
fn response_contact_data_skips_uidless_vcards() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\">
  <d:response>
    <d:href>/c/no-uid.vcf</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>\"1\"</d:getetag>
        <card:address-data>BEGIN:VCARD
VERSION:3.0
FN:No Uid
END:VCARD
</card:address-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let contacts = response.into_contacts(1, "/c/");
    assert!(contacts.is_empty());
}

#[test]
fn response_contact_data_skips_malformed_vcard_and_keeps_rest() {
    let xml = "\
<d:multistatus xmlns:d=\"DAV:\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\">
  <d:response>
    <d:href>/c/broken.vcf</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>\"1\"</d:getetag>
        <card:address-data>FN:Not A Card</card:address-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/c/good.vcf</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>\"2\"</d:getetag>
        <card:address-data>BEGIN:VCARD
VERSION:3.0
UID:good-uid
FN:Good Card
END:VCARD
</card:address-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let contacts = response.into_contacts(1, "/c/");

    assert_eq!(contacts.len(), 1);
    assert!(contacts.contains_key("/c/good.vcf"));
}
