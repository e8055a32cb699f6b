// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! vCard 3.0 serializer.
//!
//! Emits only whitelisted properties, guarantees the `FN` and `N` properties
//! required by RFC 2426, and splices preserved unsupported properties
//! verbatim immediately before `END:VCARD`.

use jiff::civil::Date;

use crate::contact::{Contact, Name};

const PRODID: &str = concat!("-//cardsync//cardsync-vcard ", env!("CARGO_PKG_VERSION"), "//EN");

/// Serializes a contact as a vCard 3.0 string with CRLF line endings.
///
/// `contact.uid` is emitted as-is; callers upsyncing to a server must
/// reinstate the plain server UID beforehand.
#[must_use]
pub fn to_vcard(contact: &Contact) -> String {
    let mut out = String::new();
    let mut push = |line: String| out.push_str(&fold_line(&line));

    push("BEGIN:VCARD".to_string());
    push("VERSION:3.0".to_string());
    push(format!("PRODID:{PRODID}"));

    if !contact.uid.is_empty() {
        push(format!("UID:{}", escape_value(&contact.uid)));
    }

    let name = effective_name(contact);
    push(format!(
        "N:{};{};{};{};{}",
        escape_component(&name.family),
        escape_component(&name.given),
        escape_component(&name.additional),
        escape_component(&name.prefix),
        escape_component(&name.suffix),
    ));
    push(format!("FN:{}", escape_value(&effective_label(contact, &name))));

    if let Some(nickname) = &contact.nickname {
        if !nickname.is_empty() {
            push(format!("NICKNAME:{}", escape_value(nickname)));
        }
    }
    if let Some(birthday) = contact.birthday {
        push(format!("BDAY:{}", format_date(birthday)));
    }
    if let Some(gender) = &contact.gender {
        // qtcontacts-style stores always carry a gender; the placeholder
        // value must not leak into the vCard.
        if !gender.is_empty() && !gender.eq_ignore_ascii_case("UNSPECIFIED") {
            push(format!("X-GENDER:{}", escape_value(gender)));
        }
    }

    for email in &contact.emails {
        push(typed_property("EMAIL", &email.types, &escape_value(&email.address)));
    }
    for phone in &contact.phones {
        push(typed_property("TEL", &phone.types, &escape_value(&phone.number)));
    }
    for address in &contact.addresses {
        let value = format!(
            "{};{};{};{};{};{};{}",
            escape_component(&address.po_box),
            escape_component(&address.extended),
            escape_component(&address.street),
            escape_component(&address.locality),
            escape_component(&address.region),
            escape_component(&address.postal_code),
            escape_component(&address.country),
        );
        push(typed_property("ADR", &address.types, &value));
    }
    for url in &contact.urls {
        push(format!("URL:{}", escape_value(url)));
    }
    if let Some(photo_url) = &contact.photo_url {
        push(format!("PHOTO;VALUE=URI:{}", escape_value(photo_url)));
    }
    if let Some(org) = &contact.org {
        push(format!("ORG:{}", escape_component(org)));
    }
    if let Some(title) = &contact.title {
        push(format!("TITLE:{}", escape_value(title)));
    }
    if let Some(role) = &contact.role {
        push(format!("ROLE:{}", escape_value(role)));
    }
    if let Some(sip) = &contact.sip {
        push(format!("X-SIP:{}", escape_value(sip)));
    }
    if let Some(jabber) = &contact.jabber {
        push(format!("X-JABBER:{}", escape_value(jabber)));
    }
    if let Some(note) = &contact.note {
        push(format!("NOTE:{}", escape_value(note)));
    }
    if let Some(rev) = contact.rev {
        push(format!("REV:{rev}"));
    }

    // Preserved foreign properties go back exactly as they came in, each on
    // its own CRLF-terminated line, immediately before END:VCARD.
    for raw in &contact.unsupported {
        out.push_str(raw);
        out.push_str("\r\n");
    }

    out.push_str("END:VCARD\r\n");
    out
}

/// The structured name to emit: the contact's own, or one decomposed from
/// the display label or nickname. `N` is required by vCard 3.0, so an
/// undecomposable label still yields five empty components.
fn effective_name(contact: &Contact) -> Name {
    if !contact.name.is_empty() {
        return contact.name.clone();
    }
    let label = contact.display_label();
    if label.is_empty() {
        return Name::default();
    }
    let mut name = Name::decompose(&label);
    if name.given.is_empty() {
        // Could not decompose; assume the label is a useful given name.
        name.given = label;
    }
    name
}

fn effective_label(contact: &Contact, name: &Name) -> String {
    let label = contact.display_label();
    if !label.is_empty() {
        return label;
    }
    name.display_label()
}

fn typed_property(property: &str, types: &[String], value: &str) -> String {
    if types.is_empty() {
        format!("{property}:{value}")
    } else {
        format!("{property};TYPE={}:{value}", types.join(","))
    }
}

fn format_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

// ─── Escaping and folding ────────────────────────────────────────────────────

/// Escapes a full property value: `\`, `,`, `;`, newline.
fn escape_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(';', "\\;")
        .replace('\n', "\\n")
}

/// Escapes a semicolon-delimited component (`N` / `ADR` field).
fn escape_component(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

/// Emits one logical line, folded at 75 octets with CRLF + SP continuation.
fn fold_line(s: &str) -> String {
    if s.len() <= 75 {
        return format!("{s}\r\n");
    }

    let mut result = String::new();
    let total = s.len();
    let mut pos = 0usize;
    let mut first = true;

    while pos < total {
        let limit = if first { 75 } else { 74 };
        let end = if pos + limit >= total {
            total
        } else {
            // walk back to the nearest char boundary
            let mut e = pos + limit;
            while e > pos && !s.is_char_boundary(e) {
                e -= 1;
            }
            if e == pos { pos + 1 } else { e }
        };

        if !first {
            result.push(' ');
        }
        result.push_str(&s[pos..end]);
        result.push_str("\r\n");
        pos = end;
        first = false;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::Email;

    #[test]
    fn fold_line_short_passthrough() {
        assert_eq!(fold_line("FN:Bob"), "FN:Bob\r\n");
    }

    #[test]
    fn fold_line_long_produces_continuations() {
        let line = format!("NOTE:{}", "x".repeat(200));
        let folded = fold_line(&line);
        for physical in folded.trim_end().split("\r\n").skip(1) {
            assert!(physical.starts_with(' '));
        }
        let unfolded: String = folded.replace("\r\n ", "").replace("\r\n", "");
        assert_eq!(unfolded, line);
    }

    #[test]
    fn emits_required_fn_and_n_for_empty_contact() {
        let vcard = to_vcard(&Contact::new());
        assert!(vcard.contains("N:;;;;\r\n"));
        assert!(vcard.contains("FN:\r\n"));
        assert!(vcard.ends_with("END:VCARD\r\n"));
    }

    #[test]
    fn synthesizes_n_from_formatted_name() {
        let mut contact = Contact::new();
        contact.formatted_name = Some("Jane Doe".to_string());
        let vcard = to_vcard(&contact);
        assert!(vcard.contains("N:Doe;Jane;;;\r\n"));
        assert!(vcard.contains("FN:Jane Doe\r\n"));
    }

    #[test]
    fn single_token_label_becomes_given_name() {
        let mut contact = Contact::new();
        contact.nickname = Some("Prince".to_string());
        let vcard = to_vcard(&contact);
        assert!(vcard.contains("N:;Prince;;;\r\n"));
    }

    #[test]
    fn drops_unspecified_gender() {
        let mut contact = Contact::new();
        contact.gender = Some("UNSPECIFIED".to_string());
        let vcard = to_vcard(&contact);
        assert!(!vcard.contains("X-GENDER"));

        contact.gender = Some("Male".to_string());
        let vcard = to_vcard(&contact);
        assert!(vcard.contains("X-GENDER:Male\r\n"));
    }

    #[test]
    fn unsupported_lines_precede_end_marker() {
        let mut contact = Contact::new();
        contact.formatted_name = Some("A B".to_string());
        contact.unsupported = vec![
            "X-SPOUSE:Carol".to_string(),
            "CATEGORIES:friends,colleagues".to_string(),
        ];
        let vcard = to_vcard(&contact);
        let expected_tail = "X-SPOUSE:Carol\r\nCATEGORIES:friends,colleagues\r\nEND:VCARD\r\n";
        assert!(vcard.ends_with(expected_tail));
    }

    #[test]
    fn escapes_value_characters() {
        let mut contact = Contact::new();
        contact.formatted_name = Some("Smith".to_string());
        contact.note = Some("a,b;c\nnext".to_string());
        contact.emails.push(Email {
            address: "a@b.example".to_string(),
            types: vec!["HOME".to_string(), "PREF".to_string()],
        });
        let vcard = to_vcard(&contact);
        assert!(vcard.contains("NOTE:a\\,b\\;c\\nnext\r\n"));
        assert!(vcard.contains("EMAIL;TYPE=HOME,PREF:a@b.example\r\n"));
    }
}
