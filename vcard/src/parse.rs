// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! vCard 3.0 content-line parser.
//!
//! Pipeline: raw text → unfolded logical lines → content lines → [`Contact`],
//! with every non-whitelisted property preserved verbatim in source order.

use jiff::civil::{Date, DateTime};
use jiff::tz::TimeZone;
use jiff::Timestamp;

use crate::contact::{Address, Contact, Email, Name, Phone};
use crate::error::{Error, Result};

/// Parses a single vCard into a [`Contact`].
///
/// The input must contain exactly one `BEGIN:VCARD` .. `END:VCARD` envelope.
/// Unique details (`UID`, `BDAY`, `X-GENDER`) keep the first occurrence when
/// duplicated; `REV` keeps the latest timestamp.
pub fn parse(input: &str) -> Result<Contact> {
    let lines = unfold_lines(input);

    let begins = lines
        .iter()
        .filter(|l| l.eq_ignore_ascii_case("BEGIN:VCARD"))
        .count();
    if begins == 0 {
        return Err(Error::MissingEnvelope);
    }
    if begins > 1 {
        return Err(Error::MultipleCards(begins));
    }

    let start = lines
        .iter()
        .position(|l| l.eq_ignore_ascii_case("BEGIN:VCARD"))
        .ok_or(Error::MissingEnvelope)?;
    let end = lines
        .iter()
        .position(|l| l.eq_ignore_ascii_case("END:VCARD"))
        .ok_or(Error::MissingEnvelope)?;
    if end <= start {
        return Err(Error::MissingEnvelope);
    }

    let mut contact = Contact::new();
    let mut seen_bday = false;
    let mut seen_uid = false;
    let mut seen_gender = false;

    for raw in lines
        .get(start + 1..end)
        .ok_or(Error::MissingEnvelope)?
    {
        let line = ContentLine::parse(raw)?;
        import_property(&mut contact, &line, &mut seen_uid, &mut seen_bday, &mut seen_gender);
    }

    // No structured name, but a display label or nickname may be decomposable.
    if contact.name.given.is_empty() && contact.name.family.is_empty() {
        let label = contact
            .formatted_name
            .clone()
            .filter(|l| !l.trim().is_empty())
            .or_else(|| contact.nickname.clone().filter(|l| !l.trim().is_empty()));
        if let Some(label) = label {
            contact.name = Name::decompose(label.trim());
        } else {
            tracing::warn!("no structured name data in vCard, contact will be unnamed");
        }
    }

    Ok(contact)
}

fn import_property(
    contact: &mut Contact,
    line: &ContentLine,
    seen_uid: &mut bool,
    seen_bday: &mut bool,
    seen_gender: &mut bool,
) {
    match line.name.as_str() {
        // consumed by the envelope; regenerated on export
        "VERSION" | "PRODID" => {}

        "UID" => {
            if *seen_uid {
                tracing::debug!(uid = %line.value, "dropping duplicate UID property");
            } else {
                *seen_uid = true;
                contact.uid = line.value.trim().to_string();
            }
        }
        "N" => {
            if contact.name.is_empty() {
                let parts = split_components(&line.value);
                let component = |i: usize| -> String {
                    parts.get(i).map(|s| unescape_text(s)).unwrap_or_default()
                };
                contact.name = Name {
                    family: component(0),
                    given: component(1),
                    additional: component(2),
                    prefix: component(3),
                    suffix: component(4),
                };
            }
        }
        "FN" => {
            if contact.formatted_name.is_none() {
                contact.formatted_name = Some(unescape_text(&line.value));
            }
        }
        "NICKNAME" => {
            if contact.nickname.is_none() {
                // NICKNAME is a comma-separated list; keep the first entry.
                let first = split_list(&line.value).into_iter().next().unwrap_or_default();
                contact.nickname = Some(unescape_text(&first));
            }
        }
        "BDAY" => {
            if *seen_bday {
                tracing::debug!(value = %line.value, "dropping duplicate BDAY property");
            } else if let Some(date) = parse_date(line.value.trim()) {
                *seen_bday = true;
                contact.birthday = Some(date);
            } else {
                tracing::warn!(value = %line.value, "unparseable BDAY, preserving verbatim");
                contact.unsupported.push(line.raw.clone());
            }
        }
        "X-GENDER" => {
            if *seen_gender {
                tracing::debug!(value = %line.value, "dropping duplicate X-GENDER property");
            } else {
                *seen_gender = true;
                contact.gender = Some(line.value.trim().to_string());
            }
        }
        "REV" => {
            // Duplicated REV collapses to the latest last-modified stamp.
            if let Some(ts) = parse_timestamp(line.value.trim()) {
                match contact.rev {
                    Some(existing) if existing >= ts => {
                        tracing::debug!(value = %line.value, "dropping older duplicate REV");
                    }
                    _ => contact.rev = Some(ts),
                }
            } else {
                tracing::warn!(value = %line.value, "unparseable REV, ignoring");
            }
        }
        "EMAIL" => contact.emails.push(Email {
            address: unescape_text(&line.value),
            types: line.type_values(),
        }),
        "TEL" => contact.phones.push(Phone {
            number: unescape_text(&line.value),
            types: line.type_values(),
        }),
        "ADR" => {
            let parts = split_components(&line.value);
            let component = |i: usize| -> String {
                parts.get(i).map(|s| unescape_text(s)).unwrap_or_default()
            };
            let address = Address {
                po_box: component(0),
                extended: component(1),
                street: component(2),
                locality: component(3),
                region: component(4),
                postal_code: component(5),
                country: component(6),
                types: line.type_values(),
            };
            if !address.is_empty() {
                contact.addresses.push(address);
            }
        }
        "URL" => contact.urls.push(line.value.trim().to_string()),
        "PHOTO" => {
            // A usable avatar is any non-file URL; no bytes are fetched at
            // parse time. Inline payloads are preserved verbatim instead.
            let value = line.value.trim();
            let is_url = value.starts_with("http://") || value.starts_with("https://");
            if contact.photo_url.is_none() && is_url {
                contact.photo_url = Some(value.to_string());
            } else {
                contact.unsupported.push(line.raw.clone());
            }
        }
        "ORG" => {
            if contact.org.is_none() {
                let first = split_components(&line.value)
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                contact.org = Some(unescape_text(&first));
            }
        }
        "TITLE" => {
            if contact.title.is_none() {
                contact.title = Some(unescape_text(&line.value));
            }
        }
        "ROLE" => {
            if contact.role.is_none() {
                contact.role = Some(unescape_text(&line.value));
            }
        }
        "X-SIP" => {
            if contact.sip.is_none() {
                contact.sip = Some(line.value.trim().to_string());
            }
        }
        "X-JABBER" => {
            if contact.jabber.is_none() {
                contact.jabber = Some(line.value.trim().to_string());
            }
        }
        "NOTE" => {
            if contact.note.is_none() {
                contact.note = Some(unescape_text(&line.value));
            }
        }
        _ => contact.unsupported.push(line.raw.clone()),
    }
}

// ─── Content-line representation ─────────────────────────────────────────────

#[derive(Debug)]
struct ContentLine {
    /// Property name, upper-cased, group prefix stripped.
    name: String,
    params: Vec<Param>,
    value: String,
    /// The unfolded logical line exactly as read.
    raw: String,
}

#[derive(Debug)]
struct Param {
    name: String,
    value: String,
}

impl ContentLine {
    fn parse(raw: &str) -> Result<Self> {
        let colon = find_unquoted_colon(raw)
            .ok_or_else(|| Error::MalformedContentLine(raw.to_string()))?;
        let (head, value) = (&raw[..colon], &raw[colon + 1..]);

        let mut segments = split_semicolons_respecting_quotes(head);
        if segments.is_empty() {
            return Err(Error::MalformedContentLine(raw.to_string()));
        }
        let name_segment = segments.remove(0);
        // "item1.URL" style grouping: the group prefix is irrelevant for
        // dispatch but stays intact in `raw`.
        let name = name_segment
            .rsplit('.')
            .next()
            .unwrap_or(name_segment)
            .trim()
            .to_uppercase();
        if name.is_empty() {
            return Err(Error::MalformedContentLine(raw.to_string()));
        }

        let params = segments
            .into_iter()
            .map(|seg| match seg.split_once('=') {
                Some((name, value)) => Param {
                    name: name.trim().to_uppercase(),
                    value: value.trim().trim_matches('"').to_string(),
                },
                // vCard 2.1 bare parameter, e.g. TEL;CELL:...
                None => Param {
                    name: "TYPE".to_string(),
                    value: seg.trim().to_string(),
                },
            })
            .collect();

        Ok(Self {
            name,
            params,
            value: value.to_string(),
            raw: raw.to_string(),
        })
    }

    /// All `TYPE=` values, split on commas and upper-cased.
    fn type_values(&self) -> Vec<String> {
        let mut types = Vec::new();
        for p in &self.params {
            if p.name == "TYPE" {
                for t in p.value.split(',') {
                    let t = t.trim().to_uppercase();
                    if !t.is_empty() {
                        types.push(t);
                    }
                }
            }
        }
        types
    }
}

// ─── Low-level helpers ───────────────────────────────────────────────────────

/// Joins CRLF+SP (or LF+SP / LF+HT) continuation lines.
/// Tolerates bare LF line endings for real-world robustness.
pub(crate) fn unfold_lines(input: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in input.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = lines.last_mut() {
                last.push_str(&line[1..]);
            }
        } else {
            lines.push(line.to_string());
        }
    }
    lines.retain(|l| !l.is_empty());
    lines
}

/// Finds the first `:` that is not inside a double-quoted parameter value.
fn find_unquoted_colon(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Splits on `;` while respecting double-quoted parameter values.
fn split_semicolons_respecting_quotes(s: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = 0usize;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                result.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    result.push(&s[start..]);
    result
}

/// Splits a compound value (`N`, `ADR`, `ORG`) on unescaped semicolons.
fn split_components(value: &str) -> Vec<String> {
    split_on_unescaped(value, ';')
}

/// Splits a list value (`NICKNAME`) on unescaped commas.
fn split_list(value: &str) -> Vec<String> {
    split_on_unescaped(value, ',')
}

fn split_on_unescaped(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    parts.push(current);
    parts
}

/// Resolves RFC 2426 text escapes: `\n`, `\,`, `\;`, `\\`.
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out.trim().to_string()
}

// ─── Date handling ───────────────────────────────────────────────────────────

/// Parses a vCard date, accepting hyphen-separated or compact ISO 8601, with
/// an optional time portion which is discarded.
fn parse_date(value: &str) -> Option<Date> {
    let date_part = value.split('T').next().unwrap_or(value);
    Date::strptime("%Y-%m-%d", date_part)
        .or_else(|_| Date::strptime("%Y%m%d", date_part))
        .ok()
}

/// Parses a `REV` timestamp.
///
/// Accepts RFC 3339 (`2016-01-01T12:00:00Z`, with offset), compact ISO 8601
/// with or without the `Z` suffix, and bare dates (midnight UTC). Values
/// without zone information are treated as UTC.
fn parse_timestamp(value: &str) -> Option<Timestamp> {
    if let Ok(ts) = value.parse::<Timestamp>() {
        return Some(ts);
    }

    let naive = value.strip_suffix('Z').unwrap_or(value);
    let datetime = DateTime::strptime("%Y%m%dT%H%M%S", naive)
        .or_else(|_| DateTime::strptime("%Y-%m-%dT%H:%M:%S", naive))
        .ok()
        .or_else(|| parse_date(naive).map(|d| d.at(0, 0, 0, 0)));

    datetime
        .and_then(|dt| dt.to_zoned(TimeZone::UTC).ok())
        .map(|zoned| zoned.timestamp())
}
