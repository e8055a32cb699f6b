// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! vCard 3.0 codec for `CardDAV` synchronization.
//!
//! Converts between vCard text and the [`Contact`] model. Only a bounded set
//! of properties is mapped to structured fields; every other property is
//! preserved verbatim and re-emitted on serialization, so foreign clients
//! observe no data loss across a sync round-trip.

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(
    clippy::similar_names,
    clippy::single_match_else,
    clippy::missing_errors_doc
)]

mod contact;
mod error;
mod parse;
mod serialize;

pub use crate::contact::{Address, Contact, Email, Name, Phone, compound_prefix, compound_uid};
pub use crate::error::{Error, Result};
pub use crate::parse::parse;
pub use crate::serialize::to_vcard;

/// Property names mapped to structured [`Contact`] fields.
///
/// Properties outside this list are stashed in [`Contact::unsupported`] on
/// import and spliced back into the outgoing vCard on export.
pub const SUPPORTED_PROPERTIES: &[&str] = &[
    "VERSION", "PRODID", "REV", "N", "FN", "NICKNAME", "BDAY", "X-GENDER", "EMAIL", "TEL", "ADR",
    "URL", "PHOTO", "ORG", "TITLE", "ROLE", "X-SIP", "X-JABBER", "NOTE", "UID",
];
