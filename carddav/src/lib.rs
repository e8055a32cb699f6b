// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CardDAV` client engine for bidirectional contact synchronization
//! (RFC 6352, RFC 6578, RFC 6764).

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
    clippy::option_option,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::missing_errors_doc
)]

mod client;
mod config;
mod error;
mod http;
mod request;
mod response;
mod types;
pub mod url;
mod xml;

pub use crate::client::CardDavClient;
pub use crate::config::{AuthMethod, CardDavConfig};
pub use crate::error::CardDavError;
pub use crate::request::{AddressbookMultigetRequest, Prop, PropFindRequest, SyncCollectionRequest};
pub use crate::response::{
    MultiStatusResponse, PrincipalLookup, PropStat, Properties, ResourceType, ResponseItem,
};
pub use crate::types::{
    AddressBook, ChangeType, CollectionDelta, ETag, Href, ResourceChange, UpsyncOutcome,
};
