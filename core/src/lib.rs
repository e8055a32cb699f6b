// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Sync session driver for `CardDAV` accounts.
//!
//! A [`Syncer`] runs one synchronization session: it obtains credentials
//! from an [`AuthProvider`], reconciles the server's address books with the
//! collections known to a [`LocalStore`], applies remote deltas, uploads
//! local changes and checkpoints the per-collection ctag/sync-token pair.

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
#![allow(clippy::missing_errors_doc)]

mod auth;
mod error;
mod store;
mod syncer;

pub use crate::auth::{AuthError, AuthProvider, Credentials};
pub use crate::error::SyncError;
pub use crate::store::{
    CollectionChanges, CollectionRecord, ContactChanges, LocalChanges, LocalStore, StoreError,
};
pub use crate::syncer::{AbortHandle, SyncReport, Syncer};
