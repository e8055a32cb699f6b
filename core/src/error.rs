// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use cardsync_carddav::CardDavError;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Failures of one sync run.
#[non_exhaustive]
#[derive(Debug)]
pub enum SyncError {
    /// Sign-in against the account store failed.
    Auth(AuthError),
    /// The protocol engine failed.
    Engine(CardDavError),
    /// The local store failed.
    Store(StoreError),
    /// The run was aborted by the host.
    Aborted,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(e) => e.fmt(f),
            Self::Engine(e) => e.fmt(f),
            Self::Store(e) => e.fmt(f),
            Self::Aborted => write!(f, "sync aborted"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<AuthError> for SyncError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<CardDavError> for SyncError {
    fn from(e: CardDavError) -> Self {
        Self::Engine(e)
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
