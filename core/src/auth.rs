// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Seam to the external account/credentials store.

use std::fmt;

use cardsync_carddav::{AuthMethod, CardDavConfig};

/// Everything the engine needs from the account store to talk to a server.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Server address; a missing scheme defaults to `https://`.
    pub server_url: String,
    /// Optional explicit addressbook path, bypassing discovery.
    pub addressbook_path: Option<String>,
    /// Basic or bearer credentials.
    pub auth: AuthMethod,
    /// Account-level SSL policy.
    pub ignore_ssl_errors: bool,
}

impl Credentials {
    /// Builds the engine configuration for these credentials.
    #[must_use]
    pub fn into_config(self) -> CardDavConfig {
        CardDavConfig {
            server_url: self.server_url,
            addressbook_path: self.addressbook_path,
            auth: self.auth,
            ignore_ssl_errors: self.ignore_ssl_errors,
            ..CardDavConfig::default()
        }
    }
}

/// Supplies account credentials and receives the credentials-expired signal.
pub trait AuthProvider {
    /// Signs in and returns the account's server credentials.
    fn credentials(&mut self, account_id: u32) -> Result<Credentials, AuthError>;

    /// Flags the account as needing a credentials refresh (after HTTP 401).
    fn set_credentials_need_update(&mut self, account_id: u32);
}

/// Sign-in failure reported by the account store.
#[derive(Debug, Clone)]
pub struct AuthError(pub String);

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sign-in failed: {}", self.0)
    }
}

impl std::error::Error for AuthError {}
