// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! TOML account configuration for the command-line tool.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use cardsync_carddav::AuthMethod;
use cardsync_core::{AuthError, AuthProvider, Credentials};

/// One account, as described in the configuration file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AccountConfig {
    /// Account identifier used in compound contact GUIDs.
    #[serde(default = "default_account_id")]
    pub account_id: u32,

    /// CardDAV server address.
    pub server_url: String,

    /// Optional explicit addressbook path, bypassing discovery.
    #[serde(default)]
    pub addressbook_path: Option<String>,

    /// Username for basic authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for basic authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// OAuth bearer token, used instead of username/password when set.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub ignore_ssl_errors: bool,

    /// Where the JSON contact store lives.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

const fn default_account_id() -> u32 {
    1
}

fn default_store_path() -> PathBuf {
    PathBuf::from("contacts.json")
}

impl AccountConfig {
    /// Loads the configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    fn auth_method(&self) -> AuthMethod {
        if let Some(token) = self.access_token.clone().filter(|t| !t.is_empty()) {
            return AuthMethod::Bearer { token };
        }
        match (self.username.clone(), self.password.clone()) {
            (Some(username), Some(password)) if !username.is_empty() => {
                AuthMethod::Basic { username, password }
            }
            _ => AuthMethod::None,
        }
    }
}

/// Serves credentials straight from the configuration file.
#[derive(Debug)]
pub struct FileAuth {
    config: AccountConfig,
}

impl FileAuth {
    pub fn new(config: AccountConfig) -> Self {
        Self { config }
    }
}

impl AuthProvider for FileAuth {
    fn credentials(&mut self, _account_id: u32) -> Result<Credentials, AuthError> {
        if self.config.server_url.is_empty() {
            return Err(AuthError("server_url is not configured".to_string()));
        }
        Ok(Credentials {
            server_url: self.config.server_url.clone(),
            addressbook_path: self.config.addressbook_path.clone(),
            auth: self.config.auth_method(),
            ignore_ssl_errors: self.config.ignore_ssl_errors,
        })
    }

    fn set_credentials_need_update(&mut self, account_id: u32) {
        tracing::warn!(account = account_id, "credentials rejected by server; update the config file");
    }
}
