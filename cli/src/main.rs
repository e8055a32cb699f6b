// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Command-line CardDAV synchronization tool.
//!
//! Reads a TOML account configuration and either lists the account's
//! address books or performs a one-shot sync into a JSON contact store.

mod config;
mod store;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use cardsync_core::Syncer;

use crate::config::{AccountConfig, FileAuth};
use crate::store::JsonStore;

#[derive(Parser)]
#[command(author, version, about = "CardDAV contact synchronization")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "cardsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and list the account's address books.
    Addressbooks,
    /// Run one synchronization pass.
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let account = AccountConfig::load(&cli.config)?;
    let account_id = account.account_id;
    let store = JsonStore::open(&account.store_path)?;
    let auth = FileAuth::new(account);
    let mut syncer = Syncer::new(account_id, auth, store);

    match cli.command {
        Commands::Addressbooks => {
            let books = syncer.determine_addressbooks().await?;
            for book in books {
                let name = book.display_name.as_deref().unwrap_or("(unnamed)");
                let access = if book.read_only { "read-only" } else { "read-write" };
                let delta = if book.sync_token.is_some() {
                    "webdav-sync"
                } else if book.ctag.is_some() {
                    "ctag"
                } else {
                    "manual"
                };
                println!("{name}\t{}\t{access}\t{delta}", book.url);
            }
        }
        Commands::Sync => {
            let report = syncer.sync().await?;
            let (_, store) = syncer.into_parts();
            println!(
                "synced {} collection(s): {} added, {} modified, {} removed remotely; \
                 {} added, {} modified, {} deleted on server; {} contacts stored",
                report.collections_synced,
                report.remote_additions,
                report.remote_modifications,
                report.remote_removals,
                report.uploaded_additions,
                report.uploaded_modifications,
                report.uploaded_deletions,
                store.contact_count(),
            );
        }
    }

    Ok(())
}
