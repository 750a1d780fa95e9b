//! Maintenance CLI for community accounts.
//!
//! Operates directly on the community database, bypassing the HTTP server.
//! Intended for bootstrapping the first admin account and for support tasks.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use fanclub_server::account::{AccountStore, Role, SqliteAccountStore};
use fanclub_server::db::open_community_db;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the community SQLite database.
    #[clap(long)]
    db_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new account.
    Create {
        handle: String,
        /// One of: admin, band, fan.
        role: String,
        /// For band accounts, the id of the band this account administers.
        #[clap(long)]
        band_id: Option<usize>,
        /// Initial password, set right after creation.
        #[clap(long)]
        password: Option<String>,
    },
    /// Set or replace an account's password.
    SetPassword { handle: String, password: String },
    /// Verify a handle/password pair.
    CheckPassword { handle: String, password: String },
    /// List all accounts.
    List,
    /// Delete an account and everything attached to it.
    Delete { handle: String },
}

fn require_account(store: &SqliteAccountStore, handle: &str) -> Result<usize> {
    match store.get_account_by_handle(handle)? {
        Some(account) => Ok(account.id),
        None => bail!("No account with handle {}", handle),
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let db_path = args.db_dir.join("community.db");
    let conn = open_community_db(&db_path)
        .with_context(|| format!("Failed to open community db at {:?}", db_path))?;
    let store = SqliteAccountStore::new(conn);

    match args.command {
        Command::Create {
            handle,
            role,
            band_id,
            password,
        } => {
            let role = Role::from_str(&role)?;
            if role == Role::Band && band_id.is_none() {
                bail!("Band accounts need --band-id");
            }
            let account_id = store.create_account(&handle, role, band_id)?;
            if let Some(password) = password {
                store.set_password(account_id, &password)?;
            }
            println!("Created account {} with id {}", handle, account_id);
        }
        Command::SetPassword { handle, password } => {
            let account_id = require_account(&store, &handle)?;
            store.set_password(account_id, &password)?;
            println!("Password updated for {}", handle);
        }
        Command::CheckPassword { handle, password } => {
            match store.verify_password(&handle, &password)? {
                Some(_) => println!("Password ok"),
                None => println!("Invalid credentials"),
            }
        }
        Command::List => {
            for account in store.get_all_accounts()? {
                println!(
                    "{}\t{}\t{}\t{}",
                    account.id,
                    account.handle,
                    account.role,
                    account
                        .band_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        Command::Delete { handle } => {
            let account_id = require_account(&store, &handle)?;
            store.delete_account(account_id)?;
            println!("Deleted account {}", handle);
        }
    }

    Ok(())
}
