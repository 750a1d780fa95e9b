use anyhow::Result;

use super::auth::AuthTokenValue;
use super::models::{Account, Role};

/// Account storage and authentication.
///
/// Password verification and token resolution return `Ok(None)` for bad
/// credentials; `Err` means the store itself failed.
pub trait AccountStore: Send + Sync {
    fn create_account(&self, handle: &str, role: Role, band_id: Option<usize>) -> Result<usize>;
    fn get_account(&self, account_id: usize) -> Result<Option<Account>>;
    fn get_account_by_handle(&self, handle: &str) -> Result<Option<Account>>;
    fn get_all_accounts(&self) -> Result<Vec<Account>>;
    fn delete_account(&self, account_id: usize) -> Result<()>;

    /// Replace the account's password credential.
    fn set_password(&self, account_id: usize, plain: &str) -> Result<()>;
    /// Verify handle/password, returning the account on success.
    fn verify_password(&self, handle: &str, plain: &str) -> Result<Option<Account>>;

    /// Mint a new session token for the account.
    fn create_token(&self, account_id: usize) -> Result<AuthTokenValue>;
    /// Resolve a token to its account, touching `last_used`.
    fn account_for_token(&self, token: &AuthTokenValue) -> Result<Option<Account>>;
    fn delete_token(&self, token: &AuthTokenValue) -> Result<()>;
}
