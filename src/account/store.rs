use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, types::Type, Connection, OptionalExtension};

use super::auth::{AuthTokenValue, FanclubHasher};
use super::models::{Account, Role};
use super::schema::{ACCOUNT_PASSWORD_TABLE_V_0, ACCOUNT_TABLE_V_0, AUTH_TOKEN_TABLE_V_0};
use super::trait_def::AccountStore;

#[derive(Clone)]
pub struct SqliteAccountStore {
    conn: Arc<Mutex<Connection>>,
    hasher: FanclubHasher,
}

impl SqliteAccountStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        SqliteAccountStore {
            conn,
            hasher: FanclubHasher::Argon2,
        }
    }
}

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    let role_str: String = row.get(2)?;
    let role = Role::from_str(&role_str)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, err.into()))?;
    Ok(Account {
        id: row.get(0)?,
        handle: row.get(1)?,
        role,
        band_id: row.get(3)?,
        created: row.get(4)?,
    })
}

impl AccountStore for SqliteAccountStore {
    fn create_account(&self, handle: &str, role: Role, band_id: Option<usize>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (handle, role, band_id) VALUES (?1, ?2, ?3)",
                ACCOUNT_TABLE_V_0.name
            ),
            params![handle, role.as_str(), band_id],
        )
        .with_context(|| format!("Failed to create account {}", handle))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_account(&self, account_id: usize) -> Result<Option<Account>> {
        let conn = self.conn.lock().unwrap();
        let account = conn
            .query_row(
                &format!(
                    "SELECT id, handle, role, band_id, created FROM {} WHERE id = ?1",
                    ACCOUNT_TABLE_V_0.name
                ),
                params![account_id],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    fn get_account_by_handle(&self, handle: &str) -> Result<Option<Account>> {
        let conn = self.conn.lock().unwrap();
        let account = conn
            .query_row(
                &format!(
                    "SELECT id, handle, role, band_id, created FROM {} WHERE handle = ?1",
                    ACCOUNT_TABLE_V_0.name
                ),
                params![handle],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    fn get_all_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, handle, role, band_id, created FROM {} ORDER BY id",
            ACCOUNT_TABLE_V_0.name
        ))?;
        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn delete_account(&self, account_id: usize) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", ACCOUNT_TABLE_V_0.name),
            params![account_id],
        )?;
        Ok(())
    }

    fn set_password(&self, account_id: usize, plain: &str) -> Result<()> {
        let salt = self.hasher.generate_b64_salt();
        let hash = self.hasher.hash(plain.as_bytes(), &salt)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (account_id, salt, hash, hasher) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (account_id) DO UPDATE SET \
                 salt = excluded.salt, hash = excluded.hash, hasher = excluded.hasher",
                ACCOUNT_PASSWORD_TABLE_V_0.name
            ),
            params![account_id, salt, hash, self.hasher.to_string()],
        )
        .with_context(|| format!("Failed to set password for account {}", account_id))?;
        Ok(())
    }

    fn verify_password(&self, handle: &str, plain: &str) -> Result<Option<Account>> {
        let Some(account) = self.get_account_by_handle(handle)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().unwrap();
        let credential = conn
            .query_row(
                &format!(
                    "SELECT hash, hasher FROM {} WHERE account_id = ?1",
                    ACCOUNT_PASSWORD_TABLE_V_0.name
                ),
                params![account.id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((hash, hasher_name)) = credential else {
            return Ok(None);
        };
        drop(conn);

        let hasher = FanclubHasher::from_str(&hasher_name)?;
        if hasher.verify(plain, hash.as_str())? {
            Ok(Some(account))
        } else {
            Ok(None)
        }
    }

    fn create_token(&self, account_id: usize) -> Result<AuthTokenValue> {
        let token = AuthTokenValue::generate();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (account_id, value) VALUES (?1, ?2)",
                AUTH_TOKEN_TABLE_V_0.name
            ),
            params![account_id, token.0],
        )
        .with_context(|| format!("Failed to create token for account {}", account_id))?;
        Ok(token)
    }

    fn account_for_token(&self, token: &AuthTokenValue) -> Result<Option<Account>> {
        let account_id: Option<usize> = {
            let conn = self.conn.lock().unwrap();
            let account_id = conn
                .query_row(
                    &format!(
                        "SELECT account_id FROM {} WHERE value = ?1",
                        AUTH_TOKEN_TABLE_V_0.name
                    ),
                    params![token.0],
                    |row| row.get(0),
                )
                .optional()?;
            if account_id.is_some() {
                conn.execute(
                    &format!(
                        "UPDATE {} SET last_used = cast(strftime('%s','now') as int) WHERE value = ?1",
                        AUTH_TOKEN_TABLE_V_0.name
                    ),
                    params![token.0],
                )?;
            }
            account_id
        };

        match account_id {
            Some(id) => self.get_account(id),
            None => Ok(None),
        }
    }

    fn delete_token(&self, token: &AuthTokenValue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE value = ?1", AUTH_TOKEN_TABLE_V_0.name),
            params![token.0],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn create_test_store() -> SqliteAccountStore {
        SqliteAccountStore::new(open_in_memory().unwrap())
    }

    #[test]
    fn creates_and_reads_accounts() {
        let store = create_test_store();
        let id = store.create_account("tomori", Role::Fan, None).unwrap();

        let account = store.get_account(id).unwrap().unwrap();
        assert_eq!(account.handle, "tomori");
        assert_eq!(account.role, Role::Fan);
        assert!(account.band_id.is_none());

        let by_handle = store.get_account_by_handle("tomori").unwrap().unwrap();
        assert_eq!(by_handle.id, id);
        assert!(store.get_account_by_handle("nobody").unwrap().is_none());
    }

    #[test]
    fn rejects_duplicate_handles() {
        let store = create_test_store();
        store.create_account("tomori", Role::Fan, None).unwrap();
        assert!(store.create_account("tomori", Role::Admin, None).is_err());
    }

    #[test]
    fn band_account_requires_existing_band() {
        let store = create_test_store();
        assert!(store
            .create_account("mygo_official", Role::Band, Some(123))
            .is_err());
    }

    #[test]
    fn password_round_trip() {
        let store = create_test_store();
        let id = store.create_account("tomori", Role::Fan, None).unwrap();
        store.set_password(id, "my secret").unwrap();

        let verified = store.verify_password("tomori", "my secret").unwrap();
        assert_eq!(verified.unwrap().id, id);
        assert!(store.verify_password("tomori", "wrong").unwrap().is_none());
        assert!(store
            .verify_password("nobody", "my secret")
            .unwrap()
            .is_none());
    }

    #[test]
    fn set_password_replaces_old_credential() {
        let store = create_test_store();
        let id = store.create_account("tomori", Role::Fan, None).unwrap();
        store.set_password(id, "old").unwrap();
        store.set_password(id, "new").unwrap();

        assert!(store.verify_password("tomori", "old").unwrap().is_none());
        assert!(store.verify_password("tomori", "new").unwrap().is_some());
    }

    #[test]
    fn account_without_password_never_verifies() {
        let store = create_test_store();
        store.create_account("tomori", Role::Fan, None).unwrap();
        assert!(store.verify_password("tomori", "").unwrap().is_none());
    }

    #[test]
    fn token_round_trip() {
        let store = create_test_store();
        let id = store.create_account("tomori", Role::Fan, None).unwrap();

        let token = store.create_token(id).unwrap();
        let resolved = store.account_for_token(&token).unwrap().unwrap();
        assert_eq!(resolved.id, id);

        store.delete_token(&token).unwrap();
        assert!(store.account_for_token(&token).unwrap().is_none());

        let unknown = AuthTokenValue("notatoken".to_string());
        assert!(store.account_for_token(&unknown).unwrap().is_none());
    }

    #[test]
    fn deleting_account_invalidates_tokens() {
        let store = create_test_store();
        let id = store.create_account("tomori", Role::Fan, None).unwrap();
        let token = store.create_token(id).unwrap();

        store.delete_account(id).unwrap();
        assert!(store.account_for_token(&token).unwrap().is_none());
    }
}
