//! The single community database.
//!
//! All modules persist into one SQLite file so that composite writes, most
//! importantly the review upsert + album score recompute, can run in one
//! transaction. The schema history is versioned; opening an older database
//! applies the pending migrations.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::account::schema::{
    ACCOUNT_PASSWORD_TABLE_V_0, ACCOUNT_TABLE_V_0, AUTH_TOKEN_TABLE_V_0,
};
use crate::catalog::{
    ALBUM_TABLE_V_0, BAND_TABLE_V_0, CONCERT_TABLE_V_0, MEMBER_TABLE_V_0, SONG_TABLE_V_0,
};
use crate::fan_content::schema::{
    FAN_ATTEND_CONCERT_TABLE_V_0, FAN_LIKE_ALBUM_TABLE_V_0, FAN_LIKE_BAND_TABLE_V_0,
    FAN_LIKE_SONG_TABLE_V_0, REVIEW_TABLE_V_0, REVIEW_TABLE_V_1,
};
use crate::sqlite_persistence::{VersionedSchema, BASE_DB_VERSION};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub const COMMUNITY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            BAND_TABLE_V_0,
            MEMBER_TABLE_V_0,
            ALBUM_TABLE_V_0,
            SONG_TABLE_V_0,
            CONCERT_TABLE_V_0,
            ACCOUNT_TABLE_V_0,
            ACCOUNT_PASSWORD_TABLE_V_0,
            AUTH_TOKEN_TABLE_V_0,
            REVIEW_TABLE_V_0,
            FAN_LIKE_BAND_TABLE_V_0,
            FAN_LIKE_ALBUM_TABLE_V_0,
            FAN_LIKE_SONG_TABLE_V_0,
            FAN_ATTEND_CONCERT_TABLE_V_0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            BAND_TABLE_V_0,
            MEMBER_TABLE_V_0,
            ALBUM_TABLE_V_0,
            SONG_TABLE_V_0,
            CONCERT_TABLE_V_0,
            ACCOUNT_TABLE_V_0,
            ACCOUNT_PASSWORD_TABLE_V_0,
            AUTH_TOKEN_TABLE_V_0,
            REVIEW_TABLE_V_1,
            FAN_LIKE_BAND_TABLE_V_0,
            FAN_LIKE_ALBUM_TABLE_V_0,
            FAN_LIKE_SONG_TABLE_V_0,
            FAN_ATTEND_CONCERT_TABLE_V_0,
        ],
        // v0 allowed the same fan to review the same album more than once.
        // Rebuild the review table with the (fan_id, album_id) unique
        // constraint, keeping the newest review per pair, then bring the
        // stored album means back in line with the surviving reviews.
        migration: Some(|conn: &Connection| {
            conn.execute("ALTER TABLE review RENAME TO review_backup;", [])?;
            conn.execute("DROP INDEX IF EXISTS idx_review_album_id;", [])?;
            conn.execute("DROP INDEX IF EXISTS idx_review_fan_id;", [])?;

            REVIEW_TABLE_V_1.create(conn)?;

            conn.execute(
                "INSERT INTO review (review_id, fan_id, album_id, score, comment, review_time) \
                 SELECT review_id, fan_id, album_id, score, comment, review_time \
                 FROM review_backup rb \
                 WHERE rb.review_id = ( \
                     SELECT b.review_id FROM review_backup b \
                     WHERE b.fan_id = rb.fan_id AND b.album_id = rb.album_id \
                     ORDER BY b.review_time DESC, b.review_id DESC \
                     LIMIT 1)",
                [],
            )?;
            conn.execute("DROP TABLE review_backup;", [])?;

            conn.execute(
                "UPDATE album SET avg_score = \
                 (SELECT AVG(score) FROM review WHERE review.album_id = album.album_id)",
                [],
            )?;
            Ok(())
        }),
    },
];

/// Open (or create) the community database, validate its schema and apply
/// pending migrations.
pub fn open_community_db<T: AsRef<Path>>(db_path: T) -> Result<Arc<Mutex<Connection>>> {
    let conn = if db_path.as_ref().exists() {
        Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?
    } else {
        let conn = Connection::open(db_path)?;
        COMMUNITY_VERSIONED_SCHEMAS
            .last()
            .context("No schemas declared")?
            .create(&conn)?;
        conn
    };

    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute("PRAGMA foreign_keys = ON;", [])?;

    let db_version = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
        .context("Failed to read database version")?
        - BASE_DB_VERSION as i64;

    if db_version < 0 {
        bail!(
            "Database version {} is too old, does not contain base db version {}",
            db_version,
            BASE_DB_VERSION
        );
    }
    let version = db_version as usize;

    if version >= COMMUNITY_VERSIONED_SCHEMAS.len() {
        bail!("Database version {} is too new", db_version);
    }
    COMMUNITY_VERSIONED_SCHEMAS
        .get(version)
        .context("Failed to get schema")?
        .validate(&conn)?;

    migrate_if_needed(&conn, version)?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// A fresh in-memory database at the latest schema version.
pub fn open_in_memory() -> Result<Arc<Mutex<Connection>>> {
    let conn = Connection::open_in_memory()?;
    COMMUNITY_VERSIONED_SCHEMAS
        .last()
        .context("No schemas declared")?
        .create(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn migrate_if_needed(conn: &Connection, version: usize) -> Result<()> {
    let mut latest_from = version;
    for schema in COMMUNITY_VERSIONED_SCHEMAS.iter().skip(version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating db from version {} to {}",
                latest_from, schema.version
            );
            migration_fn(conn)?;
            latest_from = schema.version;
        }
    }
    conn.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn creates_validates_and_reopens() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("community.db");

        {
            let conn = open_community_db(&db_path).unwrap();
            let conn = conn.lock().unwrap();
            conn.execute("INSERT INTO band (name) VALUES ('MyGO!!!!!')", [])
                .unwrap();
        }

        let conn = open_community_db(&db_path).unwrap();
        let conn = conn.lock().unwrap();
        let count: usize = conn
            .query_row("SELECT COUNT(*) FROM band", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn rejects_unrelated_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("foreign.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("CREATE TABLE something (id INTEGER)", [])
                .unwrap();
        }
        assert!(open_community_db(&db_path).is_err());
    }

    #[test]
    fn migration_dedups_reviews_and_recomputes_means() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("v0.db");

        {
            let conn = Connection::open(&db_path).unwrap();
            COMMUNITY_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

            conn.execute("INSERT INTO band (band_id, name) VALUES (1, 'MyGO!!!!!')", [])
                .unwrap();
            conn.execute(
                "INSERT INTO album (album_id, band_id, title) VALUES (10, 1, 'Mion')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO account (id, handle, role) VALUES (7, 'tomori', 'fan'), (8, 'anon', 'fan')",
                [],
            )
            .unwrap();

            // Fan 7 reviewed the album three times under the defective v0
            // schema; fan 8 once. Stored mean reflects all four rows.
            for (fan_id, score, review_time) in
                [(7, 1, 100), (7, 2, 200), (7, 5, 300), (8, 3, 250)]
            {
                conn.execute(
                    "INSERT INTO review (fan_id, album_id, score, review_time) \
                     VALUES (?1, 10, ?2, ?3)",
                    params![fan_id, score, review_time],
                )
                .unwrap();
            }
            conn.execute("UPDATE album SET avg_score = 2.75 WHERE album_id = 10", [])
                .unwrap();
        }

        let conn = open_community_db(&db_path).unwrap();
        let conn = conn.lock().unwrap();

        let reviews: Vec<(usize, i64, i64)> = conn
            .prepare("SELECT fan_id, score, review_time FROM review ORDER BY fan_id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        // Newest review per (fan, album) survives.
        assert_eq!(reviews, vec![(7, 5, 300), (8, 3, 250)]);

        let avg: f64 = conn
            .query_row("SELECT avg_score FROM album WHERE album_id = 10", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(avg, 4.0);

        // Re-inserting a duplicate pair now trips the unique constraint.
        let dup = conn.execute(
            "INSERT INTO review (fan_id, album_id, score, review_time) VALUES (7, 10, 1, 400)",
            [],
        );
        assert!(dup.is_err());
    }
}
