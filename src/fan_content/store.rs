use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::account::schema::ACCOUNT_TABLE_V_0;
use crate::catalog::{ALBUM_TABLE_V_0, BAND_TABLE_V_0, CONCERT_TABLE_V_0, SONG_TABLE_V_0};
use crate::sqlite_persistence::Table;

use super::error::{FanContentError, FanContentResult};
use super::models::{
    AlbumReview, BandFanStats, LeaderboardEntry, LikeTarget, NewReview, Review, ToggleOutcome,
};
use super::schema::{
    FAN_ATTEND_CONCERT_TABLE_V_0, FAN_LIKE_ALBUM_TABLE_V_0, FAN_LIKE_BAND_TABLE_V_0,
    FAN_LIKE_SONG_TABLE_V_0, REVIEW_TABLE_V_1,
};
use super::trait_def::FanContentStore;

const MIN_SCORE: i64 = 1;
const MAX_SCORE: i64 = 5;

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

struct LikeTables {
    link_table: &'static Table,
    link_column: &'static str,
    target_table: &'static str,
    target_pk: &'static str,
}

/// Static mapping from a like target to its tables. Request input never ends
/// up interpolated into SQL.
fn like_tables(target: LikeTarget) -> LikeTables {
    match target {
        LikeTarget::Band => LikeTables {
            link_table: &FAN_LIKE_BAND_TABLE_V_0,
            link_column: "band_id",
            target_table: BAND_TABLE_V_0.name,
            target_pk: "band_id",
        },
        LikeTarget::Album => LikeTables {
            link_table: &FAN_LIKE_ALBUM_TABLE_V_0,
            link_column: "album_id",
            target_table: ALBUM_TABLE_V_0.name,
            target_pk: "album_id",
        },
        LikeTarget::Song => LikeTables {
            link_table: &FAN_LIKE_SONG_TABLE_V_0,
            link_column: "song_id",
            target_table: SONG_TABLE_V_0.name,
            target_pk: "song_id",
        },
        LikeTarget::Concert => LikeTables {
            link_table: &FAN_ATTEND_CONCERT_TABLE_V_0,
            link_column: "concert_id",
            target_table: CONCERT_TABLE_V_0.name,
            target_pk: "concert_id",
        },
    }
}

#[derive(Clone)]
pub struct SqliteFanContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFanContentStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        SqliteFanContentStore { conn }
    }

    fn row_exists(
        conn: &Connection,
        table: &str,
        pk_column: &str,
        id: usize,
    ) -> FanContentResult<bool> {
        let found = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE {} = ?1", table, pk_column),
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn require_album(conn: &Connection, album_id: usize) -> FanContentResult<()> {
        if !Self::row_exists(conn, ALBUM_TABLE_V_0.name, "album_id", album_id)? {
            return Err(FanContentError::NotFound {
                entity: "album",
                id: album_id,
            });
        }
        Ok(())
    }

    fn require_fan(conn: &Connection, fan_id: usize) -> FanContentResult<()> {
        if !Self::row_exists(conn, ACCOUNT_TABLE_V_0.name, "id", fan_id)? {
            return Err(FanContentError::NotFound {
                entity: "fan",
                id: fan_id,
            });
        }
        Ok(())
    }

    /// Recompute `album.avg_score` inside the caller's transaction. The
    /// UPDATE must match exactly the one album row.
    fn recompute_in_tx(tx: &Transaction, album_id: usize) -> FanContentResult<Option<f64>> {
        let updated = tx.execute(
            &format!(
                "UPDATE {album} SET avg_score = \
                 (SELECT AVG(score) FROM {review} WHERE album_id = ?1) \
                 WHERE album_id = ?1",
                album = ALBUM_TABLE_V_0.name,
                review = REVIEW_TABLE_V_1.name,
            ),
            params![album_id],
        )?;
        if updated != 1 {
            return Err(FanContentError::Consistency(format!(
                "score recompute matched {} album rows for album {}",
                updated, album_id
            )));
        }
        let avg = tx.query_row(
            &format!(
                "SELECT avg_score FROM {} WHERE album_id = ?1",
                ALBUM_TABLE_V_0.name
            ),
            params![album_id],
            |row| row.get::<_, Option<f64>>(0),
        )?;
        Ok(avg)
    }
}

impl FanContentStore for SqliteFanContentStore {
    fn submit_review(&self, fan_id: usize, review: NewReview) -> FanContentResult<Review> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&review.score) {
            return Err(FanContentError::Validation {
                field: "score",
                message: format!(
                    "must be between {} and {}, got {}",
                    MIN_SCORE, MAX_SCORE, review.score
                ),
            });
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        Self::require_album(&tx, review.album_id)?;
        Self::require_fan(&tx, fan_id)?;

        let review_time = unix_now();
        tx.execute(
            &format!(
                "INSERT INTO {} (fan_id, album_id, score, comment, review_time) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT (fan_id, album_id) DO UPDATE SET \
                 score = excluded.score, \
                 comment = excluded.comment, \
                 review_time = excluded.review_time",
                REVIEW_TABLE_V_1.name
            ),
            params![fan_id, review.album_id, review.score, review.comment, review_time],
        )?;

        Self::recompute_in_tx(&tx, review.album_id)?;

        let stored = tx.query_row(
            &format!(
                "SELECT review_id, fan_id, album_id, score, comment, review_time \
                 FROM {} WHERE fan_id = ?1 AND album_id = ?2",
                REVIEW_TABLE_V_1.name
            ),
            params![fan_id, review.album_id],
            |row| {
                Ok(Review {
                    review_id: row.get(0)?,
                    fan_id: row.get(1)?,
                    album_id: row.get(2)?,
                    score: row.get(3)?,
                    comment: row.get(4)?,
                    review_time: row.get(5)?,
                })
            },
        )?;

        tx.commit()?;
        Ok(stored)
    }

    fn recompute_album_score(&self, album_id: usize) -> FanContentResult<Option<f64>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::require_album(&tx, album_id)?;
        let avg = Self::recompute_in_tx(&tx, album_id)?;
        tx.commit()?;
        Ok(avg)
    }

    fn top_albums(&self, n: usize) -> FanContentResult<Vec<LeaderboardEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT a.album_id, a.band_id, a.title, b.name, a.avg_score, \
             (SELECT COUNT(*) FROM {review} r WHERE r.album_id = a.album_id) \
             FROM {album} a JOIN {band} b ON b.band_id = a.band_id \
             WHERE a.avg_score IS NOT NULL \
             ORDER BY a.avg_score DESC, a.album_id ASC \
             LIMIT ?1",
            review = REVIEW_TABLE_V_1.name,
            album = ALBUM_TABLE_V_0.name,
            band = BAND_TABLE_V_0.name,
        ))?;
        let entries = stmt
            .query_map(params![n], |row| {
                Ok(LeaderboardEntry {
                    album_id: row.get(0)?,
                    band_id: row.get(1)?,
                    title: row.get(2)?,
                    band_name: row.get(3)?,
                    avg_score: row.get(4)?,
                    review_count: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn toggle_like(
        &self,
        fan_id: usize,
        target: LikeTarget,
        entity_id: usize,
    ) -> FanContentResult<ToggleOutcome> {
        let tables = like_tables(target);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        if !Self::row_exists(&tx, tables.target_table, tables.target_pk, entity_id)? {
            return Err(FanContentError::NotFound {
                entity: target.entity_name(),
                id: entity_id,
            });
        }
        Self::require_fan(&tx, fan_id)?;

        let deleted = tx.execute(
            &format!(
                "DELETE FROM {} WHERE fan_id = ?1 AND {} = ?2",
                tables.link_table.name, tables.link_column
            ),
            params![fan_id, entity_id],
        )?;
        let outcome = if deleted > 0 {
            ToggleOutcome::Unfollowed
        } else {
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (fan_id, {}) VALUES (?1, ?2)",
                    tables.link_table.name, tables.link_column
                ),
                params![fan_id, entity_id],
            )?;
            ToggleOutcome::Followed
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn album_reviews(&self, album_id: usize) -> FanContentResult<Vec<AlbumReview>> {
        let conn = self.conn.lock().unwrap();
        Self::require_album(&conn, album_id)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT r.review_id, r.fan_id, acc.handle, r.score, r.comment, r.review_time \
             FROM {review} r JOIN {account} acc ON acc.id = r.fan_id \
             WHERE r.album_id = ?1 \
             ORDER BY r.review_time DESC, r.review_id DESC",
            review = REVIEW_TABLE_V_1.name,
            account = ACCOUNT_TABLE_V_0.name,
        ))?;
        let reviews = stmt
            .query_map(params![album_id], |row| {
                Ok(AlbumReview {
                    review_id: row.get(0)?,
                    fan_id: row.get(1)?,
                    fan_handle: row.get(2)?,
                    score: row.get(3)?,
                    comment: row.get(4)?,
                    review_time: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    fn liked_ids(&self, fan_id: usize, target: LikeTarget) -> FanContentResult<Vec<usize>> {
        let tables = like_tables(target);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE fan_id = ?1 ORDER BY id",
            tables.link_column, tables.link_table.name
        ))?;
        let ids = stmt
            .query_map(params![fan_id], |row| row.get(0))?
            .collect::<Result<Vec<usize>, _>>()?;
        Ok(ids)
    }

    fn band_fan_stats(&self, band_id: usize) -> FanContentResult<BandFanStats> {
        let conn = self.conn.lock().unwrap();
        if !Self::row_exists(&conn, BAND_TABLE_V_0.name, "band_id", band_id)? {
            return Err(FanContentError::NotFound {
                entity: "band",
                id: band_id,
            });
        }

        let follower_count = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE band_id = ?1",
                FAN_LIKE_BAND_TABLE_V_0.name
            ),
            params![band_id],
            |row| row.get(0),
        )?;
        let concert_attendee_count = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {attend} j \
                 JOIN {concert} c ON c.concert_id = j.concert_id \
                 WHERE c.band_id = ?1",
                attend = FAN_ATTEND_CONCERT_TABLE_V_0.name,
                concert = CONCERT_TABLE_V_0.name,
            ),
            params![band_id],
            |row| row.get(0),
        )?;
        let review_count = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {review} r \
                 JOIN {album} a ON a.album_id = r.album_id \
                 WHERE a.band_id = ?1",
                review = REVIEW_TABLE_V_1.name,
                album = ALBUM_TABLE_V_0.name,
            ),
            params![band_id],
            |row| row.get(0),
        )?;
        let mean_album_score = conn.query_row(
            &format!(
                "SELECT AVG(avg_score) FROM {} WHERE band_id = ?1 AND avg_score IS NOT NULL",
                ALBUM_TABLE_V_0.name
            ),
            params![band_id],
            |row| row.get(0),
        )?;

        Ok(BandFanStats {
            band_id,
            follower_count,
            concert_attendee_count,
            review_count,
            mean_album_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogStore, NewAlbum, NewBand, NewConcert, SqliteCatalogStore};
    use crate::db::open_in_memory;

    struct Fixture {
        conn: Arc<Mutex<Connection>>,
        store: SqliteFanContentStore,
        catalog: SqliteCatalogStore,
    }

    impl Fixture {
        fn new() -> Self {
            let conn = open_in_memory().unwrap();
            Fixture {
                conn: conn.clone(),
                store: SqliteFanContentStore::new(conn.clone()),
                catalog: SqliteCatalogStore::new(conn),
            }
        }

        fn add_fan(&self, handle: &str) -> usize {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO account (handle, role) VALUES (?1, 'fan')",
                params![handle],
            )
            .unwrap();
            conn.last_insert_rowid() as usize
        }

        fn add_band(&self, name: &str) -> usize {
            self.catalog
                .add_band(NewBand {
                    name: name.to_string(),
                    formed_year: None,
                    description: None,
                })
                .unwrap()
        }

        fn add_album(&self, band_id: usize, title: &str) -> usize {
            self.catalog
                .add_album(NewAlbum {
                    band_id,
                    title: title.to_string(),
                    released_year: None,
                })
                .unwrap()
        }

        fn album_score(&self, album_id: usize) -> Option<f64> {
            self.catalog
                .get_album(album_id)
                .unwrap()
                .unwrap()
                .avg_score
        }

        fn review_count(&self, album_id: usize) -> usize {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT COUNT(*) FROM review WHERE album_id = ?1",
                params![album_id],
                |row| row.get(0),
            )
            .unwrap()
        }
    }

    fn review(album_id: usize, score: i64) -> NewReview {
        NewReview {
            album_id,
            score,
            comment: None,
        }
    }

    #[test]
    fn first_review_sets_album_mean() {
        let f = Fixture::new();
        let fan = f.add_fan("anon");
        let band = f.add_band("MyGO!!!!!");
        let album = f.add_album(band, "Mion");

        assert_eq!(f.album_score(album), None);

        let stored = f.store.submit_review(fan, review(album, 4)).unwrap();
        assert_eq!(stored.score, 4);
        assert_eq!(f.album_score(album), Some(4.0));
    }

    #[test]
    fn mean_covers_all_fans_reviews() {
        let f = Fixture::new();
        let band = f.add_band("MyGO!!!!!");
        let album = f.add_album(band, "Mion");
        for (handle, score) in [("a", 2), ("b", 3), ("c", 5)] {
            let fan = f.add_fan(handle);
            f.store.submit_review(fan, review(album, score)).unwrap();
        }
        assert_eq!(f.album_score(album), Some(10.0 / 3.0));
        assert_eq!(f.review_count(album), 3);
    }

    #[test]
    fn resubmit_overwrites_instead_of_duplicating() {
        let f = Fixture::new();
        let fan = f.add_fan("anon");
        let band = f.add_band("MyGO!!!!!");
        let album = f.add_album(band, "Mion");

        f.store
            .submit_review(
                fan,
                NewReview {
                    album_id: album,
                    score: 2,
                    comment: Some("meh".to_string()),
                },
            )
            .unwrap();
        let second = f
            .store
            .submit_review(
                fan,
                NewReview {
                    album_id: album,
                    score: 5,
                    comment: Some("grew on me".to_string()),
                },
            )
            .unwrap();

        assert_eq!(second.score, 5);
        assert_eq!(second.comment.as_deref(), Some("grew on me"));
        assert_eq!(f.review_count(album), 1);
        assert_eq!(f.album_score(album), Some(5.0));
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let f = Fixture::new();
        let fan = f.add_fan("anon");
        let band = f.add_band("MyGO!!!!!");
        let album = f.add_album(band, "Mion");

        for score in [0, 6, -1] {
            let err = f.store.submit_review(fan, review(album, score)).unwrap_err();
            assert!(matches!(
                err,
                FanContentError::Validation { field: "score", .. }
            ));
        }
        assert_eq!(f.review_count(album), 0);
        assert_eq!(f.album_score(album), None);
    }

    #[test]
    fn review_of_unknown_album_is_not_found() {
        let f = Fixture::new();
        let fan = f.add_fan("anon");
        let err = f.store.submit_review(fan, review(99, 4)).unwrap_err();
        assert!(matches!(
            err,
            FanContentError::NotFound { entity: "album", id: 99 }
        ));
    }

    #[test]
    fn review_by_unknown_fan_leaves_no_state() {
        let f = Fixture::new();
        let band = f.add_band("MyGO!!!!!");
        let album = f.add_album(band, "Mion");

        let err = f.store.submit_review(42, review(album, 4)).unwrap_err();
        assert!(matches!(
            err,
            FanContentError::NotFound { entity: "fan", id: 42 }
        ));
        assert_eq!(f.review_count(album), 0);
        assert_eq!(f.album_score(album), None);
    }

    #[test]
    fn recompute_after_fan_deletion_clears_mean() {
        let f = Fixture::new();
        let fan = f.add_fan("anon");
        let band = f.add_band("MyGO!!!!!");
        let album = f.add_album(band, "Mion");
        f.store.submit_review(fan, review(album, 3)).unwrap();

        {
            let conn = f.conn.lock().unwrap();
            conn.execute("DELETE FROM account WHERE id = ?1", params![fan])
                .unwrap();
        }
        // The cascade removed the review, the stored mean is now stale.
        assert_eq!(f.review_count(album), 0);
        assert_eq!(f.album_score(album), Some(3.0));

        let avg = f.store.recompute_album_score(album).unwrap();
        assert_eq!(avg, None);
        assert_eq!(f.album_score(album), None);
    }

    #[test]
    fn leaderboard_orders_by_score_then_album_id() {
        let f = Fixture::new();
        let band = f.add_band("MyGO!!!!!");
        let low = f.add_album(band, "Low");
        let tie_first = f.add_album(band, "Tie first");
        let tie_second = f.add_album(band, "Tie second");
        let unreviewed = f.add_album(band, "Unreviewed");

        let fan = f.add_fan("anon");
        f.store.submit_review(fan, review(low, 2)).unwrap();
        f.store.submit_review(fan, review(tie_first, 5)).unwrap();
        f.store.submit_review(fan, review(tie_second, 5)).unwrap();

        let top = f.store.top_albums(10).unwrap();
        let ids: Vec<usize> = top.iter().map(|e| e.album_id).collect();
        assert_eq!(ids, vec![tie_first, tie_second, low]);
        assert!(!ids.contains(&unreviewed));
        assert_eq!(top[0].band_name, "MyGO!!!!!");
        assert_eq!(top[0].review_count, 1);

        let top_two = f.store.top_albums(2).unwrap();
        assert_eq!(top_two.len(), 2);
        assert_eq!(top_two[0].album_id, tie_first);
    }

    #[test]
    fn toggle_like_flips_back_and_forth() {
        let f = Fixture::new();
        let fan = f.add_fan("anon");
        let band = f.add_band("MyGO!!!!!");

        let first = f.store.toggle_like(fan, LikeTarget::Band, band).unwrap();
        assert_eq!(first, ToggleOutcome::Followed);
        assert_eq!(f.store.liked_ids(fan, LikeTarget::Band).unwrap(), vec![band]);

        let second = f.store.toggle_like(fan, LikeTarget::Band, band).unwrap();
        assert_eq!(second, ToggleOutcome::Unfollowed);
        assert!(f.store.liked_ids(fan, LikeTarget::Band).unwrap().is_empty());

        let third = f.store.toggle_like(fan, LikeTarget::Band, band).unwrap();
        assert_eq!(third, ToggleOutcome::Followed);
    }

    #[test]
    fn toggle_like_rejects_unknown_target() {
        let f = Fixture::new();
        let fan = f.add_fan("anon");
        let err = f
            .store
            .toggle_like(fan, LikeTarget::Album, 1234)
            .unwrap_err();
        assert!(matches!(
            err,
            FanContentError::NotFound { entity: "album", id: 1234 }
        ));
    }

    #[test]
    fn like_targets_do_not_interfere() {
        let f = Fixture::new();
        let fan = f.add_fan("anon");
        let band = f.add_band("MyGO!!!!!");
        let album = f.add_album(band, "Mion");

        f.store.toggle_like(fan, LikeTarget::Band, band).unwrap();
        f.store.toggle_like(fan, LikeTarget::Album, album).unwrap();
        f.store.toggle_like(fan, LikeTarget::Album, album).unwrap();

        assert_eq!(f.store.liked_ids(fan, LikeTarget::Band).unwrap(), vec![band]);
        assert!(f.store.liked_ids(fan, LikeTarget::Album).unwrap().is_empty());
    }

    #[test]
    fn album_reviews_come_newest_first_with_handles() {
        let f = Fixture::new();
        let band = f.add_band("MyGO!!!!!");
        let album = f.add_album(band, "Mion");
        let first_fan = f.add_fan("first");
        let second_fan = f.add_fan("second");

        f.store.submit_review(first_fan, review(album, 3)).unwrap();
        f.store.submit_review(second_fan, review(album, 5)).unwrap();

        let reviews = f.store.album_reviews(album).unwrap();
        assert_eq!(reviews.len(), 2);
        // Same second timestamps fall back to review_id ordering.
        assert_eq!(reviews[0].fan_handle, "second");
        assert_eq!(reviews[1].fan_handle, "first");

        let err = f.store.album_reviews(999).unwrap_err();
        assert!(matches!(err, FanContentError::NotFound { .. }));
    }

    #[test]
    fn band_fan_stats_aggregates_engagement() {
        let f = Fixture::new();
        let band = f.add_band("MyGO!!!!!");
        let other_band = f.add_band("Ave Mujica");
        let album_a = f.add_album(band, "A");
        let album_b = f.add_album(band, "B");
        f.add_album(other_band, "Other");
        let concert = f
            .catalog
            .add_concert(NewConcert {
                band_id: band,
                venue: "Livehouse".to_string(),
                held_on: 1700000000,
            })
            .unwrap();

        let fan_one = f.add_fan("one");
        let fan_two = f.add_fan("two");
        f.store.toggle_like(fan_one, LikeTarget::Band, band).unwrap();
        f.store.toggle_like(fan_two, LikeTarget::Band, band).unwrap();
        f.store
            .toggle_like(fan_one, LikeTarget::Concert, concert)
            .unwrap();
        f.store.submit_review(fan_one, review(album_a, 4)).unwrap();
        f.store.submit_review(fan_two, review(album_a, 2)).unwrap();
        f.store.submit_review(fan_one, review(album_b, 5)).unwrap();

        let stats = f.store.band_fan_stats(band).unwrap();
        assert_eq!(stats.follower_count, 2);
        assert_eq!(stats.concert_attendee_count, 1);
        assert_eq!(stats.review_count, 3);
        // Mean of per-album means: (3.0 + 5.0) / 2
        assert_eq!(stats.mean_album_score, Some(4.0));

        let other_stats = f.store.band_fan_stats(other_band).unwrap();
        assert_eq!(other_stats.follower_count, 0);
        assert_eq!(other_stats.mean_album_score, None);
    }
}
