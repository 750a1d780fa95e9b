use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{
    Album, Band, Concert, Member, NewAlbum, NewBand, NewConcert, NewMember, NewSong, Song,
};
use super::schema::{
    ALBUM_TABLE_V_0, BAND_TABLE_V_0, CONCERT_TABLE_V_0, MEMBER_TABLE_V_0, SONG_TABLE_V_0,
};
use super::trait_def::CatalogStore;
use super::validation::{
    validate_album, validate_band, validate_concert, validate_member, validate_song,
};

/// Catalog store over the shared community database connection.
///
/// The connection is shared with the other stores so that cross-store writes
/// (most importantly the review/aggregate transaction) stay in one database.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        SqliteCatalogStore { conn }
    }
}

fn row_to_band(row: &rusqlite::Row) -> rusqlite::Result<Band> {
    Ok(Band {
        band_id: row.get(0)?,
        name: row.get(1)?,
        formed_year: row.get(2)?,
        description: row.get(3)?,
    })
}

fn row_to_album(row: &rusqlite::Row) -> rusqlite::Result<Album> {
    Ok(Album {
        album_id: row.get(0)?,
        band_id: row.get(1)?,
        title: row.get(2)?,
        released_year: row.get(3)?,
        avg_score: row.get(4)?,
    })
}

impl CatalogStore for SqliteCatalogStore {
    fn add_band(&self, band: NewBand) -> Result<usize> {
        validate_band(&band)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (name, formed_year, description) VALUES (?1, ?2, ?3)",
                BAND_TABLE_V_0.name
            ),
            params![band.name, band.formed_year, band.description],
        )
        .with_context(|| format!("Failed to create band {}", band.name))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_band(&self, band_id: usize) -> Result<Option<Band>> {
        let conn = self.conn.lock().unwrap();
        let band = conn
            .query_row(
                &format!(
                    "SELECT band_id, name, formed_year, description FROM {} WHERE band_id = ?1",
                    BAND_TABLE_V_0.name
                ),
                params![band_id],
                row_to_band,
            )
            .optional()?;
        Ok(band)
    }

    fn get_all_bands(&self) -> Result<Vec<Band>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT band_id, name, formed_year, description FROM {} ORDER BY band_id",
            BAND_TABLE_V_0.name
        ))?;
        let bands = stmt
            .query_map([], row_to_band)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bands)
    }

    fn delete_band(&self, band_id: usize) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE band_id = ?1", BAND_TABLE_V_0.name),
            params![band_id],
        )?;
        Ok(())
    }

    fn add_member(&self, member: NewMember) -> Result<usize> {
        validate_member(&member)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (band_id, name, role_name) VALUES (?1, ?2, ?3)",
                MEMBER_TABLE_V_0.name
            ),
            params![member.band_id, member.name, member.role_name],
        )
        .with_context(|| format!("Failed to add member {}", member.name))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_band_members(&self, band_id: usize) -> Result<Vec<Member>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT member_id, band_id, name, role_name FROM {} WHERE band_id = ?1 ORDER BY member_id",
            MEMBER_TABLE_V_0.name
        ))?;
        let members = stmt
            .query_map(params![band_id], |row| {
                Ok(Member {
                    member_id: row.get(0)?,
                    band_id: row.get(1)?,
                    name: row.get(2)?,
                    role_name: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    fn delete_member(&self, member_id: usize) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE member_id = ?1", MEMBER_TABLE_V_0.name),
            params![member_id],
        )?;
        Ok(())
    }

    fn add_album(&self, album: NewAlbum) -> Result<usize> {
        validate_album(&album)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (band_id, title, released_year) VALUES (?1, ?2, ?3)",
                ALBUM_TABLE_V_0.name
            ),
            params![album.band_id, album.title, album.released_year],
        )
        .with_context(|| format!("Failed to add album {}", album.title))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_album(&self, album_id: usize) -> Result<Option<Album>> {
        let conn = self.conn.lock().unwrap();
        let album = conn
            .query_row(
                &format!(
                    "SELECT album_id, band_id, title, released_year, avg_score FROM {} WHERE album_id = ?1",
                    ALBUM_TABLE_V_0.name
                ),
                params![album_id],
                row_to_album,
            )
            .optional()?;
        Ok(album)
    }

    fn get_band_albums(&self, band_id: usize) -> Result<Vec<Album>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT album_id, band_id, title, released_year, avg_score FROM {} WHERE band_id = ?1 ORDER BY album_id",
            ALBUM_TABLE_V_0.name
        ))?;
        let albums = stmt
            .query_map(params![band_id], row_to_album)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    fn delete_album(&self, album_id: usize) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE album_id = ?1", ALBUM_TABLE_V_0.name),
            params![album_id],
        )?;
        Ok(())
    }

    fn add_song(&self, song: NewSong) -> Result<usize> {
        validate_song(&song)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (album_id, title, track_number, duration_secs) VALUES (?1, ?2, ?3, ?4)",
                SONG_TABLE_V_0.name
            ),
            params![song.album_id, song.title, song.track_number, song.duration_secs],
        )
        .with_context(|| format!("Failed to add song {}", song.title))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_album_songs(&self, album_id: usize) -> Result<Vec<Song>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT song_id, album_id, title, track_number, duration_secs FROM {} WHERE album_id = ?1 ORDER BY track_number",
            SONG_TABLE_V_0.name
        ))?;
        let songs = stmt
            .query_map(params![album_id], |row| {
                Ok(Song {
                    song_id: row.get(0)?,
                    album_id: row.get(1)?,
                    title: row.get(2)?,
                    track_number: row.get(3)?,
                    duration_secs: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    fn delete_song(&self, song_id: usize) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE song_id = ?1", SONG_TABLE_V_0.name),
            params![song_id],
        )?;
        Ok(())
    }

    fn add_concert(&self, concert: NewConcert) -> Result<usize> {
        validate_concert(&concert)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (band_id, venue, held_on) VALUES (?1, ?2, ?3)",
                CONCERT_TABLE_V_0.name
            ),
            params![concert.band_id, concert.venue, concert.held_on],
        )
        .with_context(|| format!("Failed to add concert at {}", concert.venue))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_band_concerts(&self, band_id: usize) -> Result<Vec<Concert>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT concert_id, band_id, venue, held_on FROM {} WHERE band_id = ?1 ORDER BY held_on",
            CONCERT_TABLE_V_0.name
        ))?;
        let concerts = stmt
            .query_map(params![band_id], |row| {
                Ok(Concert {
                    concert_id: row.get(0)?,
                    band_id: row.get(1)?,
                    venue: row.get(2)?,
                    held_on: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(concerts)
    }

    fn delete_concert(&self, concert_id: usize) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE concert_id = ?1",
                CONCERT_TABLE_V_0.name
            ),
            params![concert_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn create_test_store() -> SqliteCatalogStore {
        SqliteCatalogStore::new(open_in_memory().unwrap())
    }

    fn add_test_band(store: &SqliteCatalogStore, name: &str) -> usize {
        store
            .add_band(NewBand {
                name: name.to_string(),
                formed_year: Some(2022),
                description: None,
            })
            .unwrap()
    }

    #[test]
    fn creates_and_reads_band() {
        let store = create_test_store();
        let band_id = add_test_band(&store, "MyGO!!!!!");

        let band = store.get_band(band_id).unwrap().unwrap();
        assert_eq!(band.name, "MyGO!!!!!");
        assert_eq!(band.formed_year, Some(2022));

        assert!(store.get_band(band_id + 1).unwrap().is_none());
    }

    #[test]
    fn rejects_duplicate_band_name() {
        let store = create_test_store();
        add_test_band(&store, "Ave Mujica");
        assert!(store
            .add_band(NewBand {
                name: "Ave Mujica".to_string(),
                formed_year: None,
                description: None,
            })
            .is_err());
    }

    #[test]
    fn new_album_has_no_score() {
        let store = create_test_store();
        let band_id = add_test_band(&store, "MyGO!!!!!");
        let album_id = store
            .add_album(NewAlbum {
                band_id,
                title: "Mion".to_string(),
                released_year: Some(2024),
            })
            .unwrap();

        let album = store.get_album(album_id).unwrap().unwrap();
        assert_eq!(album.title, "Mion");
        assert!(album.avg_score.is_none());
    }

    #[test]
    fn cannot_add_album_without_band() {
        let store = create_test_store();
        let result = store.add_album(NewAlbum {
            band_id: 42,
            title: "Orphan".to_string(),
            released_year: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn songs_are_ordered_by_track_number() {
        let store = create_test_store();
        let band_id = add_test_band(&store, "MyGO!!!!!");
        let album_id = store
            .add_album(NewAlbum {
                band_id,
                title: "Mion".to_string(),
                released_year: None,
            })
            .unwrap();

        for (title, track_number) in [("Third", 3), ("First", 1), ("Second", 2)] {
            store
                .add_song(NewSong {
                    album_id,
                    title: title.to_string(),
                    track_number,
                    duration_secs: Some(200),
                })
                .unwrap();
        }

        let titles: Vec<String> = store
            .get_album_songs(album_id)
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn deleting_band_cascades_to_members_and_albums() {
        let store = create_test_store();
        let band_id = add_test_band(&store, "CRYCHIC");
        store
            .add_member(NewMember {
                band_id,
                name: "Tomori".to_string(),
                role_name: Some("vocals".to_string()),
            })
            .unwrap();
        let album_id = store
            .add_album(NewAlbum {
                band_id,
                title: "Haruhikage".to_string(),
                released_year: None,
            })
            .unwrap();

        store.delete_band(band_id).unwrap();

        assert!(store.get_band(band_id).unwrap().is_none());
        assert!(store.get_band_members(band_id).unwrap().is_empty());
        assert!(store.get_album(album_id).unwrap().is_none());
    }

    #[test]
    fn concerts_are_ordered_by_date() {
        let store = create_test_store();
        let band_id = add_test_band(&store, "MyGO!!!!!");
        store
            .add_concert(NewConcert {
                band_id,
                venue: "Budokan".to_string(),
                held_on: 1700000000,
            })
            .unwrap();
        store
            .add_concert(NewConcert {
                band_id,
                venue: "Livehouse".to_string(),
                held_on: 1600000000,
            })
            .unwrap();

        let venues: Vec<String> = store
            .get_band_concerts(band_id)
            .unwrap()
            .into_iter()
            .map(|c| c.venue)
            .collect();
        assert_eq!(venues, vec!["Livehouse", "Budokan"]);
    }
}
