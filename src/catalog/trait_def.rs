//! Catalog storage trait

use anyhow::Result;

use super::models::{
    Album, Band, Concert, Member, NewAlbum, NewBand, NewConcert, NewMember, NewSong, Song,
};

/// Trait for catalog storage operations.
///
/// Writes validate their input and return the id of the created row.
/// Reads return `Ok(None)` for missing rows and `Err` on database errors.
pub trait CatalogStore: Send + Sync {
    fn add_band(&self, band: NewBand) -> Result<usize>;
    fn get_band(&self, band_id: usize) -> Result<Option<Band>>;
    fn get_all_bands(&self) -> Result<Vec<Band>>;
    fn delete_band(&self, band_id: usize) -> Result<()>;

    fn add_member(&self, member: NewMember) -> Result<usize>;
    fn get_band_members(&self, band_id: usize) -> Result<Vec<Member>>;
    fn delete_member(&self, member_id: usize) -> Result<()>;

    fn add_album(&self, album: NewAlbum) -> Result<usize>;
    fn get_album(&self, album_id: usize) -> Result<Option<Album>>;
    fn get_band_albums(&self, band_id: usize) -> Result<Vec<Album>>;
    fn delete_album(&self, album_id: usize) -> Result<()>;

    fn add_song(&self, song: NewSong) -> Result<usize>;
    fn get_album_songs(&self, album_id: usize) -> Result<Vec<Song>>;
    fn delete_song(&self, song_id: usize) -> Result<()>;

    fn add_concert(&self, concert: NewConcert) -> Result<usize>;
    fn get_band_concerts(&self, band_id: usize) -> Result<Vec<Concert>>;
    fn delete_concert(&self, concert_id: usize) -> Result<()>;
}
