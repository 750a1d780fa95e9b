//! Catalog data models

use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug, Clone)]
pub struct Band {
    pub band_id: usize,
    pub name: String,
    pub formed_year: Option<i32>,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewBand {
    pub name: String,
    pub formed_year: Option<i32>,
    pub description: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Member {
    pub member_id: usize,
    pub band_id: usize,
    pub name: String,
    /// Instrument or position within the band, e.g. "vocals" or "drums".
    pub role_name: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewMember {
    pub band_id: usize,
    pub name: String,
    pub role_name: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Album {
    pub album_id: usize,
    pub band_id: usize,
    pub title: String,
    pub released_year: Option<i32>,
    /// Mean of all current review scores, None while unreviewed.
    pub avg_score: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewAlbum {
    pub band_id: usize,
    pub title: String,
    pub released_year: Option<i32>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Song {
    pub song_id: usize,
    pub album_id: usize,
    pub title: String,
    pub track_number: i32,
    pub duration_secs: Option<i64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewSong {
    pub album_id: usize,
    pub title: String,
    pub track_number: i32,
    pub duration_secs: Option<i64>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Concert {
    pub concert_id: usize,
    pub band_id: usize,
    pub venue: String,
    /// Unix timestamp of the concert date.
    pub held_on: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewConcert {
    pub band_id: usize,
    pub venue: String,
    pub held_on: i64,
}
