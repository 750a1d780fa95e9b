use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Review {
    pub review_id: usize,
    pub fan_id: usize,
    pub album_id: usize,
    pub score: i64,
    pub comment: Option<String>,
    /// Unix timestamp of the last time this review was written.
    pub review_time: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewReview {
    pub album_id: usize,
    pub score: i64,
    pub comment: Option<String>,
}

/// A review joined with the reviewing fan's handle, for album pages.
#[derive(Serialize, Debug, Clone)]
pub struct AlbumReview {
    pub review_id: usize,
    pub fan_id: usize,
    pub fan_handle: String,
    pub score: i64,
    pub comment: Option<String>,
    pub review_time: i64,
}

/// What a fan can like or follow. Closed set, each variant has its own
/// relation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeTarget {
    Band,
    Album,
    Song,
    Concert,
}

impl LikeTarget {
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "band" => Some(LikeTarget::Band),
            "album" => Some(LikeTarget::Album),
            "song" => Some(LikeTarget::Song),
            "concert" => Some(LikeTarget::Concert),
            _ => None,
        }
    }

    pub fn entity_name(&self) -> &'static str {
        match self {
            LikeTarget::Band => "band",
            LikeTarget::Album => "album",
            LikeTarget::Song => "song",
            LikeTarget::Concert => "concert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleOutcome {
    Followed,
    Unfollowed,
}

impl ToggleOutcome {
    pub fn is_followed(&self) -> bool {
        matches!(self, ToggleOutcome::Followed)
    }
}

/// One row of the top-N album chart.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub album_id: usize,
    pub band_id: usize,
    pub title: String,
    pub band_name: String,
    pub avg_score: f64,
    pub review_count: usize,
}

/// Aggregate fan engagement numbers for one band.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BandFanStats {
    pub band_id: usize,
    pub follower_count: usize,
    pub concert_attendee_count: usize,
    pub review_count: usize,
    /// Mean of the per-album mean scores across the band's reviewed albums.
    pub mean_album_score: Option<f64>,
}
