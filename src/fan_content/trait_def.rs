use super::error::FanContentResult;
use super::models::{
    AlbumReview, BandFanStats, LeaderboardEntry, LikeTarget, NewReview, Review, ToggleOutcome,
};

/// Storage for reviews, the derived album scores and like relations.
///
/// Writes that touch more than one row run in a single transaction; on error
/// nothing is persisted.
pub trait FanContentStore: Send + Sync {
    /// Upsert the fan's review of an album and recompute the album's mean
    /// score, atomically. The latest rating wins.
    fn submit_review(&self, fan_id: usize, review: NewReview) -> FanContentResult<Review>;

    /// Recompute `album.avg_score` from the current reviews. Returns the new
    /// mean, `None` when the album has no reviews.
    fn recompute_album_score(&self, album_id: usize) -> FanContentResult<Option<f64>>;

    /// The top `n` albums by mean score, descending, ties broken by ascending
    /// album id. Unreviewed albums never appear.
    fn top_albums(&self, n: usize) -> FanContentResult<Vec<LeaderboardEntry>>;

    /// Flip the fan's like/follow relation with the target entity.
    fn toggle_like(
        &self,
        fan_id: usize,
        target: LikeTarget,
        entity_id: usize,
    ) -> FanContentResult<ToggleOutcome>;

    /// All reviews of an album, newest first, with the reviewer's handle.
    fn album_reviews(&self, album_id: usize) -> FanContentResult<Vec<AlbumReview>>;

    /// Ids of the entities of the given kind the fan currently likes.
    fn liked_ids(&self, fan_id: usize, target: LikeTarget) -> FanContentResult<Vec<usize>>;

    /// Fan engagement aggregates for one band.
    fn band_fan_stats(&self, band_id: usize) -> FanContentResult<BandFanStats>;
}
