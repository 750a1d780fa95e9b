//! Fan-generated content: album reviews, score aggregation, the album
//! leaderboard and like/follow relations.

mod error;
mod models;
pub(crate) mod schema;
mod store;
mod trait_def;

pub use error::{FanContentError, FanContentResult};
pub use models::{
    AlbumReview, BandFanStats, LeaderboardEntry, LikeTarget, NewReview, Review, ToggleOutcome,
};
pub use store::SqliteFanContentStore;
pub use trait_def::FanContentStore;
