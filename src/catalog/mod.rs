//! Band catalog: bands, members, albums, songs and concerts.

mod models;
mod schema;
mod store;
mod trait_def;
mod validation;

pub use models::*;
pub use schema::{
    ALBUM_TABLE_V_0, BAND_TABLE_V_0, CONCERT_TABLE_V_0, MEMBER_TABLE_V_0, SONG_TABLE_V_0,
};
pub use store::SqliteCatalogStore;
pub use trait_def::CatalogStore;
pub use validation::{
    validate_album, validate_band, validate_concert, validate_member, validate_song,
    ValidationError,
};
