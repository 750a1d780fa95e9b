//! Review and like relation tables.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, DEFAULT_TIMESTAMP,
};

const FAN_FK: Option<&ForeignKey> = Some(&ForeignKey {
    foreign_table: "account",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
});

/// First shape of the review table. No uniqueness on `(fan_id, album_id)`,
/// which allowed the same fan to pile up duplicate reviews of one album.
/// Kept for the v0 -> v1 migration.
pub const REVIEW_TABLE_V_0: Table = Table {
    name: "review",
    columns: &[
        sqlite_column!(
            "review_id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("fan_id", &SqlType::Integer, non_null = true, foreign_key = FAN_FK),
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "album",
                foreign_column: "album_id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("score", &SqlType::Integer, non_null = true),
        sqlite_column!("comment", &SqlType::Text),
        sqlite_column!("review_time", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[],
    indices: &[
        ("idx_review_album_id", "album_id"),
        ("idx_review_fan_id", "fan_id"),
    ],
};

/// Current review table, one review per `(fan_id, album_id)`. The unique
/// constraint is what makes the submit upsert well defined.
pub const REVIEW_TABLE_V_1: Table = Table {
    name: "review",
    columns: REVIEW_TABLE_V_0.columns,
    unique_constraints: &[&["fan_id", "album_id"]],
    indices: REVIEW_TABLE_V_0.indices,
};

macro_rules! like_table {
    ($table_name:literal, $id_column:literal, $foreign_table:literal, $foreign_column:literal, $index_name:literal) => {
        Table {
            name: $table_name,
            columns: &[
                sqlite_column!(
                    "id",
                    &SqlType::Integer,
                    is_primary_key = true,
                    is_unique = true
                ),
                sqlite_column!("fan_id", &SqlType::Integer, non_null = true, foreign_key = FAN_FK),
                sqlite_column!(
                    $id_column,
                    &SqlType::Integer,
                    non_null = true,
                    foreign_key = Some(&ForeignKey {
                        foreign_table: $foreign_table,
                        foreign_column: $foreign_column,
                        on_delete: ForeignKeyOnChange::Cascade,
                    })
                ),
                sqlite_column!(
                    "created",
                    &SqlType::Integer,
                    default_value = Some(DEFAULT_TIMESTAMP)
                ),
            ],
            unique_constraints: &[&["fan_id", $id_column]],
            indices: &[($index_name, "fan_id")],
        }
    };
}

pub const FAN_LIKE_BAND_TABLE_V_0: Table = like_table!(
    "fan_like_band",
    "band_id",
    "band",
    "band_id",
    "idx_fan_like_band_fan_id"
);

pub const FAN_LIKE_ALBUM_TABLE_V_0: Table = like_table!(
    "fan_like_album",
    "album_id",
    "album",
    "album_id",
    "idx_fan_like_album_fan_id"
);

pub const FAN_LIKE_SONG_TABLE_V_0: Table = like_table!(
    "fan_like_song",
    "song_id",
    "song",
    "song_id",
    "idx_fan_like_song_fan_id"
);

pub const FAN_ATTEND_CONCERT_TABLE_V_0: Table = like_table!(
    "fan_attend_concert",
    "concert_id",
    "concert",
    "concert_id",
    "idx_fan_attend_concert_fan_id"
);
