//! Validation for catalog entities.
//!
//! Ensures writes are well formed before they reach the store.

use super::models::{NewAlbum, NewBand, NewConcert, NewMember, NewSong};
use std::fmt;

#[derive(Debug)]
pub enum ValidationError {
    EmptyField {
        field: &'static str,
    },
    NonPositiveValue {
        field: &'static str,
        value: i64,
    },
    ImplausibleYear {
        field: &'static str,
        value: i32,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField { field } => {
                write!(f, "Field '{}' is required but was empty", field)
            }
            ValidationError::NonPositiveValue { field, value } => {
                write!(f, "Field '{}' must be positive, got {}", field, value)
            }
            ValidationError::ImplausibleYear { field, value } => {
                write!(f, "Field '{}' is not a plausible year: {}", field, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = Result<T, ValidationError>;

fn validate_year(field: &'static str, year: Option<i32>) -> ValidationResult<()> {
    if let Some(year) = year {
        if !(1900..=2100).contains(&year) {
            return Err(ValidationError::ImplausibleYear { field, value: year });
        }
    }
    Ok(())
}

pub fn validate_band(band: &NewBand) -> ValidationResult<()> {
    if band.name.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "name" });
    }
    validate_year("formed_year", band.formed_year)
}

pub fn validate_member(member: &NewMember) -> ValidationResult<()> {
    if member.name.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "name" });
    }
    Ok(())
}

pub fn validate_album(album: &NewAlbum) -> ValidationResult<()> {
    if album.title.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "title" });
    }
    validate_year("released_year", album.released_year)
}

pub fn validate_song(song: &NewSong) -> ValidationResult<()> {
    if song.title.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "title" });
    }
    if song.track_number < 1 {
        return Err(ValidationError::NonPositiveValue {
            field: "track_number",
            value: song.track_number as i64,
        });
    }
    if let Some(duration) = song.duration_secs {
        if duration < 1 {
            return Err(ValidationError::NonPositiveValue {
                field: "duration_secs",
                value: duration,
            });
        }
    }
    Ok(())
}

pub fn validate_concert(concert: &NewConcert) -> ValidationResult<()> {
    if concert.venue.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "venue" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_valid_song() -> NewSong {
        NewSong {
            album_id: 1,
            title: "Opening".to_string(),
            track_number: 1,
            duration_secs: Some(215),
        }
    }

    #[test]
    fn accepts_valid_song() {
        validate_song(&make_valid_song()).unwrap();
    }

    #[test]
    fn rejects_empty_song_title() {
        let mut song = make_valid_song();
        song.title = "   ".to_string();
        assert!(matches!(
            validate_song(&song),
            Err(ValidationError::EmptyField { field: "title" })
        ));
    }

    #[test]
    fn rejects_non_positive_track_number() {
        let mut song = make_valid_song();
        song.track_number = 0;
        assert!(validate_song(&song).is_err());
    }

    #[test]
    fn rejects_implausible_band_year() {
        let band = NewBand {
            name: "CRYCHIC".to_string(),
            formed_year: Some(12),
            description: None,
        };
        assert!(matches!(
            validate_band(&band),
            Err(ValidationError::ImplausibleYear { .. })
        ));
    }

    #[test]
    fn rejects_empty_band_name() {
        let band = NewBand {
            name: "".to_string(),
            formed_year: None,
            description: None,
        };
        assert!(validate_band(&band).is_err());
    }

    #[test]
    fn rejects_empty_concert_venue() {
        let concert = NewConcert {
            band_id: 1,
            venue: " ".to_string(),
            held_on: 1700000000,
        };
        assert!(validate_concert(&concert).is_err());
    }
}
