//! Pure derivations from a staged row to the production shape.
//!
//! Nothing here performs I/O; every function is deterministic so the
//! embedding input text can double as a dedup key (by SHA-256) across runs.

use sha2::{Digest, Sha256};

use cinevec_db::StagingMovieRow;

use crate::sources::SourceError;

pub const POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p";
pub const POSTER_SIZE: &str = "w500";

const NO_OVERVIEW: &str = "No overview available.";

/// A staged row with its production-shape fields derived, ready for the
/// embedding call.
#[derive(Debug, Clone)]
pub struct NormalizedMovie {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_year: Option<i32>,
    pub rating: f32,
    pub poster_url: Option<String>,
    pub embedding_input: String,
}

/// Year is the first four characters of the date string, parsed as an
/// integer. Absent, short, or unparseable dates yield None — "unknown",
/// never year zero.
pub fn release_year(release_date: Option<&str>) -> Option<i32> {
    let date = release_date?.trim();
    let year = date.get(..4)?;
    year.parse::<i32>().ok().filter(|y| *y > 0)
}

/// Round to one fractional digit. Uses `f64::round`, which rounds half away
/// from zero on the scaled binary value; ties that are not exactly
/// representable in binary (e.g. 8.45) resolve by their nearest f64.
pub fn round_rating(vote_average: f64) -> f64 {
    (vote_average * 10.0).round() / 10.0
}

/// Display URL for the poster, or None when the source had no poster path.
pub fn poster_url(poster_path: Option<&str>) -> Option<String> {
    let path = poster_path?.trim();
    if path.is_empty() {
        return None;
    }
    Some(format!("{}/{}{}", POSTER_BASE_URL, POSTER_SIZE, path))
}

/// Text blob handed to the embedding model. Deterministic for identical
/// inputs; identical rows always produce identical text.
pub fn embedding_input(title: &str, overview: Option<&str>) -> String {
    let overview = match overview {
        Some(o) if !o.trim().is_empty() => o,
        _ => NO_OVERVIEW,
    };
    format!("Movie Title: {}. Overview: {}", title, overview)
}

/// Hex SHA-256 of the embedding input text.
pub fn text_sha(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Derive every production-shape field from one staged row.
/// A blank title makes the row malformed: it is skipped with a warning
/// upstream, never defaulted to an empty string.
pub fn normalize(row: &StagingMovieRow) -> Result<NormalizedMovie, SourceError> {
    if row.title.trim().is_empty() {
        return Err(SourceError::MalformedRecord {
            id: row.id,
            field: "title",
        });
    }
    Ok(NormalizedMovie {
        id: row.id,
        title: row.title.clone(),
        overview: row.overview.clone(),
        release_year: release_year(row.release_date.as_deref()),
        rating: round_rating(row.vote_average) as f32,
        poster_url: poster_url(row.poster_path.as_deref()),
        embedding_input: embedding_input(&row.title, row.overview.as_deref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(title: &str) -> StagingMovieRow {
        StagingMovieRow {
            id: 278,
            title: title.to_string(),
            overview: Some("Imprisoned in the 1940s...".to_string()),
            release_date: Some("1994-09-23".to_string()),
            vote_average: 8.7,
            vote_count: 28000,
            poster_path: Some("/q6y0Go1tsGEsmtFryDOJo3dEmqu.jpg".to_string()),
        }
    }

    #[test]
    fn test_release_year_from_date() {
        assert_eq!(release_year(Some("1994-09-23")), Some(1994));
        assert_eq!(release_year(Some("2024-01-01")), Some(2024));
    }

    #[test]
    fn test_release_year_missing_is_none_not_zero() {
        assert_eq!(release_year(None), None);
        assert_eq!(release_year(Some("")), None);
        assert_eq!(release_year(Some("19")), None);
        assert_eq!(release_year(Some("abcd-01-01")), None);
        assert_eq!(release_year(Some("0000-01-01")), None);
    }

    #[test]
    fn test_rating_rounds_both_directions() {
        assert_eq!(round_rating(1.44), 1.4);
        assert_eq!(round_rating(1.46), 1.5);
        // Exactly-representable .x5 ties round half away from zero.
        assert_eq!(round_rating(1.25), 1.3);
        assert_eq!(round_rating(8.75), 8.8);
        assert_eq!(round_rating(8.0), 8.0);
    }

    #[test]
    fn test_poster_url_concatenation() {
        assert_eq!(
            poster_url(Some("/abc.jpg")).as_deref(),
            Some("https://image.tmdb.org/t/p/w500/abc.jpg")
        );
        assert_eq!(poster_url(None), None);
        assert_eq!(poster_url(Some("")), None);
    }

    #[test]
    fn test_embedding_input_is_deterministic() {
        let a = embedding_input("Heat", Some("A heist thriller."));
        let b = embedding_input("Heat", Some("A heist thriller."));
        assert_eq!(a, "Movie Title: Heat. Overview: A heist thriller.");
        assert_eq!(a, b);
        assert_eq!(text_sha(&a), text_sha(&b));
    }

    #[test]
    fn test_embedding_input_fills_missing_overview() {
        assert_eq!(
            embedding_input("Heat", None),
            "Movie Title: Heat. Overview: No overview available."
        );
        assert_eq!(
            embedding_input("Heat", Some("   ")),
            "Movie Title: Heat. Overview: No overview available."
        );
    }

    #[test]
    fn test_normalize_full_row() {
        let n = normalize(&staged("The Shawshank Redemption")).unwrap();
        assert_eq!(n.release_year, Some(1994));
        assert_eq!(n.rating, 8.7);
        assert_eq!(
            n.poster_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w500/q6y0Go1tsGEsmtFryDOJo3dEmqu.jpg")
        );
        assert!(n.embedding_input.starts_with("Movie Title: The Shawshank Redemption."));
    }

    #[test]
    fn test_normalize_blank_title_is_malformed() {
        let err = normalize(&staged("  ")).unwrap_err();
        assert!(matches!(err, SourceError::MalformedRecord { id: 278, field: "title" }));
    }
}
