//! Data models for the extraction stage.

use serde::{Deserialize, Serialize};

use cinevec_db::NewStagingMovie;

use crate::sources::SourceError;

/// One record as the discover endpoint returns it. Only `id` is trusted to
/// exist; everything else is optional until validated at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSourceMovie {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: i32,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
}

impl RawSourceMovie {
    /// Validate required fields and convert into the staging shape.
    /// A record without a usable title is malformed — rejected here rather
    /// than staged with an empty string that would pollute embeddings later.
    pub fn into_staging(self) -> Result<NewStagingMovie, SourceError> {
        let title = match self.title {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                return Err(SourceError::MalformedRecord {
                    id: self.id,
                    field: "title",
                })
            }
        };
        Ok(NewStagingMovie {
            id: self.id,
            title,
            overview: none_if_blank(self.overview),
            release_date: none_if_blank(self.release_date),
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            poster_path: none_if_blank(self.poster_path),
            genre_ids: self.genre_ids,
        })
    }
}

fn none_if_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Typed body of one discover response.
#[derive(Debug, Deserialize)]
pub struct DiscoverResponse {
    pub page: u32,
    pub total_pages: u32,
    #[serde(default)]
    pub results: Vec<RawSourceMovie>,
}

/// One fetched page after boundary validation.
#[derive(Debug)]
pub struct DiscoverPage {
    pub page: u32,
    pub total_pages: u32,
    pub records: Vec<NewStagingMovie>,
    /// Records rejected at the boundary (missing required fields).
    pub quarantined: u64,
}

/// Query contract for the discover endpoint: best-rated first, with a
/// vote-count floor so high pages stay worth fetching.
#[derive(Debug, Clone)]
pub struct DiscoverFilters {
    pub min_vote_count: u32,
    pub language: String,
}

impl Default for DiscoverFilters {
    fn default() -> Self {
        Self {
            min_vote_count: 200,
            language: "en-US".to_string(),
        }
    }
}
