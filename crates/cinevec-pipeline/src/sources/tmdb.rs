//! TMDB discover API client.
//!
//! API docs: https://developer.themoviedb.org/reference/discover-movie
//! Endpoint: https://api.themoviedb.org/3/discover/movie
//!
//! The query contract is fixed: sort by vote_average descending and floor
//! vote_count, so the highest-confidence records surface first and a page
//! cap still captures the best of the catalog.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use cinevec_common::{CinevecError, SandboxClient};

use crate::models::{DiscoverFilters, DiscoverPage, DiscoverResponse};
use super::{CatalogSource, SourceError};

const DISCOVER_URL: &str = "https://api.themoviedb.org/3/discover/movie";

pub struct TmdbClient {
    client: SandboxClient,
    api_token: String,
}

impl TmdbClient {
    pub fn new(api_token: String) -> Result<Self, CinevecError> {
        Ok(Self {
            client: SandboxClient::new()?,
            api_token,
        })
    }
}

#[async_trait]
impl CatalogSource for TmdbClient {
    #[instrument(skip(self, filters))]
    async fn fetch_page(
        &self,
        page: u32,
        filters: &DiscoverFilters,
    ) -> Result<DiscoverPage, SourceError> {
        let resp = self
            .client
            .get(DISCOVER_URL)?
            .bearer_auth(&self.api_token)
            .query(&[
                ("include_adult", "false"),
                ("include_video", "false"),
                ("language", filters.language.as_str()),
                ("page", &page.to_string()),
                ("sort_by", "vote_average.desc"),
                ("vote_count.gte", &filters.min_vote_count.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SourceError::Auth { status: status.as_u16() });
        }
        if !status.is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let message = body["status_message"]
                .as_str()
                .unwrap_or("unknown API error")
                .to_string();
            return Err(SourceError::Api { status: status.as_u16(), message });
        }

        let body: DiscoverResponse = resp.json().await?;
        debug!(page = body.page, total_pages = body.total_pages, n = body.results.len(),
               "Discover page retrieved");

        let mut records = Vec::with_capacity(body.results.len());
        let mut quarantined = 0u64;
        for raw in body.results {
            match raw.into_staging() {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Quarantined at source boundary: {e}");
                    quarantined += 1;
                }
            }
        }

        Ok(DiscoverPage {
            page: body.page,
            total_pages: body.total_pages,
            records,
            quarantined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_response_parses_fixture() {
        let json = serde_json::json!({
            "page": 1,
            "total_pages": 3,
            "total_results": 52,
            "results": [
                {
                    "id": 278,
                    "title": "The Shawshank Redemption",
                    "overview": "Imprisoned in the 1940s...",
                    "release_date": "1994-09-23",
                    "vote_average": 8.7,
                    "vote_count": 28000,
                    "poster_path": "/q6y0Go1tsGEsmtFryDOJo3dEmqu.jpg",
                    "genre_ids": [18, 80]
                },
                { "id": 9999, "vote_count": 500 }
            ]
        });
        let body: DiscoverResponse = serde_json::from_value(json).unwrap();
        assert_eq!(body.page, 1);
        assert_eq!(body.total_pages, 3);
        assert_eq!(body.results.len(), 2);
        // The second record has no title and gets quarantined on conversion.
        let converted: Vec<_> = body
            .results
            .into_iter()
            .map(|r| r.into_staging())
            .collect();
        assert!(converted[0].is_ok());
        assert!(converted[1].is_err());
    }

    #[test]
    fn test_client_construction() {
        let c = TmdbClient::new("token".to_string()).unwrap();
        assert!(c.client.is_allowed(DISCOVER_URL));
    }
}
