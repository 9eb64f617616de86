//! Staging load: drive the catalog source across its pages and merge the
//! results into the staging relation.
//!
//! Fail-fast by design: there is no persisted pagination cursor, so a page
//! that cannot be fetched aborts the run rather than leaving a silent gap
//! in the high pages. Re-running converges through merge semantics.

use anyhow::Context;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use cinevec_db::StagingStore;

use crate::models::DiscoverFilters;
use crate::sources::CatalogSource;

/// Outcome of one staging load run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub run_id: Uuid,
    pub pages_fetched: u32,
    pub records_written: u64,
    /// Records the defensive vote-count re-check dropped.
    pub records_filtered: u64,
    /// Records rejected at the source boundary.
    pub records_quarantined: u64,
    pub duration_ms: u64,
}

/// Walk every page the source reports (or up to `max_pages`) and upsert the
/// qualifying records, one transaction per page.
#[instrument(skip(source, store, filters))]
pub async fn load_all(
    source: &dyn CatalogSource,
    store: &dyn StagingStore,
    filters: &DiscoverFilters,
    max_pages: Option<u32>,
) -> anyhow::Result<LoadSummary> {
    let run_id = Uuid::new_v4();
    let t0 = std::time::Instant::now();
    info!(run_id = %run_id, min_vote_count = filters.min_vote_count, ?max_pages,
          "Starting staging load");

    let mut summary = LoadSummary {
        run_id,
        pages_fetched: 0,
        records_written: 0,
        records_filtered: 0,
        records_quarantined: 0,
        duration_ms: 0,
    };

    let mut page = 1u32;
    loop {
        let fetched = source
            .fetch_page(page, filters)
            .await
            .with_context(|| format!("staging load aborted: page {page} fetch failed"))?;

        summary.pages_fetched += 1;
        summary.records_quarantined += fetched.quarantined;

        // The filter is part of the request contract, but the threshold is a
        // data invariant of the staging relation — re-check it here.
        let mut qualifying = Vec::with_capacity(fetched.records.len());
        for record in fetched.records {
            if record.vote_count < filters.min_vote_count as i32 {
                warn!(id = record.id, vote_count = record.vote_count,
                      "Source returned a sub-threshold record; dropping");
                summary.records_filtered += 1;
            } else {
                qualifying.push(record);
            }
        }

        let written = store
            .upsert_page(&qualifying)
            .await
            .with_context(|| format!("staging write failed for page {page}"))?;
        summary.records_written += written as u64;

        if page >= fetched.total_pages {
            break;
        }
        if let Some(cap) = max_pages {
            if page >= cap {
                info!(cap, "Page cap reached; stopping pagination");
                break;
            }
        }
        page += 1;
    }

    summary.duration_ms = t0.elapsed().as_millis() as u64;
    info!(
        run_id = %run_id,
        pages = summary.pages_fetched,
        written = summary.records_written,
        filtered = summary.records_filtered,
        quarantined = summary.records_quarantined,
        duration_ms = summary.duration_ms,
        "Staging load complete"
    );

    Ok(summary)
}
