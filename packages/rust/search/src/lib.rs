//! Paginated search-hit collection.
//!
//! Requests result pages in increasing order, unwraps indirect links, keeps
//! entries with a title and an absolute link, and stops once enough hits are
//! gathered or a page produces nothing usable.

mod html;
mod link;

use std::time::Duration;

use async_trait::async_trait;
use courtscout_shared::{RawSearchEntry, Result, SearchHit};
use tracing::{debug, info, instrument, warn};

pub use html::{HtmlSearchSource, parse_results_page};
pub use link::{is_absolute, resolve_link};

/// Upper bound on pages requested for one query.
const MAX_PAGES: u32 = 50;

// ---------------------------------------------------------------------------
// SearchSource
// ---------------------------------------------------------------------------

/// A source of search-result pages.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Entries of page `page_index` (0-based), in page order.
    async fn fetch_page(&self, query: &str, page_index: u32) -> Result<Vec<RawSearchEntry>>;
}

// ---------------------------------------------------------------------------
// PaginatedSearchCollector
// ---------------------------------------------------------------------------

/// Collects up to a desired number of qualifying hits across pages.
pub struct PaginatedSearchCollector<S> {
    source: S,
    page_delay: Duration,
}

impl<S: SearchSource> PaginatedSearchCollector<S> {
    pub fn new(source: S, page_delay: Duration) -> Self {
        Self { source, page_delay }
    }

    /// Collect at most `desired` hits for `query`.
    ///
    /// A page with zero qualifying entries ends collection, as does a page that
    /// fails to load; whatever was gathered before is returned. Ordinals are
    /// assigned densely from 1 over the final list.
    #[instrument(skip_all, fields(query = %query, desired = desired))]
    pub async fn collect(&self, query: &str, desired: usize) -> Vec<SearchHit> {
        let mut accepted: Vec<(String, String)> = Vec::new();
        let mut page_index = 0;

        while accepted.len() < desired && page_index < MAX_PAGES {
            if page_index > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let entries = match self.source.fetch_page(query, page_index).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(page_index, error = %e, "search page failed, ending collection");
                    break;
                }
            };

            let before = accepted.len();
            for entry in entries {
                let title = entry.title.trim();
                let link = resolve_link(&entry.raw_link);
                if title.is_empty() || !is_absolute(&link) {
                    debug!(page_index, raw_link = %entry.raw_link, "skipping unqualified entry");
                    continue;
                }
                accepted.push((title.to_string(), link));
            }

            let qualifying = accepted.len() - before;
            debug!(page_index, qualifying, total = accepted.len(), "search page processed");
            if qualifying == 0 {
                info!(page_index, "page yielded no qualifying entries, end of results");
                break;
            }
            page_index += 1;
        }

        accepted.truncate(desired);
        let hits: Vec<SearchHit> = accepted
            .into_iter()
            .enumerate()
            .map(|(i, (title, link))| SearchHit {
                index: i + 1,
                title,
                link,
            })
            .collect();

        info!(hits = hits.len(), "search collection complete");
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtscout_shared::CourtScoutError;
    use std::sync::Mutex;

    /// Serves scripted pages and records which page indices were requested.
    struct ScriptedSource {
        pages: Vec<Result<Vec<RawSearchEntry>>>,
        requested: Mutex<Vec<u32>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<Vec<RawSearchEntry>>>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchSource for ScriptedSource {
        async fn fetch_page(&self, _query: &str, page_index: u32) -> Result<Vec<RawSearchEntry>> {
            self.requested.lock().unwrap().push(page_index);
            match self.pages.get(page_index as usize) {
                Some(Ok(entries)) => Ok(entries.clone()),
                Some(Err(e)) => Err(CourtScoutError::transient(e.to_string())),
                None => Ok(Vec::new()),
            }
        }
    }

    fn page(page: usize, count: usize) -> Vec<RawSearchEntry> {
        (0..count)
            .map(|i| RawSearchEntry {
                title: format!("court {page}-{i}"),
                raw_link: format!("https://example.com/{page}/{i}"),
            })
            .collect()
    }

    fn collector(source: ScriptedSource) -> PaginatedSearchCollector<ScriptedSource> {
        PaginatedSearchCollector::new(source, Duration::ZERO)
    }

    #[tokio::test]
    async fn truncates_to_desired_count_with_dense_ordinals() {
        let c = collector(ScriptedSource::new(vec![
            Ok(page(0, 10)),
            Ok(page(1, 10)),
            Ok(page(2, 10)),
        ]));
        let hits = c.collect("q", 25).await;

        assert_eq!(hits.len(), 25);
        assert_eq!(
            hits.iter().map(|h| h.index).collect::<Vec<_>>(),
            (1..=25).collect::<Vec<_>>()
        );
        assert_eq!(hits[0].title, "court 0-0");
        assert_eq!(hits[10].title, "court 1-0");
        assert_eq!(hits[24].title, "court 2-4");
        assert_eq!(*c.source.requested.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn empty_page_stops_collection() {
        let c = collector(ScriptedSource::new(vec![
            Ok(page(0, 10)),
            Ok(Vec::new()),
            Ok(page(2, 10)),
        ]));
        let hits = c.collect("q", 50).await;

        assert_eq!(hits.len(), 10);
        assert_eq!(*c.source.requested.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn page_of_unqualified_entries_counts_as_empty() {
        let junk = vec![
            RawSearchEntry {
                title: "".into(),
                raw_link: "https://example.com/no-title".into(),
            },
            RawSearchEntry {
                title: "relative".into(),
                raw_link: "/relative".into(),
            },
        ];
        let c = collector(ScriptedSource::new(vec![Ok(page(0, 3)), Ok(junk)]));
        let hits = c.collect("q", 10).await;
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn failed_page_returns_hits_so_far() {
        let c = collector(ScriptedSource::new(vec![
            Ok(page(0, 10)),
            Err(CourtScoutError::transient("timeout")),
        ]));
        let hits = c.collect("q", 30).await;
        assert_eq!(hits.len(), 10);
    }

    #[tokio::test]
    async fn ordinals_skip_filtered_entries() {
        let mut entries = page(0, 2);
        entries.insert(
            1,
            RawSearchEntry {
                title: "bad".into(),
                raw_link: "javascript:void(0)".into(),
            },
        );
        entries.push(RawSearchEntry {
            title: "redirect".into(),
            raw_link: "/link?url=https%3A%2F%2Fr.example.com%2Fx".into(),
        });
        let c = collector(ScriptedSource::new(vec![Ok(entries)]));
        let hits = c.collect("q", 10).await;

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[1].title, "court 0-1");
        assert_eq!(hits[1].index, 2);
        assert_eq!(hits[2].link, "https://r.example.com/x");
        assert_eq!(hits[2].index, 3);
    }

    #[tokio::test]
    async fn zero_desired_requests_nothing() {
        let c = collector(ScriptedSource::new(vec![Ok(page(0, 10))]));
        assert!(c.collect("q", 0).await.is_empty());
        assert!(c.source.requested.lock().unwrap().is_empty());
    }
}
