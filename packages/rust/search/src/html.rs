//! HTML search-results source.

use async_trait::async_trait;
use courtscout_shared::{CourtScoutError, RawSearchEntry, Result, SearchConfig};
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::SearchSource;

static RESULT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.result").expect("result selector"));

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3 a, a.t").expect("title selector"));

/// Search source that scrapes a results page served as HTML.
///
/// Requests `{base_url}?wd=<query>&pn=<page_index * page_size>`.
pub struct HtmlSearchSource {
    client: Client,
    base_url: Url,
    page_size: u32,
}

impl HtmlSearchSource {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            CourtScoutError::config(format!("invalid search base_url '{}': {e}", config.base_url))
        })?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CourtScoutError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            page_size: config.page_size,
        })
    }

    fn page_url(&self, query: &str, page_index: u32) -> Url {
        let offset = (u64::from(page_index) * u64::from(self.page_size)).to_string();
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("wd", query)
            .append_pair("pn", &offset);
        url
    }
}

#[async_trait]
impl SearchSource for HtmlSearchSource {
    async fn fetch_page(&self, query: &str, page_index: u32) -> Result<Vec<RawSearchEntry>> {
        let url = self.page_url(query, page_index);
        debug!(%url, page_index, "requesting search page");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CourtScoutError::transient(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourtScoutError::transient(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CourtScoutError::transient(format!("{url}: failed to read body: {e}")))?;

        Ok(parse_results_page(&body))
    }
}

/// Extract `(title, raw link)` pairs from one results page, in page order.
///
/// Containers without a title anchor are skipped. Titles are whitespace-normalized.
pub fn parse_results_page(html: &str) -> Vec<RawSearchEntry> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT_SELECTOR)
        .filter_map(|container| {
            let anchor = container.select(&TITLE_SELECTOR).next()?;
            let title = anchor
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            let raw_link = anchor.value().attr("href").unwrap_or_default().to_string();
            Some(RawSearchEntry { title, raw_link })
        })
        .collect()
}
