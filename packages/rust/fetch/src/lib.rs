//! Page content fetching.
//!
//! A [`ContentSource`] turns a URL into normalized plain text plus, optionally,
//! the absolute URLs of the images on the page. [`HttpContentSource`] owns a
//! single HTTP session with an explicit open/close lifecycle; the pipeline
//! reopens it when it reports [`CourtScoutError::TerminalDriver`].

mod text;

use async_trait::async_trait;
use courtscout_shared::{CourtScoutError, FetchConfig, PageContent, Result};
use reqwest::Client;
use scraper::Html;
use tracing::{debug, info};
use url::Url;

pub use text::{extract_images, extract_text, normalize_line};

// ---------------------------------------------------------------------------
// ContentSource
// ---------------------------------------------------------------------------

/// A long-lived, exclusively owned page fetcher.
#[async_trait]
pub trait ContentSource: Send {
    /// Fetch one page and normalize its content.
    async fn fetch_page(&mut self, url: &str) -> Result<PageContent>;

    /// Close the underlying session (if any) and build a fresh one.
    async fn reopen(&mut self) -> Result<()>;

    /// Release the underlying session. Later fetches fail with `TerminalDriver`.
    async fn close(&mut self);
}

// ---------------------------------------------------------------------------
// HttpContentSource
// ---------------------------------------------------------------------------

/// Content source backed by a `reqwest` client session.
pub struct HttpContentSource {
    config: FetchConfig,
    client: Option<Client>,
}

impl HttpContentSource {
    /// Open a source with a ready session.
    pub fn open(config: FetchConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            config,
            client: Some(client),
        })
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }
}

fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(config.timeout)
        .build()
        .map_err(|e| CourtScoutError::TerminalDriver(format!("failed to build HTTP client: {e}")))
}

/// Parse a fetched document. Kept synchronous since `Html` is not `Send`.
fn parse_page(body: &str, page_url: &Url, with_images: bool) -> PageContent {
    let doc = Html::parse_document(body);
    let images = if with_images {
        extract_images(&doc, page_url)
    } else {
        Vec::new()
    };
    PageContent {
        text: extract_text(&doc),
        images,
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch_page(&mut self, url: &str) -> Result<PageContent> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| CourtScoutError::TerminalDriver("fetch session is closed".into()))?;

        let page_url = Url::parse(url)
            .map_err(|e| CourtScoutError::validation(format!("invalid page URL '{url}': {e}")))?;

        debug!(%page_url, "fetching page content");

        let response = client
            .get(page_url.as_str())
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
            .map_err(|e| CourtScoutError::transient(format!("{url}: body read failed: {e}")))?;

        let page = parse_page(&body, &page_url, self.config.extract_images);
        info!(
            url,
            text_len = page.text.chars().count(),
            images = page.images.len(),
            "fetched page content"
        );
        Ok(page)
    }

    async fn reopen(&mut self) -> Result<()> {
        self.close().await;
        self.client = Some(build_client(&self.config)?);
        info!("fetch session reopened");
        Ok(())
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("fetch session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(extract_images: bool) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(5),
            item_delay: Duration::ZERO,
            extract_images,
            user_agent: "courtscout-test".into(),
        }
    }

    const PAGE: &str = r#"<html><head><title>球场</title><style>.x{color:red}</style></head>
<body>
  <script>var tracking = 1;</script>
  <h1>临平体育公园  篮球场</h1>
  <p>免费开放，
     共 2 片全场</p>
  <img src="/img/a.jpg"><img data-src="https://cdn.example.com/b.png">
</body></html>"#;

    #[tokio::test]
    async fn fetches_and_normalizes_page() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/court"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(PAGE)
                    .insert_header("content-type", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let mut source = HttpContentSource::open(config(true)).unwrap();
        let url = format!("{}/court", server.uri());
        let page = source.fetch_page(&url).await.unwrap();

        assert_eq!(page.text, "球场\n临平体育公园 篮球场\n免费开放，\n共 2 片全场");
        assert_eq!(
            page.images,
            vec![
                format!("{}/img/a.jpg", server.uri()),
                "https://cdn.example.com/b.png".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn images_skipped_unless_enabled() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let mut source = HttpContentSource::open(config(false)).unwrap();
        let page = source.fetch_page(&server.uri()).await.unwrap();
        assert!(page.images.is_empty());
        assert!(!page.text.is_empty());
    }

    #[tokio::test]
    async fn http_error_is_transient() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut source = HttpContentSource::open(config(false)).unwrap();
        let err = source.fetch_page(&server.uri()).await.unwrap_err();
        assert!(matches!(err, CourtScoutError::TransientFetch(_)));
    }

    #[tokio::test]
    async fn closed_session_is_terminal_until_reopened() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let mut source = HttpContentSource::open(config(false)).unwrap();
        source.close().await;
        assert!(!source.is_open());

        let err = source.fetch_page(&server.uri()).await.unwrap_err();
        assert!(matches!(err, CourtScoutError::TerminalDriver(_)));

        source.reopen().await.unwrap();
        assert!(source.is_open());
        assert!(source.fetch_page(&server.uri()).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let mut source = HttpContentSource::open(config(false)).unwrap();
        let err = source.fetch_page("not a url").await.unwrap_err();
        assert!(matches!(err, CourtScoutError::Validation { .. }));
    }
}
