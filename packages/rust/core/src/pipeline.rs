//! End-to-end runs: search hits or a model conversation → candidate groups →
//! dedup → store → export.
//!
//! Both run modes feed every candidate group through
//! [`Orchestrator::persist_group`], so dedup and write rules are identical
//! regardless of where a group came from. Failures are contained per item
//! (web mode) or per group (conversation mode); only an unrecoverable fetch
//! session ends a run early.

use std::path::PathBuf;
use std::time::Duration;

use courtscout_export::ExportSink;
use courtscout_extract::{Advance, ConversationExtractor, extract_from_page};
use courtscout_fetch::ContentSource;
use courtscout_llm::ChatModel;
use courtscout_search::{PaginatedSearchCollector, SearchSource};
use courtscout_shared::{
    CandidateGroup, CourtScoutError, ExportRow, ExtractConfig, Location, PageContent, Result,
    RunMode, SearchHit,
};
use courtscout_storage::FacilityStore;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use crate::dedup::{DedupGate, Resolution};
use crate::report::{ProgressReporter, RunReport};

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

/// Configuration for a web-mode run.
#[derive(Debug, Clone)]
pub struct WebRunConfig {
    pub location: Location,
    pub query: String,
    /// Number of search hits to process.
    pub result_count: usize,
    /// Pause between consecutive item fetches.
    pub item_delay: Duration,
    pub extract: ExtractConfig,
}

/// Configuration for a conversational run.
#[derive(Debug, Clone)]
pub struct ConversationRunConfig {
    pub location: Location,
    pub query: String,
    pub extract: ExtractConfig,
}

/// Collaborators shared by both run modes.
pub struct RunContext<'a> {
    pub store: &'a dyn FacilityStore,
    pub model: &'a dyn ChatModel,
    pub export: &'a mut dyn ExportSink,
    pub progress: &'a dyn ProgressReporter,
}

/// Result of a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub report: RunReport,
    /// `None` when nothing was exported.
    pub export_path: Option<PathBuf>,
    pub export_error: Option<String>,
}

/// Where a candidate group came from.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub url: Option<String>,
    pub title: Option<String>,
    pub images: Vec<String>,
}

impl Provenance {
    fn from_page(hit: &SearchHit, page: &PageContent) -> Self {
        Self {
            url: Some(hit.link.clone()),
            title: Some(hit.title.clone()),
            images: page.images.clone(),
        }
    }
}

/// What happened to one candidate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    Persisted {
        court_id: i64,
        created: bool,
        units: usize,
    },
    /// `success = false`; counted, not stored.
    Discarded,
    /// Incomplete natural key; counted, not stored.
    Rejected,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Turns candidate groups into stored courts and units, and keeps the run's
/// counters and export buffer.
pub struct Orchestrator<'a> {
    store: &'a dyn FacilityStore,
    progress: &'a dyn ProgressReporter,
    location: Location,
    report: RunReport,
    export: Vec<ExportRow>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn FacilityStore,
        location: Location,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            store,
            progress,
            location,
            report: RunReport::default(),
            export: Vec::new(),
        }
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Resolved courts so far, in resolution order.
    pub fn export_rows(&self) -> &[ExportRow] {
        &self.export
    }

    pub fn into_parts(self) -> (RunReport, Vec<ExportRow>) {
        (self.report, self.export)
    }

    /// Stamp, dedup and store one candidate group.
    ///
    /// Returns an error only for store failures; the remaining writes of the
    /// group are abandoned. A court that was resolved before a unit write
    /// failed stays in the export buffer.
    pub async fn persist_group(
        &mut self,
        group: CandidateGroup,
        provenance: &Provenance,
    ) -> Result<GroupOutcome> {
        self.report.groups_seen += 1;

        let CandidateGroup {
            success,
            mut primary,
            children,
            issues,
        } = group;

        if !success {
            self.report.groups_discarded += 1;
            warn!(
                name = primary.name(),
                issues = ?issues,
                "group not marked successful, discarded"
            );
            return Ok(GroupOutcome::Discarded);
        }

        primary.stamp_location(&self.location);

        let (key, resolution) = match DedupGate::new(self.store).resolve(&primary).await {
            Ok(resolved) => resolved,
            Err(e @ CourtScoutError::SchemaMismatch { .. }) => {
                self.report.records_rejected += 1;
                warn!(
                    name = primary.name(),
                    province = %self.location.province,
                    city = %self.location.city,
                    district = %self.location.district,
                    error = %e,
                    "court rejected"
                );
                return Ok(GroupOutcome::Rejected);
            }
            Err(e) => {
                self.report.persistence_failures += 1;
                return Err(e);
            }
        };

        let (court_id, created) = match resolution {
            Resolution::Existing(id) => (id, false),
            Resolution::AuthorizeInsert => match self.store.insert_court(&primary).await {
                Ok(inserted) => (inserted.id, inserted.created),
                Err(e) => {
                    self.report.persistence_failures += 1;
                    warn!(natural_key = %key, error = %e, "court insert failed");
                    return Err(e);
                }
            },
        };

        if created {
            self.report.courts_inserted += 1;
            info!(court_id, name = %key.name, "court inserted");
        } else {
            self.report.courts_reused += 1;
            info!(court_id, name = %key.name, "court already stored, reusing id");
        }
        self.progress.court(&key.name, created);

        self.export.push(ExportRow {
            id: court_id,
            court: primary,
            source_url: provenance.url.clone(),
            source_title: provenance.title.clone(),
            image_urls: provenance.images.clone(),
        });

        let mut units = 0;
        for unit in &children {
            match self.store.insert_unit(court_id, unit).await {
                Ok(_) => {
                    units += 1;
                    self.report.units_inserted += 1;
                }
                Err(e) => {
                    self.report.persistence_failures += 1;
                    warn!(
                        court_id,
                        natural_key = %key,
                        unit = unit.unit_name(),
                        error = %e,
                        "unit insert failed, abandoning remaining writes"
                    );
                    return Err(e);
                }
            }
        }

        Ok(GroupOutcome::Persisted {
            court_id,
            created,
            units,
        })
    }
}

// ---------------------------------------------------------------------------
// Web mode
// ---------------------------------------------------------------------------

/// Search, then fetch and extract each hit in order.
///
/// 1. Record the run start
/// 2. Collect search hits
/// 3. For each hit: fetch (with one session reopen), single-shot extract, persist
/// 4. Record the report and export the resolved courts
#[instrument(skip_all, fields(mode = "web", location = %config.location))]
pub async fn run_web_mode<S: SearchSource>(
    collector: &PaginatedSearchCollector<S>,
    content: &mut dyn ContentSource,
    ctx: RunContext<'_>,
    config: &WebRunConfig,
) -> Result<RunOutcome> {
    let RunContext {
        store,
        model,
        export,
        progress,
    } = ctx;

    let run_id = store.start_run(RunMode::Web, &config.location).await?;
    info!(%run_id, query = %config.query, "starting web run");

    progress.phase("Searching");
    let hits = collector.collect(&config.query, config.result_count).await;

    let mut orchestrator = Orchestrator::new(store, config.location.clone(), progress);
    orchestrator.report.items_total = hits.len();

    progress.phase("Extracting");
    for (i, hit) in hits.iter().enumerate() {
        if i > 0 && !config.item_delay.is_zero() {
            tokio::time::sleep(config.item_delay).await;
        }
        progress.item(hit.index, hits.len(), &hit.title);

        let span = info_span!("item", item = hit.index, url = %hit.link);
        let result = process_hit(&mut orchestrator, content, model, &config.extract, hit)
            .instrument(span)
            .await;

        if let Err(e) = result {
            error!(item = hit.index, error = %e, "fatal error, aborting run");
            orchestrator.report.abort_reason = Some(e.to_string());
            break;
        }
    }

    content.close().await;
    Ok(finish(orchestrator, run_id, store, export).await)
}

/// Process one search hit. Returns an error only when the run must stop.
async fn process_hit(
    orchestrator: &mut Orchestrator<'_>,
    content: &mut dyn ContentSource,
    model: &dyn ChatModel,
    extract: &ExtractConfig,
    hit: &SearchHit,
) -> Result<()> {
    let page = match fetch_with_recovery(content, &hit.link).await {
        Ok(page) => page,
        Err(e) if e.is_fatal_for_run() => return Err(e),
        Err(e) => {
            orchestrator.report.items_skipped += 1;
            warn!(item = hit.index, url = %hit.link, error = %e, "content fetch failed, skipping item");
            return Ok(());
        }
    };

    if page.text.trim().is_empty() {
        orchestrator.report.items_skipped += 1;
        warn!(item = hit.index, url = %hit.link, "page has no text, skipping item");
        return Ok(());
    }

    let extraction = match extract_from_page(model, extract, &page.text).await {
        Ok(extraction) => extraction,
        Err(e) => {
            orchestrator.report.items_skipped += 1;
            warn!(item = hit.index, url = %hit.link, error = %e, "extraction failed, skipping item");
            return Ok(());
        }
    };
    if extraction.malformed {
        orchestrator.report.malformed_responses += 1;
    }

    let provenance = Provenance::from_page(hit, &page);
    for group in extraction.groups {
        if let Err(e) = orchestrator.persist_group(group, &provenance).await {
            orchestrator.report.items_failed += 1;
            warn!(item = hit.index, url = %hit.link, error = %e, "store write failed, item abandoned");
            return Ok(());
        }
    }

    orchestrator.report.items_processed += 1;
    Ok(())
}

/// Fetch a page; on an unusable session, reopen it and retry exactly once.
async fn fetch_with_recovery(content: &mut dyn ContentSource, url: &str) -> Result<PageContent> {
    match content.fetch_page(url).await {
        Err(CourtScoutError::TerminalDriver(message)) => {
            warn!(url, error = %message, "fetch session unusable, reopening");
            content.reopen().await.map_err(|e| {
                CourtScoutError::TerminalDriver(format!("session reopen failed: {e}"))
            })?;
            content.fetch_page(url).await
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Conversation mode
// ---------------------------------------------------------------------------

/// Pull groups from a model conversation and persist each as it arrives.
#[instrument(skip_all, fields(mode = "conversation", location = %config.location))]
pub async fn run_conversation_mode(
    ctx: RunContext<'_>,
    config: &ConversationRunConfig,
) -> Result<RunOutcome> {
    let RunContext {
        store,
        model,
        export,
        progress,
    } = ctx;

    let run_id = store
        .start_run(RunMode::Conversation, &config.location)
        .await?;
    info!(%run_id, query = %config.query, "starting conversational run");

    let mut orchestrator = Orchestrator::new(store, config.location.clone(), progress);
    let mut extractor = ConversationExtractor::new(
        model,
        config.extract.clone(),
        config.location.clone(),
        &config.query,
    );
    let max_rounds = config.extract.max_rounds;
    let no_provenance = Provenance::default();

    progress.phase("Conversing");
    let mut announced = 0;
    let end_reason = loop {
        let round = extractor.round_number();
        if round != announced && round <= max_rounds {
            progress.item(round as usize, max_rounds as usize, "round");
            announced = round;
        }

        match extractor.advance().instrument(info_span!("round", round)).await {
            Ok(Advance::Group(group)) => {
                if let Err(e) = orchestrator.persist_group(group, &no_provenance).await {
                    warn!(round, error = %e, "store write failed, group abandoned");
                }
            }
            Ok(Advance::End(reason)) => break reason,
            Err(e) => warn!(round, error = %e, "round failed, ending conversation"),
        }
    };

    let rounds = extractor.rounds();
    orchestrator.report.rounds = rounds.len();
    orchestrator.report.malformed_responses = rounds.iter().filter(|r| r.malformed).count();
    orchestrator.report.end_reason = Some(end_reason);
    info!(?end_reason, rounds = rounds.len(), "conversation ended");

    Ok(finish(orchestrator, run_id, store, export).await)
}

// ---------------------------------------------------------------------------
// Finish
// ---------------------------------------------------------------------------

/// Record the report with the run and export the buffer. Failures here are
/// logged; the report itself is always returned.
async fn finish(
    orchestrator: Orchestrator<'_>,
    run_id: String,
    store: &dyn FacilityStore,
    export: &mut dyn ExportSink,
) -> RunOutcome {
    let (report, rows) = orchestrator.into_parts();

    match serde_json::to_string(&report) {
        Ok(json) => {
            if let Err(e) = store.finish_run(&run_id, &json).await {
                warn!(%run_id, error = %e, "failed to record run completion");
            }
        }
        Err(e) => warn!(%run_id, error = %e, "failed to serialize run report"),
    }

    let (export_path, export_error) = match export.write_rows(&rows) {
        Ok(path) => (path, None),
        Err(e) => {
            warn!(error = %e, "export failed");
            (None, Some(e.to_string()))
        }
    };

    info!(
        %run_id,
        courts_inserted = report.courts_inserted,
        courts_reused = report.courts_reused,
        units_inserted = report.units_inserted,
        items_skipped = report.items_skipped,
        "run complete"
    );

    RunOutcome {
        run_id,
        report,
        export_path,
        export_error,
    }
}
