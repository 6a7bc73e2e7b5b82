//! Run statistics and progress callbacks.

use courtscout_extract::EndReason;
use serde::Serialize;

/// Aggregate counters for one pipeline run, stored as JSON with the run record.
///
/// Items are search hits in web mode; conversational runs count rounds instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub items_total: usize,
    pub items_processed: usize,
    /// Items skipped before extraction (fetch failure, empty page, model failure).
    pub items_skipped: usize,
    /// Items whose writes were abandoned after a store failure.
    pub items_failed: usize,
    pub groups_seen: usize,
    /// `success = false` groups.
    pub groups_discarded: usize,
    /// Successful groups whose court lacked a complete natural key.
    pub records_rejected: usize,
    pub courts_inserted: usize,
    pub courts_reused: usize,
    pub units_inserted: usize,
    pub persistence_failures: usize,
    pub malformed_responses: usize,
    pub rounds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    /// Set when the run stopped early on a fatal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl RunReport {
    pub fn aborted(&self) -> bool {
        self.abort_reason.is_some()
    }
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Callback for reporting run progress to a UI.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each item (web mode) or round (conversation mode).
    fn item(&self, current: usize, total: usize, detail: &str);
    /// Called after a court is resolved to an id.
    fn court(&self, name: &str, created: bool);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _detail: &str) {}
    fn court(&self, _name: &str, _created: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_without_empty_reasons() {
        let report = RunReport {
            courts_inserted: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["courts_inserted"], 2);
        assert!(json.get("end_reason").is_none());
        assert!(json.get("abort_reason").is_none());
    }

    #[test]
    fn end_reason_serializes_snake_case() {
        let report = RunReport {
            end_reason: Some(EndReason::RoundCap),
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["end_reason"], "round_cap");
    }
}
