//! Core domain types for CourtScout runs.

use serde::{Deserialize, Serialize};

use crate::record::{CandidateGroup, CourtRecord};

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Target administrative location stamped onto every persisted court.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub province: String,
    pub city: String,
    pub district: String,
}

impl Location {
    pub fn new(province: &str, city: &str, district: &str) -> Self {
        Self {
            province: province.trim().to_string(),
            city: city.trim().to_string(),
            district: district.trim().to_string(),
        }
    }

    /// Concatenated label, e.g. `浙江省杭州市临平区`.
    pub fn label(&self) -> String {
        format!("{}{}{}", self.province, self.city, self.district)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

// ---------------------------------------------------------------------------
// NaturalKey
// ---------------------------------------------------------------------------

/// The sole identity used for court deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub name: String,
    pub province: String,
    pub city: String,
    pub district: String,
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}/{}/{})",
            self.name, self.province, self.city, self.district
        )
    }
}

// ---------------------------------------------------------------------------
// Search and content
// ---------------------------------------------------------------------------

/// One entry as served by a search page, before link resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSearchEntry {
    pub title: String,
    pub raw_link: String,
}

/// A qualifying search result. `index` is 1-based and dense over the final list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub index: usize,
    pub title: String,
    pub link: String,
}

/// Normalized text and image URLs of one fetched page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub text: String,
    pub images: Vec<String>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// One conversational turn and the groups parsed from it.
#[derive(Debug, Clone)]
pub struct ExtractionRound {
    /// Starts at 1, no gaps.
    pub round_number: u32,
    pub raw_response: String,
    pub parsed_groups: Vec<CandidateGroup>,
}

/// Which source drove a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Search hits, page fetch, single-shot extraction.
    Web,
    /// Multi-round conversational extraction.
    Conversation,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Conversation => "conversation",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// A resolved court ready for tabular export.
#[derive(Debug, Clone)]
pub struct ExportRow {
    /// Store-assigned identity (existing or newly inserted).
    pub id: i64,
    pub court: CourtRecord,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    pub image_urls: Vec<String>,
}
