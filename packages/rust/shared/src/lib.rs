//! Shared types, error model, and configuration for CourtScout.
//!
//! This crate is the foundation depended on by all other CourtScout crates.
//! It provides:
//! - [`CourtScoutError`], the unified error type
//! - Domain types ([`SearchHit`], [`PageContent`], [`Location`], [`ExportRow`])
//! - The record schema and typed record construction ([`CourtRecord`], [`CandidateGroup`])
//! - Configuration ([`AppConfig`] and the runtime configs, config loading)

pub mod config;
pub mod error;
pub mod record;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, ExtractConfig, FetchConfig, FetchSourceConfig, LlmConfig,
    SearchConfig, SearchSourceConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_api_key,
};
pub use error::{CourtScoutError, Result};
pub use record::{
    COURT_FIELDS, CandidateGroup, CourtRecord, CourtUnitRecord, FieldError, FieldKind,
    FieldSpec, FieldValue, RecordFields, UNIT_FIELDS, prompted_fields,
};
pub use types::{
    ExportRow, ExtractionRound, Location, NaturalKey, PageContent, RawSearchEntry, RunMode,
    SearchHit,
};
