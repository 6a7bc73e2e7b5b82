//! Natural-key resolution of candidate courts against the store.

use courtscout_shared::{CourtRecord, NaturalKey, Result};
use courtscout_storage::FacilityStore;
use tracing::debug;

/// Outcome of resolving a candidate court.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A court with this natural key is already stored; reuse its id.
    Existing(i64),
    /// No court with this key; the caller may insert.
    AuthorizeInsert,
}

/// Looks up candidate courts by `(name, province, city, district)`.
///
/// Lookup and insert are separate store calls. The libSQL store backs this
/// with a uniqueness constraint and insert-or-fetch, so a concurrent writer
/// that wins the race is reported by `insert_court` as `created = false`.
pub struct DedupGate<'a> {
    store: &'a dyn FacilityStore,
}

impl<'a> DedupGate<'a> {
    pub fn new(store: &'a dyn FacilityStore) -> Self {
        Self { store }
    }

    /// Resolve a stamped court. Fails with `SchemaMismatch` when the key is incomplete.
    pub async fn resolve(&self, court: &CourtRecord) -> Result<(NaturalKey, Resolution)> {
        let key = court.natural_key()?;
        let resolution = match self.store.find_court_by_natural_key(&key).await? {
            Some(id) => {
                debug!(court_id = id, name = %key.name, "natural key already stored");
                Resolution::Existing(id)
            }
            None => Resolution::AuthorizeInsert,
        };
        Ok((key, resolution))
    }
}
