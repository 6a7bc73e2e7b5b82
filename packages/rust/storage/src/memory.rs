//! In-memory [`FacilityStore`] for tests and `--dry-run`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use courtscout_shared::{
    CourtRecord, CourtScoutError, CourtUnitRecord, Location, NaturalKey, Result, RunMode,
};
use uuid::Uuid;

use crate::{CourtInsert, FacilityStore, RunRecord};

#[derive(Default)]
struct Tables {
    courts: Vec<(i64, CourtRecord)>,
    keys: HashMap<NaturalKey, i64>,
    units: Vec<(i64, i64, CourtUnitRecord)>,
    runs: Vec<RunRecord>,
}

/// Facility store held in process memory. Ids start at 1 like SQLite rowids.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| CourtScoutError::persistence("memory store lock poisoned"))
    }

    pub fn court_count(&self) -> Result<usize> {
        Ok(self.lock()?.courts.len())
    }

    pub fn unit_count(&self) -> Result<usize> {
        Ok(self.lock()?.units.len())
    }

    /// All courts in insertion order with their ids.
    pub fn courts(&self) -> Result<Vec<(i64, CourtRecord)>> {
        Ok(self.lock()?.courts.clone())
    }

    /// All units as `(unit_id, court_id, record)` in insertion order.
    pub fn units(&self) -> Result<Vec<(i64, i64, CourtUnitRecord)>> {
        Ok(self.lock()?.units.clone())
    }

    pub fn runs(&self) -> Result<Vec<RunRecord>> {
        Ok(self.lock()?.runs.clone())
    }
}

#[async_trait]
impl FacilityStore for MemoryStore {
    async fn find_court_by_natural_key(&self, key: &NaturalKey) -> Result<Option<i64>> {
        Ok(self.lock()?.keys.get(key).copied())
    }

    async fn insert_court(&self, court: &CourtRecord) -> Result<CourtInsert> {
        let key = court.natural_key()?;
        let mut tables = self.lock()?;
        if let Some(&id) = tables.keys.get(&key) {
            return Ok(CourtInsert { id, created: false });
        }
        let id = tables.courts.len() as i64 + 1;
        tables.courts.push((id, court.clone()));
        tables.keys.insert(key, id);
        Ok(CourtInsert { id, created: true })
    }

    async fn insert_unit(&self, court_id: i64, unit: &CourtUnitRecord) -> Result<i64> {
        let mut tables = self.lock()?;
        if !tables.courts.iter().any(|(id, _)| *id == court_id) {
            return Err(CourtScoutError::persistence(format!(
                "unit references unknown court {court_id}"
            )));
        }
        let id = tables.units.len() as i64 + 1;
        tables.units.push((id, court_id, unit.clone()));
        Ok(id)
    }

    async fn start_run(&self, mode: RunMode, _location: &Location) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        self.lock()?.runs.push(RunRecord {
            id: id.clone(),
            mode: mode.as_str().to_string(),
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            stats_json: None,
        });
        Ok(id)
    }

    async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        let mut tables = self.lock()?;
        let run = tables
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| CourtScoutError::persistence(format!("unknown run {run_id}")))?;
        run.finished_at = Some(Utc::now().to_rfc3339());
        run.stats_json = Some(stats_json.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn court(value: serde_json::Value) -> CourtRecord {
        CourtRecord::from_json(value.as_object().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn insert_or_fetch_by_key() {
        let store = MemoryStore::new();
        let a = store
            .insert_court(&court(json!({"name": "A", "province": "P", "city": "C"})))
            .await
            .unwrap();
        let b = store
            .insert_court(&court(json!({"name": "A", "province": "P", "city": "C"})))
            .await
            .unwrap();
        let c = store
            .insert_court(&court(json!({"name": "A", "province": "P", "city": "Other"})))
            .await
            .unwrap();

        assert_eq!(a, CourtInsert { id: 1, created: true });
        assert_eq!(b, CourtInsert { id: 1, created: false });
        assert_eq!(c, CourtInsert { id: 2, created: true });
        assert_eq!(store.court_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn unit_requires_existing_court() {
        let store = MemoryStore::new();
        let unit = CourtUnitRecord::default();
        assert!(store.insert_unit(1, &unit).await.is_err());
        assert_eq!(store.unit_count().unwrap(), 0);

        let c = store
            .insert_court(&court(json!({"name": "A", "province": "P"})))
            .await
            .unwrap();
        assert_eq!(store.insert_unit(c.id, &unit).await.unwrap(), 1);
        assert_eq!(store.unit_count().unwrap(), 1);
        assert_eq!(store.units().unwrap()[0].1, c.id);
    }

    #[tokio::test]
    async fn run_finish_records_stats() {
        let store = MemoryStore::new();
        let id = store
            .start_run(RunMode::Conversation, &Location::default())
            .await
            .unwrap();
        store.finish_run(&id, "{}").await.unwrap();

        let runs = store.runs().unwrap();
        assert_eq!(runs[0].mode, "conversation");
        assert_eq!(runs[0].stats_json.as_deref(), Some("{}"));
        assert!(store.finish_run("missing", "{}").await.is_err());
    }
}
