//! libSQL storage layer for courts, units and pipeline runs.
//!
//! [`FacilityStore`] is the seam the pipeline writes through. [`Storage`]
//! implements it on a local libSQL file; [`MemoryStore`] implements it in
//! memory for tests and dry runs.
//!
//! **Write rules:**
//! - inserts only; the pipeline never updates or deletes facility rows
//! - every statement commits on its own (no multi-statement transactions)
//! - `insert_court` is insert-or-fetch on the natural key

mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use courtscout_shared::{
    CourtRecord, CourtScoutError, CourtUnitRecord, FieldValue, Location, NaturalKey,
    RecordFields, Result, RunMode,
};
use libsql::{Connection, Database, params};
use uuid::Uuid;

pub use memory::MemoryStore;

/// Audit column stamped by the store on every insert.
const CREATED_AT_COLUMN: &str = "gmt_create";

// ---------------------------------------------------------------------------
// FacilityStore
// ---------------------------------------------------------------------------

/// Outcome of [`FacilityStore::insert_court`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourtInsert {
    pub id: i64,
    /// False when a row with the same natural key already existed.
    pub created: bool,
}

/// A finished or in-progress pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: String,
    pub mode: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

/// Persistent store for facility records.
#[async_trait]
pub trait FacilityStore: Send + Sync {
    /// Identity of the court with this natural key, if any.
    async fn find_court_by_natural_key(&self, key: &NaturalKey) -> Result<Option<i64>>;

    /// Insert a court, or return the existing identity for its natural key.
    async fn insert_court(&self, court: &CourtRecord) -> Result<CourtInsert>;

    /// Insert a unit under an existing court. Returns the unit id.
    async fn insert_unit(&self, court_id: i64, unit: &CourtUnitRecord) -> Result<i64>;

    /// Record the start of a pipeline run. Returns the run id.
    async fn start_run(&self, mode: RunMode, location: &Location) -> Result<String>;

    /// Mark a run finished with its serialized report.
    async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()>;
}

fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn to_sql_value(value: &FieldValue) -> libsql::Value {
    match value {
        FieldValue::Text(s) => libsql::Value::Text(s.clone()),
        FieldValue::Integer(i) => libsql::Value::Integer(*i),
        FieldValue::Float(x) => libsql::Value::Real(*x),
    }
}

/// Column list and positional values for the populated fields of a record,
/// with the creation timestamp appended.
fn insert_columns(
    fields: &RecordFields,
    leading: Vec<(&'static str, libsql::Value)>,
) -> (Vec<&'static str>, Vec<libsql::Value>) {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (column, value) in leading {
        columns.push(column);
        values.push(value);
    }
    for (spec, value) in fields.populated() {
        if spec.name == CREATED_AT_COLUMN {
            continue;
        }
        columns.push(spec.name);
        values.push(to_sql_value(value));
    }
    columns.push(CREATED_AT_COLUMN);
    values.push(libsql::Value::Text(now_timestamp()));
    (columns, values)
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CourtScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode (for inspection).
    ///
    /// Unlike [`Storage::open`], a missing file is an error rather than a new database.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(CourtScoutError::persistence(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CourtScoutError::persistence(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CourtScoutError::persistence(
                "database is opened in read-only mode",
            ));
        }
        Ok(())
    }

    async fn query_i64(
        &self,
        sql: &str,
        args: impl libsql::params::IntoParams,
    ) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(sql, args)
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?
        {
            Some(row) => Ok(Some(
                row.get::<i64>(0)
                    .map_err(|e| CourtScoutError::persistence(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Read helpers
    // -----------------------------------------------------------------------

    /// Number of court rows.
    pub async fn count_courts(&self) -> Result<i64> {
        Ok(self
            .query_i64("SELECT COUNT(*) FROM basketball_courts", params![])
            .await?
            .unwrap_or(0))
    }

    /// Number of unit rows.
    pub async fn count_units(&self) -> Result<i64> {
        Ok(self
            .query_i64("SELECT COUNT(*) FROM court_units", params![])
            .await?
            .unwrap_or(0))
    }

    /// Parent court id of every unit, in insertion order.
    pub async fn list_unit_court_ids(&self) -> Result<Vec<i64>> {
        let mut rows = self
            .conn
            .query("SELECT court_id FROM court_units ORDER BY id", params![])
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?
        {
            ids.push(
                row.get::<i64>(0)
                    .map_err(|e| CourtScoutError::persistence(e.to_string()))?,
            );
        }
        Ok(ids)
    }

    /// Name of a court by id.
    pub async fn get_court_name(&self, court_id: i64) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT name FROM basketball_courts WHERE id = ?1",
                params![court_id],
            )
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?
        {
            Some(row) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| CourtScoutError::persistence(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// A pipeline run by id.
    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, mode, started_at, finished_at, stats_json
                 FROM pipeline_runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?
        {
            Some(row) => {
                let record = RunRecord {
                    id: row
                        .get::<String>(0)
                        .map_err(|e| CourtScoutError::persistence(e.to_string()))?,
                    mode: row
                        .get::<String>(1)
                        .map_err(|e| CourtScoutError::persistence(e.to_string()))?,
                    started_at: row
                        .get::<String>(2)
                        .map_err(|e| CourtScoutError::persistence(e.to_string()))?,
                    finished_at: row.get::<String>(3).ok(),
                    stats_json: row.get::<String>(4).ok(),
                };
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FacilityStore for Storage {
    async fn find_court_by_natural_key(&self, key: &NaturalKey) -> Result<Option<i64>> {
        self.query_i64(
            "SELECT id FROM basketball_courts
             WHERE name = ?1 AND province = ?2 AND city = ?3 AND district = ?4
             LIMIT 1",
            params![
                key.name.as_str(),
                key.province.as_str(),
                key.city.as_str(),
                key.district.as_str()
            ],
        )
        .await
    }

    async fn insert_court(&self, court: &CourtRecord) -> Result<CourtInsert> {
        self.check_writable()?;
        let key = court.natural_key()?;

        let (columns, values) = insert_columns(&court.0, Vec::new());
        let sql = format!(
            "INSERT INTO basketball_courts ({}) VALUES ({})
             ON CONFLICT(name, province, city, district) DO NOTHING",
            columns.join(", "),
            placeholders(values.len())
        );

        let inserted = self
            .conn
            .execute(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;

        if inserted > 0 {
            return Ok(CourtInsert {
                id: self.conn.last_insert_rowid(),
                created: true,
            });
        }

        // Another writer got there first.
        let id = self.find_court_by_natural_key(&key).await?.ok_or_else(|| {
            CourtScoutError::persistence(format!("court {key} vanished after conflict"))
        })?;
        tracing::debug!(court_id = id, name = %key.name, "natural key already present");
        Ok(CourtInsert { id, created: false })
    }

    async fn insert_unit(&self, court_id: i64, unit: &CourtUnitRecord) -> Result<i64> {
        self.check_writable()?;

        let (columns, values) =
            insert_columns(&unit.0, vec![("court_id", libsql::Value::Integer(court_id))]);
        let sql = format!(
            "INSERT INTO court_units ({}) VALUES ({})",
            columns.join(", "),
            placeholders(values.len())
        );

        self.conn
            .execute(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn start_run(&self, mode: RunMode, location: &Location) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO pipeline_runs (id, mode, province, city, district, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    mode.as_str(),
                    location.province.as_str(),
                    location.city.as_str(),
                    location.district.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;
        Ok(id)
    }

    async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE pipeline_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| CourtScoutError::persistence(e.to_string()))?;
        Ok(())
    }
}
