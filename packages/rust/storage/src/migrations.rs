//! SQL migration definitions for the CourtScout database.
//!
//! Migrations are applied in order on database open. Column names of
//! `basketball_courts` and `court_units` match the record field tables.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: basketball_courts, court_units, pipeline_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Facilities; (name, province, city, district) is the natural key
CREATE TABLE IF NOT EXISTS basketball_courts (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    name                   TEXT NOT NULL DEFAULT '',
    description            TEXT,
    operator               TEXT,
    is_free                INTEGER,
    access_type            TEXT,
    province               TEXT NOT NULL DEFAULT '',
    city                   TEXT NOT NULL DEFAULT '',
    district               TEXT NOT NULL DEFAULT '',
    address                TEXT,
    place_id               TEXT,
    latitude               REAL,
    longtitude             REAL,
    nearest_transit        TEXT,
    has_parking            INTEGER,
    free_parking           INTEGER,
    parking_type           TEXT,
    parking_fee_info       TEXT,
    parking_capacity       INTEGER,
    has_lights             INTEGER,
    light_type             TEXT,
    light_hours_desc       TEXT,
    surface_type           TEXT,
    surface_notes          TEXT,
    total_units_count      INTEGER,
    half_units_count       INTEGER,
    week_open_hours        TEXT,
    free_open_hours        TEXT,
    week_appointment_hours TEXT,
    appointment_type_desc  TEXT,
    amenities_summary      TEXT,
    built_time             TEXT,
    gmt_create             TEXT,
    creator                TEXT,
    creator_id             TEXT,
    gmt_modified           TEXT,
    modifier_id            TEXT,
    modifier               TEXT,
    UNIQUE(name, province, city, district)
);

-- Individual court surfaces
CREATE TABLE IF NOT EXISTS court_units (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    court_id                INTEGER NOT NULL REFERENCES basketball_courts(id),
    unit_name               TEXT,
    unit_type               TEXT,
    length_m                INTEGER,
    width_m                 INTEGER,
    is_standard             INTEGER,
    fenced                  INTEGER,
    lines_painted           INTEGER,
    surface_condition_score INTEGER,
    hoop_brand              TEXT,
    hoop_material           TEXT,
    rim_type                TEXT,
    rim_height_cm           INTEGER,
    is_standard_rim         INTEGER,
    unit_status             TEXT,
    surface_type            TEXT,
    surface_status          TEXT,
    gmt_create              TEXT,
    gmt_modified            TEXT,
    modifier_id             TEXT,
    modifier                TEXT,
    creator_id              TEXT,
    creator                 TEXT
);

CREATE INDEX IF NOT EXISTS idx_court_units_court_id ON court_units(court_id);

-- Pipeline run history
CREATE TABLE IF NOT EXISTS pipeline_runs (
    id          TEXT PRIMARY KEY,
    mode        TEXT NOT NULL,
    province    TEXT NOT NULL,
    city        TEXT NOT NULL,
    district    TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
