//! Schema for the libSQL backend.
//!
//! Mirrors `migrations/V1__case_schema.sql` with SQLite types: UUIDs and
//! timestamps are TEXT, and full-text search runs over a generated
//! lower-cased `search_text` column instead of a tsvector.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS compliance_recommendations (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT,
    region TEXT,
    priority TEXT,
    risk_rating TEXT,
    parcel_ref TEXT,
    status TEXT NOT NULL DEFAULT 'Draft'
        CHECK (status IN ('Published', 'Draft', 'Archived')),
    published_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    search_text TEXT GENERATED ALWAYS AS (
        lower(
            coalesce(title, '') || ' ' ||
            coalesce(content, '') || ' ' ||
            coalesce(region, '') || ' ' ||
            coalesce(parcel_ref, '')
        )
    ) STORED
);

CREATE INDEX IF NOT EXISTS idx_recommendations_published
    ON compliance_recommendations (status, published_at DESC, id);
CREATE INDEX IF NOT EXISTS idx_recommendations_region
    ON compliance_recommendations (region);

CREATE TABLE IF NOT EXISTS cases (
    id TEXT PRIMARY KEY,
    case_number TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    status TEXT NOT NULL,
    case_type TEXT,
    priority TEXT,
    region TEXT,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS case_parties (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    role TEXT,
    contact_email TEXT,
    contact_phone TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_case_parties_case ON case_parties (case_id, created_at);

CREATE TABLE IF NOT EXISTS case_tasks (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    status TEXT,
    assignee TEXT,
    due_date TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_case_tasks_case ON case_tasks (case_id, created_at);

CREATE TABLE IF NOT EXISTS case_events (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    description TEXT,
    occurred_at TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_case_events_case ON case_events (case_id, created_at);

CREATE TABLE IF NOT EXISTS case_documents (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    file_name TEXT NOT NULL,
    mime_type TEXT,
    size_bytes INTEGER,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_case_documents_case ON case_documents (case_id, created_at);

CREATE TABLE IF NOT EXISTS case_land_parcels (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    parcel_ref TEXT NOT NULL,
    address TEXT,
    area_hectares REAL,
    zoning TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_case_land_parcels_case ON case_land_parcels (case_id, created_at);
"#;
