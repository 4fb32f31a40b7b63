//! SQL schema for the docmon SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schemas (
    schema_id   TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    definition  TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL
);

-- path_id is assigned in declaration order and orders sibling paths.
CREATE TABLE IF NOT EXISTS paths (
    path_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    schema_id  TEXT NOT NULL REFERENCES schemas(schema_id),
    path       TEXT NOT NULL,
    identity   TEXT,             -- name of the identity attribute, if any
    value_type TEXT,             -- leaf text type, NULL for no text
    UNIQUE (schema_id, path)
);

CREATE TABLE IF NOT EXISTS path_attributes (
    path_id    INTEGER NOT NULL REFERENCES paths(path_id),
    position   INTEGER NOT NULL,
    name       TEXT NOT NULL,
    value_type TEXT NOT NULL,
    PRIMARY KEY (path_id, name)
);

CREATE TABLE IF NOT EXISTS documents (
    document_id     TEXT PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE,
    schema_id       TEXT NOT NULL REFERENCES schemas(schema_id),
    url             TEXT NOT NULL,
    update_period   INTEGER NOT NULL,
    snapshot_period INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    last_update     TEXT
);

-- Events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
-- recorded_at is fixed-width RFC 3339 with microseconds, so text order is
-- time order.
CREATE TABLE IF NOT EXISTS events (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id     INTEGER NOT NULL REFERENCES paths(path_id),
    document_id TEXT NOT NULL REFERENCES documents(document_id),
    recorded_at TEXT NOT NULL,
    kind        TEXT NOT NULL,   -- 'snapshot' | 'addition' | 'change' | 'removal'
    parent      TEXT NOT NULL,
    value       TEXT,
    attrs       TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS events_lookup_idx
    ON events(path_id, document_id, recorded_at);
CREATE INDEX IF NOT EXISTS events_snapshot_idx
    ON events(path_id, document_id, kind, recorded_at);
CREATE INDEX IF NOT EXISTS events_document_idx
    ON events(document_id, recorded_at);

PRAGMA user_version = 1;
";
