//! SQL migration definitions for the repository database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: source_files, files",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Per-source staging area written by importers, read by the collector
CREATE TABLE IF NOT EXISTS source_files (
    source      TEXT NOT NULL,
    handle      TEXT NOT NULL,
    json        TEXT NOT NULL,
    imported_at TEXT NOT NULL,
    PRIMARY KEY (source, handle)
);

CREATE INDEX IF NOT EXISTS idx_source_files_source ON source_files(source);

-- Published canonical records
CREATE TABLE IF NOT EXISTS files (
    id         TEXT PRIMARY KEY,
    object_id  TEXT NOT NULL,
    file_name  TEXT NOT NULL,
    data_type  TEXT NOT NULL,
    repo_codes TEXT NOT NULL,
    unresolved INTEGER NOT NULL,
    json       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_object_id ON files(object_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Import run history",
            sql: r#"
CREATE TABLE IF NOT EXISTS import_runs (
    id          TEXT PRIMARY KEY,
    sources     TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
