//! libSQL storage layer for staged observations and published records.
//!
//! The [`Storage`] struct wraps a local libSQL database holding:
//! - `source_files`: per-source staging written by importers
//! - `files`: the published canonical record set
//! - `import_runs`: run history with stats
//!
//! The [`SearchIndex`] is a separate database rebuilt from published records.
//!
//! **Access rules:** one import run is the sole writer. Readers (`status`, `show`)
//! use [`Storage::open_readonly`].

mod index;
mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use repoindex_shared::{FileObservation, RepoIndexError, RepositoryFile, RepositorySource, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub use index::{IndexHit, SearchIndex};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

pub(crate) fn storage_err(e: impl std::fmt::Display) -> RepoIndexError {
    RepoIndexError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RepoIndexError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RepoIndexError::Storage(format!(
                "no repository database at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

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
                        RepoIndexError::Storage(format!(
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
            return Err(RepoIndexError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Source staging
    // -----------------------------------------------------------------------

    /// Replace everything staged for `source` with `files`.
    ///
    /// Runs in one transaction: a failed import leaves the previous staging intact.
    pub async fn replace_source_files(
        &self,
        source: RepositorySource,
        files: &[FileObservation],
    ) -> Result<usize> {
        self.check_writable()?;
        if let Some(foreign) = files.iter().find(|f| f.source != source) {
            return Err(RepoIndexError::validation(format!(
                "observation '{}' from {} staged under {source}",
                foreign.handle, foreign.source
            )));
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let outcome = async {
            tx.execute(
                "DELETE FROM source_files WHERE source = ?1",
                params![source.as_str()],
            )
            .await
            .map_err(storage_err)?;

            for file in files {
                let json = serde_json::to_string(file).map_err(storage_err)?;
                tx.execute(
                    "INSERT INTO source_files (source, handle, json, imported_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(source, handle) DO UPDATE SET
                       json = excluded.json,
                       imported_at = excluded.imported_at",
                    params![source.as_str(), file.handle.as_str(), json, now.as_str()],
                )
                .await
                .map_err(storage_err)?;
            }

            // Duplicate handles collapse into one row; report what was stored.
            let mut rows = tx
                .query(
                    "SELECT COUNT(*) FROM source_files WHERE source = ?1",
                    params![source.as_str()],
                )
                .await
                .map_err(storage_err)?;
            let written = match rows.next().await.map_err(storage_err)? {
                Some(row) => row.get::<i64>(0).map_err(storage_err)? as usize,
                None => 0,
            };
            Ok::<_, RepoIndexError>(written)
        }
        .await;

        let written = finish_transaction(tx, outcome).await?;
        tracing::debug!(%source, written, "staged source files");
        Ok(written)
    }

    /// All observations staged for `source`, ordered by handle.
    pub async fn list_source_files(&self, source: RepositorySource) -> Result<Vec<FileObservation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT json FROM source_files WHERE source = ?1 ORDER BY handle",
                params![source.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let json: String = row.get(0).map_err(storage_err)?;
            let file: FileObservation = serde_json::from_str(&json)
                .map_err(|e| RepoIndexError::Storage(format!("corrupt staged file: {e}")))?;
            results.push(file);
        }
        Ok(results)
    }

    /// Number of observations staged for `source`.
    pub async fn count_source_files(&self, source: RepositorySource) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM source_files WHERE source = ?1",
                params![source.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as usize),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Published records
    // -----------------------------------------------------------------------

    /// Overwrite the published record set with `files`.
    pub async fn replace_files(&self, files: &[RepositoryFile]) -> Result<usize> {
        self.check_writable()?;

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let outcome = async {
            tx.execute("DELETE FROM files", params![])
                .await
                .map_err(storage_err)?;

            let mut written = 0;
            for file in files {
                let json = serde_json::to_string(file).map_err(storage_err)?;
                let repo_codes = file.repo_codes().into_iter().collect::<Vec<_>>().join(",");
                written += tx
                    .execute(
                        "INSERT INTO files (id, object_id, file_name, data_type, repo_codes, unresolved, json)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            file.id.as_str(),
                            file.object_id.as_str(),
                            file.file_name.as_str(),
                            file.data_type.as_str(),
                            repo_codes,
                            i64::from(file.unresolved),
                            json,
                        ],
                    )
                    .await
                    .map_err(storage_err)? as usize;
            }
            Ok::<_, RepoIndexError>(written)
        }
        .await;

        finish_transaction(tx, outcome).await
    }

    /// All published records, ordered by id.
    pub async fn list_files(&self) -> Result<Vec<RepositoryFile>> {
        let mut rows = self
            .conn
            .query("SELECT json FROM files ORDER BY id", params![])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let json: String = row.get(0).map_err(storage_err)?;
            results.push(parse_file(&json)?);
        }
        Ok(results)
    }

    /// Get a published record by id.
    pub async fn get_file(&self, id: &str) -> Result<Option<RepositoryFile>> {
        let mut rows = self
            .conn
            .query("SELECT json FROM files WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                let json: String = row.get(0).map_err(storage_err)?;
                Ok(Some(parse_file(&json)?))
            }
            None => Ok(None),
        }
    }

    /// SHA-256 over the published set in id order.
    ///
    /// Equal digests mean byte-identical published records.
    pub async fn files_digest(&self) -> Result<String> {
        let mut rows = self
            .conn
            .query("SELECT json FROM files ORDER BY id", params![])
            .await
            .map_err(storage_err)?;

        let mut hasher = Sha256::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let json: String = row.get(0).map_err(storage_err)?;
            hasher.update(json.as_bytes());
            hasher.update(b"\n");
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    // -----------------------------------------------------------------------
    // Import runs
    // -----------------------------------------------------------------------

    /// Record the start of an import run. Returns the generated run ID.
    pub async fn insert_import_run(&self, sources: &[RepositorySource]) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let sources = sources
            .iter()
            .map(RepositorySource::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.conn
            .execute(
                "INSERT INTO import_runs (id, sources, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), sources, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Update an import run with completion data.
    pub async fn finish_import_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE import_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Stats JSON of the most recently started run, if it finished.
    pub async fn last_import_run(&self) -> Result<Option<(String, Option<String>)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, stats_json FROM import_runs ORDER BY started_at DESC, id DESC LIMIT 1",
                params![],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some((
                row.get::<String>(0).map_err(storage_err)?,
                row.get::<String>(1).ok(),
            ))),
            None => Ok(None),
        }
    }
}

/// Commit on success, roll back on failure.
pub(crate) async fn finish_transaction<T>(
    tx: libsql::Transaction,
    outcome: Result<T>,
) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(storage_err)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

fn parse_file(json: &str) -> Result<RepositoryFile> {
    serde_json::from_str(json)
        .map_err(|e| RepoIndexError::Storage(format!("corrupt published file: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use repoindex_shared::{DataType, Donor, FileCopy};

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ri_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    pub(crate) fn observation(source: RepositorySource, handle: &str) -> FileObservation {
        FileObservation {
            source,
            handle: handle.into(),
            object_id: None,
            analysis_id: format!("analysis-{handle}"),
            file_name: format!("{handle}.bam"),
            md5sum: Some("d41d8cd98f00b204e9800998ecf8427e".into()),
            size: Some(1024),
            analyte_code: Some("D".into()),
            data_type: None,
            donors: vec![],
            copies: vec![FileCopy {
                repo_code: source.as_str().into(),
                url: format!("https://repo.example.org/{handle}"),
                file_format: Some("BAM".into()),
                last_modified: None,
                size: Some(1024),
                md5sum: None,
            }],
        }
    }

    pub(crate) fn published(id: &str, repo_code: &str) -> RepositoryFile {
        RepositoryFile {
            id: id.into(),
            object_id: format!("object-{id}"),
            file_name: format!("{id}.bam"),
            md5sum: None,
            size: Some(10),
            data_type: DataType::DnaSeq,
            copies: vec![FileCopy {
                repo_code: repo_code.into(),
                url: format!("https://repo.example.org/{id}"),
                file_format: None,
                last_modified: None,
                size: None,
                md5sum: None,
            }],
            donors: vec![Donor {
                project_code: "BRCA-US".into(),
                submitted_donor_id: format!("donor-{id}"),
                donor_id: Some(format!("DO-{id}")),
                submitted_specimen_id: None,
                submitted_sample_id: None,
            }],
            unresolved: false,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ri_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn staging_is_source_scoped() {
        let storage = test_storage().await;

        let cghub = vec![
            observation(RepositorySource::Cghub, "b"),
            observation(RepositorySource::Cghub, "a"),
        ];
        let aws = vec![observation(RepositorySource::Aws, "x")];

        assert_eq!(
            storage
                .replace_source_files(RepositorySource::Cghub, &cghub)
                .await
                .expect("stage cghub"),
            2
        );
        storage
            .replace_source_files(RepositorySource::Aws, &aws)
            .await
            .expect("stage aws");

        let listed = storage
            .list_source_files(RepositorySource::Cghub)
            .await
            .expect("list cghub");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].handle, "a");
        assert_eq!(listed[1], cghub[0]);

        // Re-staging one source replaces only that source.
        storage
            .replace_source_files(RepositorySource::Cghub, &cghub[..1])
            .await
            .expect("restage cghub");
        assert_eq!(
            storage.count_source_files(RepositorySource::Cghub).await.unwrap(),
            1
        );
        assert_eq!(
            storage.count_source_files(RepositorySource::Aws).await.unwrap(),
            1
        );
        assert_eq!(
            storage.count_source_files(RepositorySource::Ega).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn duplicate_handles_are_counted_once() {
        let storage = test_storage().await;
        let mut newer = observation(RepositorySource::Ega, "EGAF1");
        newer.size = Some(2048);
        let files = vec![
            observation(RepositorySource::Ega, "EGAF1"),
            observation(RepositorySource::Ega, "EGAF2"),
            newer.clone(),
        ];

        let written = storage
            .replace_source_files(RepositorySource::Ega, &files)
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            storage.count_source_files(RepositorySource::Ega).await.unwrap(),
            written
        );
        let listed = storage.list_source_files(RepositorySource::Ega).await.unwrap();
        assert_eq!(listed[0], newer);
    }

    #[tokio::test]
    async fn readonly_handle_reads_but_never_writes() {
        let tmp = std::env::temp_dir().join(format!("ri_test_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());

        let writer = Storage::open(&tmp).await.unwrap();
        writer
            .replace_files(&[published("f1", "cghub")])
            .await
            .unwrap();
        drop(writer);

        let reader = Storage::open_readonly(&tmp).await.unwrap();
        assert!(reader.get_file("f1").await.unwrap().is_some());
        assert!(reader.replace_files(&[]).await.is_err());
        assert!(
            reader
                .replace_source_files(RepositorySource::Cghub, &[])
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn staging_rejects_foreign_observations() {
        let storage = test_storage().await;
        storage
            .replace_source_files(
                RepositorySource::Cghub,
                &[observation(RepositorySource::Cghub, "keep")],
            )
            .await
            .unwrap();

        let result = storage
            .replace_source_files(
                RepositorySource::Cghub,
                &[observation(RepositorySource::Aws, "x")],
            )
            .await;
        assert!(result.is_err());

        // Rolled back: previous staging survives.
        let listed = storage
            .list_source_files(RepositorySource::Cghub)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].handle, "keep");
    }

    #[tokio::test]
    async fn published_set_is_overwritten() {
        let storage = test_storage().await;

        storage
            .replace_files(&[published("f1", "cghub"), published("f2", "ega")])
            .await
            .expect("write");
        assert_eq!(storage.list_files().await.unwrap().len(), 2);

        storage
            .replace_files(&[published("f3", "cghub")])
            .await
            .expect("overwrite");
        let files = storage.list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "f3");

        let found = storage.get_file("f3").await.unwrap().expect("f3");
        assert_eq!(found, published("f3", "cghub"));
        assert!(storage.get_file("f1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn digest_tracks_content() {
        let storage = test_storage().await;
        storage
            .replace_files(&[published("f1", "cghub")])
            .await
            .unwrap();
        let first = storage.files_digest().await.unwrap();

        storage
            .replace_files(&[published("f1", "cghub")])
            .await
            .unwrap();
        assert_eq!(storage.files_digest().await.unwrap(), first);

        storage
            .replace_files(&[published("f1", "ega")])
            .await
            .unwrap();
        assert_ne!(storage.files_digest().await.unwrap(), first);
    }

    #[tokio::test]
    async fn import_run_lifecycle() {
        let storage = test_storage().await;
        let run_id = storage
            .insert_import_run(&[RepositorySource::Cghub, RepositorySource::Aws])
            .await
            .expect("insert run");
        assert!(!run_id.is_empty());

        storage
            .finish_import_run(&run_id, r#"{"files": 10}"#)
            .await
            .expect("finish run");

        let (id, stats) = storage.last_import_run().await.unwrap().expect("run");
        assert_eq!(id, run_id);
        assert!(stats.unwrap().contains("10"));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("ri_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.replace_files(&[published("f1", "cghub")]).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_files().await.unwrap().len(), 1);
        let result = ro.replace_files(&[]).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
