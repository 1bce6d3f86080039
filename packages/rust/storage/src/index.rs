//! Full-text search index over published records.
//!
//! Lives in its own database so it can be rebuilt wholesale (or deleted)
//! without touching the repository database.

use std::path::Path;

use libsql::{Connection, Database, params};
use repoindex_shared::{RepoIndexError, RepositoryFile, Result};

use crate::{finish_transaction, storage_err};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS file_docs (
    id   TEXT PRIMARY KEY,
    json TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS file_text USING fts5(
    id UNINDEXED,
    file_name,
    object_id,
    repo_codes,
    project_codes,
    donor_ids,
    data_type
);
"#;

/// A search hit.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    pub file_name: String,
    /// FTS5 rank score (lower is better).
    pub score: f64,
}

/// Search index handle.
pub struct SearchIndex {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl SearchIndex {
    /// Open or create the index database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RepoIndexError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| RepoIndexError::Storage(format!("index schema failed: {e}")))?;

        Ok(Self { db, conn })
    }

    /// Replace the whole index with `files`.
    pub async fn rebuild(&self, files: &[RepositoryFile]) -> Result<usize> {
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let outcome = async {
            tx.execute("DELETE FROM file_docs", params![])
                .await
                .map_err(storage_err)?;
            tx.execute("DELETE FROM file_text", params![])
                .await
                .map_err(storage_err)?;

            for file in files {
                let json = serde_json::to_string(file).map_err(storage_err)?;
                tx.execute(
                    "INSERT INTO file_docs (id, json) VALUES (?1, ?2)",
                    params![file.id.as_str(), json],
                )
                .await
                .map_err(storage_err)?;

                let doc = IndexDocument::from(file);
                tx.execute(
                    "INSERT INTO file_text (id, file_name, object_id, repo_codes, project_codes, donor_ids, data_type)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        file.id.as_str(),
                        file.file_name.as_str(),
                        file.object_id.as_str(),
                        doc.repo_codes,
                        doc.project_codes,
                        doc.donor_ids,
                        file.data_type.as_str(),
                    ],
                )
                .await
                .map_err(storage_err)?;
            }
            Ok::<_, RepoIndexError>(files.len())
        }
        .await;

        let indexed = finish_transaction(tx, outcome).await?;
        tracing::info!(indexed, "search index rebuilt");
        Ok(indexed)
    }

    /// Number of indexed documents.
    pub async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM file_docs", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as usize),
            None => Ok(0),
        }
    }

    /// Full-text search. Every whitespace-separated term must match.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<IndexHit>> {
        let Some(expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut rows = self
            .conn
            .query(
                "SELECT id, file_name, rank
                 FROM file_text
                 WHERE file_text MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
                params![expr, limit],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(IndexHit {
                id: row.get::<String>(0).map_err(storage_err)?,
                file_name: row.get::<String>(1).unwrap_or_default(),
                score: row.get::<f64>(2).unwrap_or(0.0),
            });
        }
        Ok(results)
    }
}

/// Space-joined text columns derived from a record.
struct IndexDocument {
    repo_codes: String,
    project_codes: String,
    donor_ids: String,
}

impl From<&RepositoryFile> for IndexDocument {
    fn from(file: &RepositoryFile) -> Self {
        let mut projects: Vec<&str> = file.donors.iter().map(|d| d.project_code.as_str()).collect();
        projects.sort_unstable();
        projects.dedup();

        let donor_ids: Vec<&str> = file
            .donors
            .iter()
            .flat_map(|d| {
                std::iter::once(d.submitted_donor_id.as_str()).chain(d.donor_id.as_deref())
            })
            .collect();

        Self {
            repo_codes: file.repo_codes().into_iter().collect::<Vec<_>>().join(" "),
            project_codes: projects.join(" "),
            donor_ids: donor_ids.join(" "),
        }
    }
}

/// Quote each term so FTS5 treats punctuation (`-`, `:`) as token separators
/// rather than query syntax.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::published;
    use uuid::Uuid;

    async fn test_index() -> SearchIndex {
        let tmp = std::env::temp_dir().join(format!("ri_index_{}.db", Uuid::now_v7()));
        SearchIndex::open(&tmp).await.expect("open index")
    }

    #[test]
    fn query_terms_are_quoted() {
        assert_eq!(fts_query("BRCA-US bam").as_deref(), Some("\"BRCA-US\" \"bam\""));
        assert_eq!(fts_query("a\"b").as_deref(), Some("\"a\"\"b\""));
        assert!(fts_query("   ").is_none());
    }

    #[tokio::test]
    async fn rebuild_and_search() {
        let index = test_index().await;
        index
            .rebuild(&[published("f1", "cghub"), published("f2", "aws-virginia")])
            .await
            .expect("rebuild");
        assert_eq!(index.count().await.unwrap(), 2);

        let hits = index.search("aws-virginia", 10).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "f2");

        let hits = index.search("BRCA-US", 10).await.expect("search project");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score <= hits[1].score);

        let hits = index.search("DO-f1", 10).await.expect("search donor");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "f1.bam");
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_documents() {
        let index = test_index().await;
        index.rebuild(&[published("f1", "cghub")]).await.unwrap();
        index.rebuild(&[published("f2", "ega")]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index.search("cghub", 10).await.unwrap().is_empty());
        assert_eq!(index.search("ega", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let index = test_index().await;
        index.rebuild(&[published("f1", "cghub")]).await.unwrap();
        assert!(index.search("", 10).await.unwrap().is_empty());
    }
}
