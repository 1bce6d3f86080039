//! Reads staged observations back for the active sources.

use repoindex_shared::{FileObservation, RepositorySource, Result};
use repoindex_storage::Storage;
use tracing::debug;

/// Observations staged by one source.
#[derive(Debug, Clone)]
pub struct SourceFiles {
    pub source: RepositorySource,
    pub files: Vec<FileObservation>,
}

/// Collects staged observations. Never touches the network.
pub struct FileCollector {
    sources: Vec<RepositorySource>,
}

impl FileCollector {
    pub fn new(sources: &[RepositorySource]) -> Self {
        Self {
            sources: sources.to_vec(),
        }
    }

    pub async fn collect(&self, storage: &Storage) -> Result<Vec<SourceFiles>> {
        let mut collected = Vec::with_capacity(self.sources.len());
        for &source in &self.sources {
            let files = storage.list_source_files(source).await?;
            debug!(%source, files = files.len(), "collected staged files");
            collected.push(SourceFiles { source, files });
        }
        Ok(collected)
    }
}
