//! Per-repository source importers.
//!
//! This crate provides:
//! - [`SourceImporter`]: the contract every source implements
//! - [`CghubImporter`], [`EgaImporter`], [`ObjectStoreImporter`]: bundled sources
//! - [`DonorIdResolver`]: identifier service client shared by importers
//! - [`create_importers`]: the fixed, ordered importer list

pub mod cghub;
pub mod donor;
pub mod ega;
pub mod http;
pub mod object_store;

use std::sync::Arc;

use async_trait::async_trait;
use repoindex_shared::{AppConfig, FileObservation, RepositorySource, Result};
use repoindex_storage::Storage;
use tracing::info;

pub use cghub::CghubImporter;
pub use donor::DonorIdResolver;
pub use ega::{EgaClient, EgaImporter};
pub use object_store::ObjectStoreImporter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One upstream repository.
///
/// Implementations fetch and normalize; [`SourceImporter::execute`] stages the
/// result under the importer's source. Per-record anomalies are skipped with a
/// warning; only unrecoverable failures are returned as errors.
#[async_trait]
pub trait SourceImporter: Send + Sync {
    /// The source this importer stages files for.
    fn source(&self) -> RepositorySource;

    /// Fetch and normalize every file currently available from the source.
    async fn read_files(&self) -> Result<Vec<FileObservation>>;

    /// Read the source and replace its staged observations.
    async fn execute(&self, storage: &Storage) -> Result<usize> {
        let files = self.read_files().await?;
        let written = storage.replace_source_files(self.source(), &files).await?;
        info!(source = %self.source(), files = written, "staged source files");
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Build every bundled importer, in activation order.
///
/// The orchestrator filters this list by the active sources; the order here is
/// the order importers run and failures are reported in.
pub fn create_importers(config: &AppConfig) -> Result<Vec<Box<dyn SourceImporter>>> {
    let client = http::build_client(config.defaults.timeout_secs)?;
    let resolver = Arc::new(DonorIdResolver::new(
        client.clone(),
        config.identifier.url.as_deref(),
    )?);

    Ok(vec![
        Box::new(CghubImporter::new(
            client.clone(),
            config.cghub.clone(),
            resolver,
        )),
        Box::new(EgaImporter::new(client.clone(), config.ega.clone())),
        Box::new(ObjectStoreImporter::new(
            client.clone(),
            RepositorySource::Aws,
            config.aws.listing_url.clone(),
        )),
        Box::new(ObjectStoreImporter::new(
            client,
            RepositorySource::Collab,
            config.collab.listing_url.clone(),
        )),
    ])
}
