//! Import orchestration: stage sources, then combine, filter, publish and index.
//!
//! Source failures are isolated; a failure in any later stage aborts the
//! stages after it. Work committed before a failure stays committed, the report
//! is always sent, and the run still returns an error if anything failed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use repoindex_shared::{AppConfig, RepoIndexError, RepositoryFile, RepositorySource, Result};
use repoindex_sources::{SourceImporter, create_importers, http::build_client};
use repoindex_storage::{SearchIndex, Storage};
use tracing::{error, info, instrument, warn};

use crate::collector::FileCollector;
use crate::combiner::combine_files;
use crate::filter::FileFilter;
use crate::notify::{Notifier, notifier_from_config};

/// Subject prefix of the completion report.
const REPORT_SUBJECT: &str = "Repository Importer";

// ---------------------------------------------------------------------------
// Stages and failures
// ---------------------------------------------------------------------------

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    WriteSourceFiles,
    Collect,
    Combine,
    Filter,
    Write,
    Index,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::WriteSourceFiles => "WriteSourceFiles",
            Self::Collect => "Collect",
            Self::Combine => "Combine",
            Self::Filter => "Filter",
            Self::Write => "Write",
            Self::Index => "Index",
        };
        f.write_str(name)
    }
}

/// A recorded failure. `source` is set for per-source failures only.
#[derive(Debug, Clone)]
pub struct ImportFailure {
    pub stage: Stage,
    pub source: Option<RepositorySource>,
    pub message: String,
}

impl ImportFailure {
    fn stage(stage: Stage, error: RepoIndexError) -> Self {
        Self {
            stage,
            source: None,
            message: error.to_string(),
        }
    }

    fn source(source: RepositorySource, error: RepoIndexError) -> Self {
        Self {
            stage: Stage::WriteSourceFiles,
            source: Some(source),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.source {
            Some(source) => write!(f, "[{}] {source}: {}", self.stage, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub run_id: Option<String>,
    pub elapsed: Duration,
    pub failures: Vec<ImportFailure>,
    /// Staged observation counts per successful source.
    pub staged: Vec<(RepositorySource, usize)>,
    pub combined: usize,
    pub published: usize,
    pub indexed: usize,
    /// Digest of the published set after the write stage.
    pub digest: Option<String>,
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn subject(&self) -> String {
        let status = if self.is_success() { "SUCCESS" } else { "ERROR" };
        format!("{REPORT_SUBJECT} - {status}")
    }

    pub fn body(&self) -> String {
        let failures: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        format!("Finished in {:.2?}\n\n{}", self.elapsed, failures.join("\n"))
    }

    fn stats_json(&self) -> String {
        let staged: serde_json::Map<String, serde_json::Value> = self
            .staged
            .iter()
            .map(|(source, n)| (source.to_string(), serde_json::json!(n)))
            .collect();
        serde_json::json!({
            "elapsed_ms": self.elapsed.as_millis() as u64,
            "staged": staged,
            "combined": self.combined,
            "published": self.published,
            "indexed": self.indexed,
            "digest": self.digest,
            "failures": self.failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
        })
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Context and progress
// ---------------------------------------------------------------------------

/// Runtime settings of one run.
#[derive(Debug, Clone)]
pub struct ImportContext {
    /// Active sources, in activation order.
    pub sources: Vec<RepositorySource>,
    pub db_path: PathBuf,
    pub index_path: PathBuf,
    pub require_donor_ids: bool,
}

impl ImportContext {
    /// Build the context from config. `sources` overrides the configured set.
    pub fn from_config(config: &AppConfig, sources: Option<&[RepositorySource]>) -> Self {
        let requested = sources.unwrap_or(config.defaults.sources.as_slice());
        let sources = RepositorySource::ALL
            .into_iter()
            .filter(|s| requested.contains(s))
            .collect();

        Self {
            sources,
            db_path: PathBuf::from(&config.defaults.db_path),
            index_path: PathBuf::from(&config.defaults.index_path),
            require_donor_ids: config.defaults.require_donor_ids,
        }
    }

    pub fn is_active(&self, source: RepositorySource) -> bool {
        self.sources.contains(&source)
    }
}

/// Progress callback for reporting import status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a stage.
    fn stage(&self, stage: Stage);
    /// Called after each source; `None` when it failed.
    fn source_finished(&self, source: RepositorySource, staged: Option<usize>);
    /// Called once the report is final.
    fn done(&self, report: &ImportReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn source_finished(&self, _source: RepositorySource, _staged: Option<usize>) {}
    fn done(&self, _report: &ImportReport) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the import pipeline.
pub struct RepositoryImporter {
    context: ImportContext,
    importers: Vec<Box<dyn SourceImporter>>,
    notifier: Box<dyn Notifier>,
}

impl RepositoryImporter {
    /// Importer with the bundled sources and the configured notifier.
    pub fn new(config: &AppConfig, context: ImportContext) -> Result<Self> {
        let importers = create_importers(config)?;
        let notifier = notifier_from_config(config, build_client(config.defaults.timeout_secs)?);
        Ok(Self::with_importers(context, importers, notifier))
    }

    pub fn with_importers(
        context: ImportContext,
        importers: Vec<Box<dyn SourceImporter>>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            context,
            importers,
            notifier,
        }
    }

    pub fn context(&self) -> &ImportContext {
        &self.context
    }

    /// Run every stage and send the report.
    ///
    /// Returns `Err(RepoIndexError::Import)` if any failure was recorded.
    #[instrument(skip_all, fields(sources = ?self.context.sources))]
    pub async fn execute(&self, progress: &dyn ProgressReporter) -> Result<ImportReport> {
        let start = Instant::now();
        let mut report = ImportReport::default();
        info!("starting repository import");

        report.run_id = self.start_run().await;

        self.write_source_files(&mut report, progress).await;
        if let Err(failure) = self.run_pipeline(&mut report, progress).await {
            error!(stage = %failure.stage, error = %failure.message, "import stage failed, aborting");
            report.failures.push(failure);
        }

        report.elapsed = start.elapsed();
        self.finish_run(&report).await;

        if let Err(e) = self.notifier.send(&report.subject(), &report.body()).await {
            warn!(error = %e, "failed to send import report");
        }
        progress.done(&report);

        if report.is_success() {
            info!(
                published = report.published,
                elapsed = ?report.elapsed,
                "repository import finished"
            );
            return Ok(report);
        }

        for failure in &report.failures {
            error!(%failure, "import failure");
        }
        Err(RepoIndexError::Import {
            failures: report.failures.len(),
            summary: report
                .failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        })
    }

    /// Stage 1: each active source replaces its own staged observations.
    async fn write_source_files(&self, report: &mut ImportReport, progress: &dyn ProgressReporter) {
        progress.stage(Stage::WriteSourceFiles);

        let storage = match Storage::open(&self.context.db_path).await {
            Ok(storage) => storage,
            Err(e) => {
                report.failures.push(ImportFailure::stage(Stage::WriteSourceFiles, e));
                return;
            }
        };

        let mut importers: Vec<&dyn SourceImporter> = self
            .importers
            .iter()
            .map(|importer| importer.as_ref())
            .filter(|i| self.context.is_active(i.source()))
            .collect();
        importers.sort_by_key(|i| i.source().ordinal());

        for importer in importers {
            let source = importer.source();
            info!(%source, "importing source");
            match importer.execute(&storage).await {
                Ok(staged) => {
                    report.staged.push((source, staged));
                    progress.source_finished(source, Some(staged));
                }
                Err(e) => {
                    error!(%source, error = %e, "source import failed");
                    report.failures.push(ImportFailure::source(source, e));
                    progress.source_finished(source, None);
                }
            }
        }
    }

    /// Stages 2-6. The first failure aborts the rest.
    async fn run_pipeline(
        &self,
        report: &mut ImportReport,
        progress: &dyn ProgressReporter,
    ) -> std::result::Result<(), ImportFailure> {
        progress.stage(Stage::Collect);
        let collected = {
            let storage = Storage::open(&self.context.db_path)
                .await
                .map_err(|e| ImportFailure::stage(Stage::Collect, e))?;
            FileCollector::new(&self.context.sources)
                .collect(&storage)
                .await
                .map_err(|e| ImportFailure::stage(Stage::Collect, e))?
        };

        progress.stage(Stage::Combine);
        let combined = combine_files(&collected);
        report.combined = combined.len();
        info!(combined = combined.len(), "combined files");

        progress.stage(Stage::Filter);
        let files = FileFilter::new(self.context.require_donor_ids).filter(combined);

        progress.stage(Stage::Write);
        let (published, digest) = self
            .write_files(&files)
            .await
            .map_err(|e| ImportFailure::stage(Stage::Write, e))?;
        report.published = published;
        report.digest = Some(digest);

        progress.stage(Stage::Index);
        report.indexed = self
            .index_files()
            .await
            .map_err(|e| ImportFailure::stage(Stage::Index, e))?;

        Ok(())
    }

    async fn write_files(&self, files: &[RepositoryFile]) -> Result<(usize, String)> {
        let storage = Storage::open(&self.context.db_path).await?;
        let published = storage.replace_files(files).await?;
        let digest = storage.files_digest().await?;
        info!(published, %digest, "published files");
        Ok((published, digest))
    }

    /// The index is rebuilt from what was persisted, not from memory.
    async fn index_files(&self) -> Result<usize> {
        let files = Storage::open(&self.context.db_path).await?.list_files().await?;
        let index = SearchIndex::open(&self.context.index_path).await?;
        index.rebuild(&files).await
    }

    async fn start_run(&self) -> Option<String> {
        let outcome = async {
            let storage = Storage::open(&self.context.db_path).await?;
            storage.insert_import_run(&self.context.sources).await
        }
        .await;

        match outcome {
            Ok(run_id) => Some(run_id),
            Err(e) => {
                warn!(error = %e, "could not record import run");
                None
            }
        }
    }

    async fn finish_run(&self, report: &ImportReport) {
        let Some(run_id) = &report.run_id else {
            return;
        };
        let outcome = async {
            let storage = Storage::open(&self.context.db_path).await?;
            storage.finish_import_run(run_id, &report.stats_json()).await
        }
        .await;

        if let Err(e) = outcome {
            warn!(%run_id, error = %e, "could not record import run stats");
        }
    }
}
