//! Import pipeline for repoindex.
//!
//! This crate ties the source importers, staging storage and search index
//! together into one run ([`RepositoryImporter`]): stage every source, collect
//! the staged observations, combine them into canonical files, filter, publish
//! and index.

pub mod collector;
pub mod combiner;
pub mod filter;
pub mod importer;
pub mod notify;

pub use collector::{FileCollector, SourceFiles};
pub use combiner::combine_files;
pub use filter::FileFilter;
pub use importer::{
    ImportContext, ImportFailure, ImportReport, ProgressReporter, RepositoryImporter,
    SilentProgress, Stage,
};
pub use notify::{LogNotifier, Notifier, WebhookNotifier, notifier_from_config};
