//! Shared types, error model, identity and configuration for repoindex.
//!
//! This crate is the foundation depended on by all other repoindex crates.
//! It provides:
//! - [`RepoIndexError`]: the unified error type
//! - Domain types ([`FileObservation`], [`RepositoryFile`], [`Donor`], [`FileCopy`])
//! - The repository server registry ([`servers`])
//! - Deterministic identifiers ([`resolve_id`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod identity;
pub mod servers;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CghubConfig, DefaultsConfig, EgaConfig, EgaCredentials, IdentifierConfig,
    NotifyConfig, ObjectStoreConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_config,
};
pub use error::{RepoIndexError, Result};
pub use identity::{ID_NAMESPACE, resolve_id};
pub use servers::{RepositoryKind, RepositoryServer};
pub use types::{
    DNA_SEQ_ANALYTE_CODES, DataType, Donor, FileCopy, FileObservation, RNA_SEQ_ANALYTE_CODES,
    RepositoryFile, RepositorySource,
};
