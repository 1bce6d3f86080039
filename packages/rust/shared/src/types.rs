//! Core domain types for repository file aggregation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RepoIndexError;

// ---------------------------------------------------------------------------
// RepositorySource
// ---------------------------------------------------------------------------

/// A known upstream source, listed in import activation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositorySource {
    Cghub,
    Ega,
    Aws,
    Collab,
}

impl RepositorySource {
    /// All sources in activation order.
    pub const ALL: [RepositorySource; 4] = [Self::Cghub, Self::Ega, Self::Aws, Self::Collab];

    /// Stable lowercase name used in config, storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cghub => "cghub",
            Self::Ega => "ega",
            Self::Aws => "aws",
            Self::Collab => "collab",
        }
    }

    /// Position in the activation order.
    pub fn ordinal(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl std::fmt::Display for RepositorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for RepositorySource {
    type Err = RepoIndexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RepoIndexError::validation(format!("unknown source '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// DataType
// ---------------------------------------------------------------------------

/// Analyte codes that indicate DNA sequencing.
pub const DNA_SEQ_ANALYTE_CODES: [&str; 4] = ["D", "G", "W", "X"];

/// Analyte codes that indicate RNA sequencing.
pub const RNA_SEQ_ANALYTE_CODES: [&str; 3] = ["R", "T", "H"];

/// Data type classification of a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "DNA-Seq")]
    DnaSeq,
    #[serde(rename = "RNA-Seq")]
    RnaSeq,
    #[default]
    #[serde(rename = "Unclassified")]
    Unclassified,
}

impl DataType {
    /// Classify an analyte code. Unknown codes yield `None`.
    pub fn from_analyte_code(code: &str) -> Option<Self> {
        let code = code.trim();
        if DNA_SEQ_ANALYTE_CODES.contains(&code) {
            Some(Self::DnaSeq)
        } else if RNA_SEQ_ANALYTE_CODES.contains(&code) {
            Some(Self::RnaSeq)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DnaSeq => "DNA-Seq",
            Self::RnaSeq => "RNA-Seq",
            Self::Unclassified => "Unclassified",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Donor
// ---------------------------------------------------------------------------

/// Study subject associated with a file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Donor {
    /// Project the donor was submitted under (e.g. `BRCA-US`).
    pub project_code: String,
    /// Donor id as submitted to the source repository.
    pub submitted_donor_id: String,
    /// Identifier assigned by the identifier service, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_specimen_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_sample_id: Option<String>,
}

impl Donor {
    /// Whether the identifier service has assigned an id.
    pub fn has_donor_id(&self) -> bool {
        self.donor_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

// ---------------------------------------------------------------------------
// FileCopy
// ---------------------------------------------------------------------------

/// A repository's physical storage location for a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCopy {
    /// Repository code (see [`crate::servers`]).
    pub repo_code: String,
    /// URL or path of the file within the repository.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
}

// ---------------------------------------------------------------------------
// FileObservation
// ---------------------------------------------------------------------------

/// One source's normalized view of one physical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileObservation {
    /// Source that produced this observation.
    pub source: RepositorySource,
    /// Repo-provided unique handle. Only meaningful within `source`.
    pub handle: String,
    /// Cross-source object identifier, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// Analysis (submission bundle) the file belongs to.
    #[serde(default)]
    pub analysis_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Source analyte code, classified into a [`DataType`] on combine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyte_code: Option<String>,
    /// Data type already resolved by the source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default)]
    pub donors: Vec<Donor>,
    #[serde(default)]
    pub copies: Vec<FileCopy>,
}

impl FileObservation {
    /// Data type signal carried by this observation, if any.
    pub fn classify(&self) -> Option<DataType> {
        self.data_type
            .filter(|dt| *dt != DataType::Unclassified)
            .or_else(|| {
                self.analyte_code
                    .as_deref()
                    .and_then(DataType::from_analyte_code)
            })
    }
}

// ---------------------------------------------------------------------------
// RepositoryFile
// ---------------------------------------------------------------------------

/// Canonical record: one physical file merged across all sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    /// Deterministic identifier.
    pub id: String,
    /// Natural key the record was grouped by.
    pub object_id: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub data_type: DataType,
    pub copies: Vec<FileCopy>,
    pub donors: Vec<Donor>,
    /// True when no donor carries a resolved identifier.
    pub unresolved: bool,
}

impl RepositoryFile {
    /// Distinct repository codes across this file's copies.
    pub fn repo_codes(&self) -> BTreeSet<&str> {
        self.copies.iter().map(|c| c.repo_code.as_str()).collect()
    }

    /// Whether any donor has a resolved identifier.
    pub fn has_donor_id(&self) -> bool {
        self.donors.iter().any(Donor::has_donor_id)
    }
}
