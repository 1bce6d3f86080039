//! EGA importer.
//!
//! Walks every dataset visible to the configured account and emits one
//! observation per file, with the dataset as the analysis.

mod client;

pub use client::EgaClient;

use async_trait::async_trait;
use reqwest::Client;
use repoindex_shared::{
    EgaConfig, EgaCredentials, FileCopy, FileObservation, RepositorySource, Result, servers::EGA,
};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::SourceImporter;
use crate::http::file_format;

/// Importer for the EGA access API.
pub struct EgaImporter {
    client: Client,
    config: EgaConfig,
    credentials: Option<EgaCredentials>,
}

impl EgaImporter {
    /// Credentials are read from the configured env vars when the import runs.
    pub fn new(client: Client, config: EgaConfig) -> Self {
        Self {
            client,
            config,
            credentials: None,
        }
    }

    /// Use explicit credentials instead of the environment.
    pub fn with_credentials(mut self, credentials: EgaCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn parse_file(&self, dataset_id: &str, record: &Value) -> Option<FileObservation> {
        let field = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let Some(file_id) = field("fileID") else {
            warn!(dataset_id, "file record without fileID");
            return None;
        };
        // The name is part of the natural key; without it files would collide.
        let Some(file_name) = field("fileName") else {
            warn!(dataset_id, %file_id, "file record without fileName");
            return None;
        };
        let size = match record.get("fileSize") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        let md5sum = field("fileMD5").map(|s| s.to_ascii_lowercase());

        let base = self.config.base_url.trim_end_matches('/');
        Some(FileObservation {
            source: RepositorySource::Ega,
            handle: file_id.clone(),
            object_id: None,
            analysis_id: dataset_id.to_string(),
            file_name: file_name.clone(),
            md5sum: md5sum.clone(),
            size,
            analyte_code: None,
            data_type: None,
            donors: Vec::new(),
            copies: vec![FileCopy {
                repo_code: EGA.to_string(),
                url: format!("{base}/files/{file_id}"),
                file_format: file_format(&file_name),
                last_modified: None,
                size,
                md5sum,
            }],
        })
    }
}

#[async_trait]
impl SourceImporter for EgaImporter {
    fn source(&self) -> RepositorySource {
        RepositorySource::Ega
    }

    #[instrument(skip_all, fields(source = "ega"))]
    async fn read_files(&self) -> Result<Vec<FileObservation>> {
        let credentials = match &self.credentials {
            Some(credentials) => credentials.clone(),
            None => self.config.credentials()?,
        };
        let ega = EgaClient::new(self.client.clone(), &self.config.base_url, credentials);

        let datasets = ega.dataset_ids().await?;
        info!(datasets = datasets.len(), "reading EGA datasets");

        let mut files = Vec::new();
        for dataset_id in &datasets {
            let records = ega.files(dataset_id).await?;
            files.extend(
                records
                    .iter()
                    .filter_map(|record| self.parse_file(dataset_id, record)),
            );
        }
        Ok(files)
    }
}
