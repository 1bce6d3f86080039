//! CGHub importer.
//!
//! Reads live TCGA analysis details per disease code from the CGHub metadata
//! service. Each file of each analysis becomes one observation with a single
//! `cghub` copy; the archive does not know object ids, so the combiner derives
//! them from analysis id and file name.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use repoindex_shared::{
    CghubConfig, Donor, FileCopy, FileObservation, RepoIndexError, RepositorySource, Result,
    servers::CGHUB,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::SourceImporter;
use crate::donor::DonorIdResolver;
use crate::http::{file_format, get_json};

/// dbGaP study accession for TCGA.
pub const TCGA_STUDY: &str = "phs000178";

/// Project codes are the disease abbreviation with this suffix.
const PROJECT_SUFFIX: &str = "-US";

/// Importer for the CGHub analysis-detail service.
pub struct CghubImporter {
    client: Client,
    config: CghubConfig,
    resolver: Arc<DonorIdResolver>,
}

impl CghubImporter {
    pub fn new(client: Client, config: CghubConfig, resolver: Arc<DonorIdResolver>) -> Self {
        Self {
            client,
            config,
            resolver,
        }
    }

    fn detail_url(&self, disease_code: &str) -> Result<Url> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/cghub/metadata/analysisDetail"))
            .map_err(|e| RepoIndexError::config(format!("cghub.base_url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("study", TCGA_STUDY)
            .append_pair("disease_abbr", disease_code)
            .append_pair("state", "live");
        Ok(url)
    }

    fn download_url(&self, analysis_id: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/cghub/data/analysis/download/{analysis_id}")
    }

    async fn read_disease(&self, disease_code: &str) -> Result<Vec<FileObservation>> {
        let url = self.detail_url(disease_code)?;
        info!(disease_code, %url, "reading analysis details");

        let details: Value = get_json(&self.client, url.as_str()).await?;
        let results = details
            .pointer("/result_set/results")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RepoIndexError::parse(format!("{url}: missing result_set.results"))
            })?;

        let mut files = Vec::new();
        for result in results {
            match self.parse_analysis(result) {
                Ok(mut observations) => {
                    for obs in &mut observations {
                        self.resolver.resolve_donors(&mut obs.donors).await;
                    }
                    files.extend(observations);
                }
                Err(e) => warn!(disease_code, error = %e, "skipping analysis"),
            }
        }

        debug!(disease_code, files = files.len(), "parsed analysis details");
        Ok(files)
    }

    fn parse_analysis(&self, result: &Value) -> Result<Vec<FileObservation>> {
        let analysis_id = text(result, "analysis_id")
            .ok_or_else(|| RepoIndexError::parse("analysis without analysis_id"))?;

        let donors = match (text(result, "disease_abbr"), text(result, "participant_id")) {
            (Some(disease), Some(participant)) => vec![Donor {
                project_code: format!("{disease}{PROJECT_SUFFIX}"),
                submitted_donor_id: participant,
                donor_id: None,
                submitted_specimen_id: text(result, "sample_id"),
                submitted_sample_id: text(result, "aliquot_id"),
            }],
            _ => {
                warn!(%analysis_id, "analysis without disease or participant");
                Vec::new()
            }
        };

        let last_modified = text(result, "last_modified").and_then(|raw| {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(e) => {
                    warn!(%analysis_id, %raw, error = %e, "unparseable last_modified");
                    None
                }
            }
        });

        let analyte_code = text(result, "analyte_code");
        let url = self.download_url(&analysis_id);

        let entries = result
            .get("files")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut observations = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(file_name) = text(entry, "filename") else {
                warn!(%analysis_id, "file entry without filename");
                continue;
            };
            let size = size(entry.get("filesize"));
            let md5sum = checksum(entry.get("checksum"));

            observations.push(FileObservation {
                source: RepositorySource::Cghub,
                handle: format!("{analysis_id}/{file_name}"),
                object_id: None,
                analysis_id: analysis_id.clone(),
                file_name: file_name.clone(),
                md5sum: md5sum.clone(),
                size,
                analyte_code: analyte_code.clone(),
                data_type: None,
                donors: donors.clone(),
                copies: vec![FileCopy {
                    repo_code: CGHUB.to_string(),
                    url: url.clone(),
                    file_format: file_format(&file_name),
                    last_modified,
                    size,
                    md5sum,
                }],
            });
        }
        Ok(observations)
    }
}

#[async_trait]
impl SourceImporter for CghubImporter {
    fn source(&self) -> RepositorySource {
        RepositorySource::Cghub
    }

    #[instrument(skip_all, fields(source = "cghub"))]
    async fn read_files(&self) -> Result<Vec<FileObservation>> {
        let mut files = Vec::new();
        for disease_code in &self.config.disease_codes {
            files.extend(self.read_disease(disease_code).await?);
        }
        Ok(files)
    }
}

/// Non-empty string field.
fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Sizes arrive as numbers or numeric strings.
fn size(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Checksums arrive as a bare string or as `{"#text": ..}`.
fn checksum(value: Option<&Value>) -> Option<String> {
    let raw = match value? {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("#text")?.as_str()?,
        _ => return None,
    };
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use repoindex_shared::DataType;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FIXTURE: &str = include_str!("../../../../fixtures/cghub/analysis_detail.json");

    fn importer(base_url: &str, disease_codes: &[&str], resolver: DonorIdResolver) -> CghubImporter {
        CghubImporter::new(
            build_client(5).unwrap(),
            CghubConfig {
                base_url: base_url.to_string(),
                disease_codes: disease_codes.iter().map(|c| c.to_string()).collect(),
            },
            Arc::new(resolver),
        )
    }

    #[tokio::test]
    async fn reads_fixture_analyses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cghub/metadata/analysisDetail"))
            .and(query_param("study", TCGA_STUDY))
            .and(query_param("disease_abbr", "BRCA"))
            .and(query_param("state", "live"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = DonorIdResolver::new(build_client(5).unwrap(), None).unwrap();
        let files = importer(&server.uri(), &["BRCA"], resolver)
            .read_files()
            .await
            .expect("read files");

        // Third analysis has no id and is skipped.
        assert_eq!(files.len(), 3);

        let bam = &files[0];
        assert_eq!(bam.handle, "a1b2c3d4-0000-4000-8000-000000000001/C484.TCGA-A1-A0SB-01A.bam");
        assert_eq!(bam.size, Some(15_284_937_211));
        assert_eq!(bam.md5sum.as_deref(), Some("4c5e1f3d8a0b2f9e7d6c5b4a39281706"));
        assert_eq!(bam.classify(), Some(DataType::DnaSeq));
        assert_eq!(bam.donors[0].project_code, "BRCA-US");
        assert_eq!(bam.donors[0].submitted_donor_id, "TCGA-A1-A0SB");
        assert!(bam.copies[0].last_modified.is_some());
        assert_eq!(bam.copies[0].repo_code, "cghub");
        assert_eq!(bam.copies[0].file_format.as_deref(), Some("BAM"));
        assert!(
            bam.copies[0]
                .url
                .ends_with("/cghub/data/analysis/download/a1b2c3d4-0000-4000-8000-000000000001")
        );

        let bai = &files[1];
        assert_eq!(bai.size, Some(8_734_216));
        assert_eq!(bai.copies[0].file_format.as_deref(), Some("BAI"));

        let rna = &files[2];
        assert_eq!(rna.classify(), Some(DataType::RnaSeq));
        assert!(rna.md5sum.is_none());
        assert!(rna.copies[0].last_modified.is_none());
    }

    #[tokio::test]
    async fn resolves_donors_through_identifier_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cghub/metadata/analysisDetail"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/donor/id"))
            .and(query_param("submittedDonorId", "TCGA-A1-A0SB"))
            .respond_with(ResponseTemplate::new(200).set_body_string("DO0001"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/donor/id"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let resolver =
            DonorIdResolver::new(build_client(5).unwrap(), Some(&server.uri())).unwrap();
        let files = importer(&server.uri(), &["BRCA"], resolver)
            .read_files()
            .await
            .unwrap();

        assert_eq!(files[0].donors[0].donor_id.as_deref(), Some("DO0001"));
        assert_eq!(files[1].donors[0].donor_id.as_deref(), Some("DO0001"));
        assert!(files[2].donors[0].donor_id.is_none());
    }

    #[tokio::test]
    async fn unavailable_service_is_a_source_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let resolver = DonorIdResolver::new(build_client(5).unwrap(), None).unwrap();
        let result = importer(&server.uri(), &["OV"], resolver).read_files().await;
        assert!(matches!(result, Err(RepoIndexError::Network(_))));
    }

    #[test]
    fn checksum_shapes() {
        assert_eq!(
            checksum(Some(&serde_json::json!({"#text": "ABC"}))).as_deref(),
            Some("abc")
        );
        assert_eq!(checksum(Some(&serde_json::json!(" "))), None);
        assert_eq!(checksum(None), None);
    }
}
