//! Object-store importer, shared by the AWS and Collaboratory repositories.
//!
//! The store only knows objects by id: each `data/<uuid>` key in the listing
//! becomes one observation whose object id is the uuid. Companion keys
//! (`.meta`, logs) are ignored.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use repoindex_shared::{
    FileCopy, FileObservation, RepoIndexError, RepositorySource, Result, servers::server_for,
};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::SourceImporter;
use crate::http::get_json;

static DATA_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data/([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})$")
        .expect("valid object key regex")
});

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    objects: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    key: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    md5: Option<String>,
}

/// Importer for one object-store listing.
pub struct ObjectStoreImporter {
    client: Client,
    source: RepositorySource,
    listing_url: Option<String>,
}

impl ObjectStoreImporter {
    pub fn new(client: Client, source: RepositorySource, listing_url: Option<String>) -> Self {
        Self {
            client,
            source,
            listing_url,
        }
    }

    fn observation(&self, object: ListedObject) -> Option<FileObservation> {
        let object_id = DATA_KEY.captures(&object.key)?.get(1)?.as_str().to_ascii_lowercase();

        let last_modified = object.last_modified.as_deref().and_then(|raw| {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(e) => {
                    warn!(key = %object.key, raw, error = %e, "unparseable last_modified");
                    None
                }
            }
        });
        let md5sum = object
            .md5
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty());

        Some(FileObservation {
            source: self.source,
            handle: object.key.clone(),
            object_id: Some(object_id),
            analysis_id: String::new(),
            file_name: String::new(),
            md5sum: md5sum.clone(),
            size: object.size,
            analyte_code: None,
            data_type: None,
            donors: Vec::new(),
            copies: vec![FileCopy {
                repo_code: server_for(self.source).code.to_string(),
                url: object.key,
                file_format: None,
                last_modified,
                size: object.size,
                md5sum,
            }],
        })
    }
}

#[async_trait]
impl SourceImporter for ObjectStoreImporter {
    fn source(&self) -> RepositorySource {
        self.source
    }

    #[instrument(skip_all)]
    async fn read_files(&self) -> Result<Vec<FileObservation>> {
        let url = self.listing_url.as_deref().ok_or_else(|| {
            RepoIndexError::config(format!("{}.listing_url is not configured", self.source))
        })?;

        info!(source = %self.source, %url, "reading object listing");
        let listing: Listing = get_json(&self.client, url).await?;
        let listed = listing.objects.len();

        let files: Vec<_> = listing
            .objects
            .into_iter()
            .filter_map(|object| self.observation(object))
            .collect();

        debug!(listed, kept = files.len(), "filtered object listing");
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FIXTURE: &str = include_str!("../../../../fixtures/object_store/listing.json");

    #[test]
    fn data_keys_only() {
        assert!(DATA_KEY.is_match("data/3f0d4b2e-8c1a-5e7b-9d2f-6a4c8e1b0f37"));
        assert!(!DATA_KEY.is_match("data/3f0d4b2e-8c1a-5e7b-9d2f-6a4c8e1b0f37.meta"));
        assert!(!DATA_KEY.is_match("data/not-a-uuid"));
        assert!(!DATA_KEY.is_match("other/3f0d4b2e-8c1a-5e7b-9d2f-6a4c8e1b0f37"));
    }

    #[tokio::test]
    async fn reads_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/listing.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
            .mount(&server)
            .await;

        let importer = ObjectStoreImporter::new(
            build_client(5).unwrap(),
            RepositorySource::Collab,
            Some(format!("{}/listing.json", server.uri())),
        );
        let files = importer.read_files().await.expect("read listing");

        assert_eq!(files.len(), 2);
        assert_eq!(
            files[0].object_id.as_deref(),
            Some("e2e68c72-e37c-5246-bcf3-d8a0ec4376f8")
        );
        assert_eq!(files[0].source, RepositorySource::Collab);
        assert_eq!(files[0].copies[0].repo_code, "collaboratory");
        assert_eq!(
            files[0].md5sum.as_deref(),
            Some("4c5e1f3d8a0b2f9e7d6c5b4a39281706")
        );
        assert!(files[0].copies[0].last_modified.is_some());
        assert!(files[1].copies[0].last_modified.is_none());
    }

    #[tokio::test]
    async fn unconfigured_listing_is_a_config_error() {
        let importer =
            ObjectStoreImporter::new(build_client(5).unwrap(), RepositorySource::Aws, None);
        let err = importer.read_files().await.unwrap_err();
        assert!(err.to_string().contains("aws.listing_url"));
    }
}
