//! HTTP client construction and response helpers shared by importers.

use std::time::Duration;

use reqwest::Client;
use repoindex_shared::{RepoIndexError, Result};
use serde::de::DeserializeOwned;

/// User-Agent string for upstream requests.
pub const USER_AGENT: &str = concat!("repoindex/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Build a reqwest client with connect and read timeouts.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    let timeout = Duration::from_secs(timeout_secs);
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| RepoIndexError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET `url` and decode a JSON body. Non-2xx statuses are errors.
pub async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| RepoIndexError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RepoIndexError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| RepoIndexError::Network(format!("{url}: failed to read body: {e}")))?;

    serde_json::from_str(&body).map_err(|e| RepoIndexError::parse(format!("{url}: {e}")))
}

/// Infer a file format label from a file name extension.
pub fn file_format(file_name: &str) -> Option<String> {
    let lower = file_name.to_ascii_lowercase();
    let format = if lower.ends_with(".bam") {
        "BAM"
    } else if lower.ends_with(".bai") {
        "BAI"
    } else if lower.ends_with(".vcf.gz") || lower.ends_with(".vcf") {
        "VCF"
    } else if lower.ends_with(".fastq.gz") || lower.ends_with(".fastq") {
        "FASTQ"
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tar") {
        "TAR"
    } else {
        return None;
    };
    Some(format.to_string())
}
