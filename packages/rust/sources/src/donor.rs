//! Donor identifier service client.
//!
//! Maps `(project code, submitted donor id)` to a stable donor identifier.
//! Lookups are cached for the lifetime of the resolver (one import run).

use std::collections::HashMap;

use reqwest::{Client, StatusCode};
use repoindex_shared::{Donor, RepoIndexError, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

/// Client for the identifier service.
pub struct DonorIdResolver {
    client: Client,
    url: Option<Url>,
    cache: Mutex<HashMap<(String, String), Option<String>>>,
}

impl DonorIdResolver {
    /// Create a resolver. With no `url`, every donor stays unresolved.
    pub fn new(client: Client, url: Option<&str>) -> Result<Self> {
        let url = url
            .map(|u| {
                let url = Url::parse(u).map_err(|e| {
                    RepoIndexError::config(format!("invalid identifier url '{u}': {e}"))
                })?;
                if url.cannot_be_a_base() {
                    return Err(RepoIndexError::config(format!(
                        "invalid identifier url '{u}': not a base url"
                    )));
                }
                Ok(url)
            })
            .transpose()?;

        Ok(Self {
            client,
            url,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Whether an identifier service is configured.
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Fill in `donor_id` for every donor the service knows.
    ///
    /// Lookup failures are record-level anomalies: logged, donor left unresolved.
    pub async fn resolve_donors(&self, donors: &mut [Donor]) {
        if !self.is_enabled() {
            return;
        }

        for donor in donors.iter_mut().filter(|d| !d.has_donor_id()) {
            match self
                .resolve(&donor.project_code, &donor.submitted_donor_id)
                .await
            {
                Ok(id) => donor.donor_id = id,
                Err(e) => warn!(
                    project = %donor.project_code,
                    donor = %donor.submitted_donor_id,
                    error = %e,
                    "donor id lookup failed"
                ),
            }
        }
    }

    /// Look up one donor. `Ok(None)` when the service does not know it.
    pub async fn resolve(&self, project_code: &str, submitted_donor_id: &str) -> Result<Option<String>> {
        let Some(base) = &self.url else {
            return Ok(None);
        };

        let key = (project_code.to_string(), submitted_donor_id.to_string());
        if let Some(cached) = self.cache.lock().await.get(&key) {
            return Ok(cached.clone());
        }

        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| RepoIndexError::config(format!("identifier url '{base}' cannot be a base")))?
            .pop_if_empty()
            .extend(["donor", "id"]);
        url.query_pairs_mut()
            .append_pair("submittedDonorId", submitted_donor_id)
            .append_pair("submittedProjectId", project_code)
            .append_pair("create", "false");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| RepoIndexError::Network(format!("{url}: {e}")))?;

        let id = match response.status() {
            StatusCode::NOT_FOUND => None,
            status if status.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| RepoIndexError::Network(format!("{url}: {e}")))?;
                let id = body.trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            status => {
                return Err(RepoIndexError::Network(format!("{url}: HTTP {status}")));
            }
        };

        debug!(project_code, submitted_donor_id, ?id, "resolved donor id");
        self.cache.lock().await.insert(key, id.clone());
        Ok(id)
    }
}
