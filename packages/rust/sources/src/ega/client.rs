//! Session-based client for the EGA access API.
//!
//! Every call carries a session id obtained by logging in. The API signals an
//! expired session in the response envelope (header code 991), not the HTTP
//! status; the client logs in again and retries the call exactly once.

use reqwest::Client;
use repoindex_shared::{EgaCredentials, RepoIndexError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Envelope code for a successful call.
const CODE_OK: i64 = 200;

/// Envelope code for an expired session.
const CODE_SESSION_EXPIRED: i64 = 991;

/// EGA access API client.
pub struct EgaClient {
    client: Client,
    base_url: String,
    credentials: EgaCredentials,
    session: Mutex<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    header: Header,
    #[serde(default)]
    response: Body,
}

#[derive(Debug, Default, Deserialize)]
struct Header {
    #[serde(default)]
    code: Value,
}

#[derive(Debug, Default, Deserialize)]
struct Body {
    #[serde(default)]
    result: Value,
}

impl Envelope {
    fn code(&self) -> Option<i64> {
        match &self.header.code {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn is_session_expired(&self) -> bool {
        self.code() == Some(CODE_SESSION_EXPIRED)
    }
}

impl EgaClient {
    pub fn new(client: Client, base_url: &str, credentials: EgaCredentials) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            session: Mutex::new(None),
        }
    }

    /// Log in and store the new session id.
    pub async fn login(&self) -> Result<String> {
        let url = format!("{}/users/login", self.base_url);
        let request = serde_json::json!({
            "username": self.credentials.username,
            "password": self.credentials.password,
        });

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("loginrequest", request.to_string())])
            .send()
            .await
            .map_err(|e| RepoIndexError::Network(format!("{url}: {e}")))?;

        let envelope: Envelope = read_envelope(response, &url).await?;
        let session = envelope
            .response
            .result
            .get(1)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| {
                RepoIndexError::source_failure(
                    "ega",
                    format!("login rejected (code {:?})", envelope.code()),
                )
            })?;

        info!(user = %self.credentials.username, "logged in to EGA");
        *self.session.lock().await = Some(session.clone());
        Ok(session)
    }

    /// All dataset ids visible to the account.
    pub async fn dataset_ids(&self) -> Result<Vec<String>> {
        self.get("/datasets").await
    }

    /// Raw file records of one dataset.
    pub async fn files(&self, dataset_id: &str) -> Result<Vec<Value>> {
        self.get(&format!("/datasets/{dataset_id}/files")).await
    }

    async fn session(&self) -> Result<String> {
        if let Some(session) = self.session.lock().await.clone() {
            return Ok(session);
        }
        self.login().await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let session = self.session().await?;
        let mut envelope = self.fetch(path, &session).await?;

        if envelope.is_session_expired() {
            warn!(path, "EGA session expired, reconnecting");
            let session = self.login().await?;
            envelope = self.fetch(path, &session).await?;
            if envelope.is_session_expired() {
                return Err(RepoIndexError::SessionExpired(format!(
                    "EGA {path}: session expired again after reconnect"
                )));
            }
        }

        match envelope.code() {
            Some(CODE_OK) => {}
            code => {
                return Err(RepoIndexError::Network(format!(
                    "EGA {path}: expected OK response, got code {code:?}"
                )));
            }
        }

        serde_json::from_value(envelope.response.result)
            .map_err(|e| RepoIndexError::parse(format!("EGA {path}: {e}")))
    }

    async fn fetch(&self, path: &str, session: &str) -> Result<Envelope> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "EGA request");

        let response = self
            .client
            .get(&url)
            .query(&[("session", session)])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| RepoIndexError::Network(format!("{url}: {e}")))?;

        read_envelope(response, &url).await
    }
}

async fn read_envelope(response: reqwest::Response, url: &str) -> Result<Envelope> {
    let status = response.status();
    if !status.is_success() {
        return Err(RepoIndexError::Network(format!("{url}: HTTP {status}")));
    }
    let body = response
        .text()
        .await
        .map_err(|e| RepoIndexError::Network(format!("{url}: {e}")))?;
    serde_json::from_str(&body).map_err(|e| RepoIndexError::parse(format!("{url}: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::build_client;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn credentials() -> EgaCredentials {
        EgaCredentials {
            username: "icgc@example.org".into(),
            password: "s3cret".into(),
        }
    }

    pub(crate) fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "header": { "code": "200" },
            "response": { "numTotalResults": 1, "result": result }
        }))
    }

    pub(crate) fn expired() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "header": { "code": 991, "userMessage": "session expired" },
            "response": { "result": [] }
        }))
    }

    pub(crate) async fn mount_login(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/users/login"))
            .and(body_string_contains("loginrequest="))
            .respond_with(ok(json!(["success", "SESSION-1"])))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn logs_in_before_first_call() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/datasets"))
            .and(query_param("session", "SESSION-1"))
            .respond_with(ok(json!(["EGAD00001000001", "EGAD00001000002"])))
            .expect(2)
            .mount(&server)
            .await;

        let ega = EgaClient::new(build_client(5).unwrap(), &server.uri(), credentials());
        let ids = ega.dataset_ids().await.expect("datasets");
        assert_eq!(ids, vec!["EGAD00001000001", "EGAD00001000002"]);

        // Session is reused.
        ega.dataset_ids().await.expect("datasets again");
    }

    #[tokio::test]
    async fn reconnects_once_on_expired_session() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;

        Mock::given(method("GET"))
            .and(path("/datasets"))
            .respond_with(expired())
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/datasets"))
            .respond_with(ok(json!(["EGAD00001000001"])))
            .mount(&server)
            .await;

        let ega = EgaClient::new(build_client(5).unwrap(), &server.uri(), credentials());
        let ids = ega.dataset_ids().await.expect("retried call succeeds");
        assert_eq!(ids, vec!["EGAD00001000001"]);
    }

    #[tokio::test]
    async fn second_expiry_is_an_error() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        Mock::given(method("GET"))
            .and(path("/datasets"))
            .respond_with(expired())
            .expect(2)
            .mount(&server)
            .await;

        let ega = EgaClient::new(build_client(5).unwrap(), &server.uri(), credentials());
        let err = ega.dataset_ids().await.unwrap_err();
        assert!(matches!(err, RepoIndexError::SessionExpired(_)));
    }

    #[tokio::test]
    async fn rejected_login_is_a_source_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/login"))
            .respond_with(ok(json!(["failure"])))
            .mount(&server)
            .await;

        let ega = EgaClient::new(build_client(5).unwrap(), &server.uri(), credentials());
        let err = ega.dataset_ids().await.unwrap_err();
        assert!(matches!(err, RepoIndexError::Source { .. }));
    }

    #[tokio::test]
    async fn non_ok_code_is_an_error() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/datasets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "header": { "code": 500 },
                "response": { "result": [] }
            })))
            .mount(&server)
            .await;

        let ega = EgaClient::new(build_client(5).unwrap(), &server.uri(), credentials());
        assert!(matches!(
            ega.dataset_ids().await,
            Err(RepoIndexError::Network(_))
        ));
    }
}
