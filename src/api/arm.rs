//! # Azure Resource Manager adapter
//!
//! [`ArmClient`] serves every identifier/wire pair over the ARM REST API:
//!
//! ```text
//! GET    {endpoint}{id}?api-version={v}              200 -> Some, 404 -> None
//! PUT    {endpoint}{id}?api-version={v}              200 done, 201/202 -> follow the operation
//! DELETE {endpoint}{id}?api-version={v}              200/204 done, 202 -> follow, 404 -> NotFound
//! POST   {endpoint}{id}/listSecrets?api-version={v}  the secret values GET leaves out
//! ```
//!
//! Long-running operations are followed through `Azure-AsyncOperation` when the service
//! sends it and `Location` otherwise. A 202 with neither is reported as
//! [`Submission::Accepted`] and the engine re-reads existence instead.

use crate::wire::{Secret, SecretsCollection};
use async_trait::async_trait;
use reconcile_framework::id::ResourceId;
use reconcile_framework::{PollStatus, Poller, RemoteApi, RemoteError, SecretLister, Submission};
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// Where and how to reach Resource Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmConfig {
    pub endpoint: String,
    pub api_version: String,
    /// Bound on a single HTTP exchange. Whole operations are bounded by the engine.
    pub request_timeout: Duration,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://management.azure.com".to_string(),
            api_version: "2025-01-01".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Supplies bearer tokens for ARM requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, RemoteError>;
}

/// A token obtained out of band, e.g. `az account get-access-token`.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, RemoteError> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
pub struct ArmClient {
    http: Client,
    config: ArmConfig,
    token: Arc<dyn TokenSource>,
}

impl fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmClient")
            .field("endpoint", &self.config.endpoint)
            .field("api_version", &self.config.api_version)
            .finish_non_exhaustive()
    }
}

impl ArmClient {
    pub fn new(config: ArmConfig, token: Arc<dyn TokenSource>) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport)?;
        Ok(Self { http, config, token })
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            path,
            self.config.api_version
        )
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, RemoteError> {
        let token = self.token.token().await?;
        let mut request = self.http.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport)?;
        debug!(%method, url, status = %response.status(), "ARM response");
        Ok(response)
    }

    fn submission(&self, status: StatusCode, headers: &HeaderMap) -> Submission {
        match classify(status, headers) {
            Outcome::Completed => Submission::Completed,
            Outcome::Accepted => Submission::Accepted,
            Outcome::Follow(monitor) => Submission::Pending(Box::new(ArmPoller {
                client: self.clone(),
                monitor,
                retry_after: retry_after(headers),
            })),
        }
    }
}

#[async_trait]
impl<I, W> RemoteApi<I, W> for ArmClient
where
    I: ResourceId,
    W: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, id: &I) -> Result<Option<W>, RemoteError> {
        let span = info_span!("arm.get", kind = I::KIND, %id);
        async move {
            let response = self.send(Method::GET, &self.url(&id.format_id()), None).await?;
            match response.status() {
                StatusCode::NOT_FOUND => Ok(None),
                status if status.is_success() => decode(response).await.map(Some),
                _ => Err(error_from(response).await),
            }
        }
        .instrument(span)
        .await
    }

    async fn create_or_update(&self, id: &I, model: W) -> Result<Submission, RemoteError> {
        let span = info_span!("arm.put", kind = I::KIND, %id);
        async move {
            let body = serde_json::to_value(&model)
                .map_err(|e| RemoteError::Decode(format!("encoding request body: {e}")))?;
            let response = self
                .send(Method::PUT, &self.url(&id.format_id()), Some(body))
                .await?;
            if !response.status().is_success() {
                return Err(error_from(response).await);
            }
            Ok(self.submission(response.status(), response.headers()))
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, id: &I) -> Result<Submission, RemoteError> {
        let span = info_span!("arm.delete", kind = I::KIND, %id);
        async move {
            let response = self.send(Method::DELETE, &self.url(&id.format_id()), None).await?;
            match response.status() {
                StatusCode::NOT_FOUND => Err(RemoteError::NotFound),
                status if status.is_success() => Ok(self.submission(status, response.headers())),
                _ => Err(error_from(response).await),
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl<I: ResourceId> SecretLister<I, Secret> for ArmClient {
    async fn list_secrets(&self, id: &I) -> Result<Vec<Secret>, RemoteError> {
        let span = info_span!("arm.list_secrets", kind = I::KIND, %id);
        async move {
            let url = self.url(&format!("{}/listSecrets", id.format_id()));
            let response = self.send(Method::POST, &url, None).await?;
            match response.status() {
                StatusCode::NOT_FOUND => Err(RemoteError::NotFound),
                status if status.is_success() => {
                    decode::<SecretsCollection>(response).await.map(|collection| collection.value)
                }
                _ => Err(error_from(response).await),
            }
        }
        .instrument(span)
        .await
    }
}

/// How to follow a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Monitor {
    /// Returns `{ "status": ... }` until the operation is terminal.
    AsyncOperation(String),
    /// Returns 202 while running and a 2xx once done.
    Location(String),
}

impl Monitor {
    fn url(&self) -> &str {
        match self {
            Monitor::AsyncOperation(url) | Monitor::Location(url) => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Completed,
    Follow(Monitor),
    Accepted,
}

/// Decide what a successful write or delete response means.
fn classify(status: StatusCode, headers: &HeaderMap) -> Outcome {
    match (status, monitor(headers)) {
        (StatusCode::CREATED | StatusCode::ACCEPTED, Some(monitor)) => Outcome::Follow(monitor),
        (StatusCode::ACCEPTED, None) => Outcome::Accepted,
        _ => Outcome::Completed,
    }
}

fn monitor(headers: &HeaderMap) -> Option<Monitor> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    header(AZURE_ASYNC_OPERATION)
        .map(Monitor::AsyncOperation)
        .or_else(|| header(LOCATION.as_str()).map(Monitor::Location))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

struct ArmPoller {
    client: ArmClient,
    monitor: Monitor,
    retry_after: Option<Duration>,
}

#[async_trait]
impl Poller for ArmPoller {
    async fn poll(&mut self) -> Result<PollStatus, RemoteError> {
        let response = self.client.send(Method::GET, self.monitor.url(), None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from(response).await);
        }
        self.retry_after = retry_after(response.headers());

        match self.monitor {
            Monitor::Location(_) if status == StatusCode::ACCEPTED => Ok(PollStatus::InProgress),
            Monitor::Location(_) => Ok(PollStatus::Succeeded),
            Monitor::AsyncOperation(_) => {
                let body = response.text().await.map_err(transport)?;
                operation_status(&body)
            }
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

/// Map a non-success response body to a status error.
fn status_error(status: u16, body: &str) -> RemoteError {
    match serde_json::from_str::<ErrorEnvelope>(body).ok().and_then(|envelope| envelope.error) {
        Some(detail) => RemoteError::Status {
            status,
            code: detail.code,
            message: detail.message.unwrap_or_default(),
        },
        None => RemoteError::Status {
            status,
            code: None,
            message: body.trim().to_string(),
        },
    }
}

fn operation_status(body: &str) -> Result<PollStatus, RemoteError> {
    let operation: OperationStatus = serde_json::from_str(body)
        .map_err(|e| RemoteError::Decode(format!("operation status: {e}")))?;

    let status = match operation.status.to_ascii_lowercase().as_str() {
        "succeeded" => PollStatus::Succeeded,
        "failed" | "canceled" | "cancelled" => {
            let reason = operation.error.and_then(|detail| detail.message);
            PollStatus::Failed(match reason {
                Some(message) => format!("{}: {message}", operation.status),
                None => operation.status,
            })
        }
        _ => PollStatus::InProgress,
    };
    Ok(status)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let body = response.text().await.map_err(transport)?;
    serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
}

async fn error_from(response: Response) -> RemoteError {
    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => status_error(status, &body),
        Err(e) => transport(e),
    }
}

fn transport(error: reqwest::Error) -> RemoteError {
    RemoteError::Transport(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const OPERATION: &str =
        "https://management.azure.com/providers/Microsoft.App/locations/westeurope/containerappOperationStatuses/abc";

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn arm_error_bodies_carry_code_and_message() {
        let body =
            r#"{"error":{"code":"ContainerAppSecretInvalid","message":"secret rick has no value"}}"#;
        assert_eq!(
            status_error(400, body),
            RemoteError::status(400, "ContainerAppSecretInvalid", "secret rick has no value")
        );
    }

    #[test]
    fn non_arm_error_bodies_are_kept_verbatim() {
        assert_eq!(
            status_error(502, "Bad Gateway\n"),
            RemoteError::Status {
                status: 502,
                code: None,
                message: "Bad Gateway".into(),
            }
        );
    }

    #[test]
    fn async_operation_header_wins_over_location() {
        let both = headers(&[
            ("azure-asyncoperation", OPERATION),
            ("location", "https://example.test/loc"),
        ]);
        assert_eq!(
            classify(StatusCode::CREATED, &both),
            Outcome::Follow(Monitor::AsyncOperation(OPERATION.into()))
        );

        let location = headers(&[("location", "https://example.test/loc")]);
        assert_eq!(
            classify(StatusCode::ACCEPTED, &location),
            Outcome::Follow(Monitor::Location("https://example.test/loc".into()))
        );
    }

    #[test]
    fn accepted_without_a_monitor_is_reported_as_such() {
        assert_eq!(classify(StatusCode::ACCEPTED, &HeaderMap::new()), Outcome::Accepted);
        assert_eq!(classify(StatusCode::CREATED, &HeaderMap::new()), Outcome::Completed);
        assert_eq!(
            classify(StatusCode::OK, &headers(&[("location", OPERATION)])),
            Outcome::Completed
        );
        assert_eq!(classify(StatusCode::NO_CONTENT, &HeaderMap::new()), Outcome::Completed);
    }

    #[test]
    fn operation_statuses_map_to_poll_outcomes() {
        assert_eq!(operation_status(r#"{"status":"InProgress"}"#).unwrap(), PollStatus::InProgress);
        assert_eq!(operation_status(r#"{"status":"Succeeded"}"#).unwrap(), PollStatus::Succeeded);
        assert_eq!(
            operation_status(
                r#"{"status":"Failed","error":{"code":"X","message":"image pull failed"}}"#
            )
            .unwrap(),
            PollStatus::Failed("Failed: image pull failed".into())
        );
        assert_eq!(
            operation_status(r#"{"status":"Canceled"}"#).unwrap(),
            PollStatus::Failed("Canceled".into())
        );
        assert!(matches!(operation_status("<html>"), Err(RemoteError::Decode(_))));
    }

    #[test]
    fn retry_after_is_read_in_seconds() {
        assert_eq!(retry_after(&headers(&[("retry-after", "15")])), Some(Duration::from_secs(15)));
        assert_eq!(retry_after(&headers(&[("retry-after", "soon")])), None);
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn urls_carry_the_api_version() {
        let client = ArmClient::new(
            ArmConfig {
                endpoint: "https://example.test/".into(),
                ..Default::default()
            },
            Arc::new(StaticToken::new("s3cr3t")),
        )
        .unwrap();

        assert_eq!(
            client.url("/subscriptions/sub/resourceGroups/rg1"),
            "https://example.test/subscriptions/sub/resourceGroups/rg1?api-version=2025-01-01"
        );
        assert!(!format!("{client:?}").contains("s3cr3t"));
    }
}
