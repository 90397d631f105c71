//! MLflow-compatible model registry client
//!
//! Aliases are resolved through the tracking server's REST API and the
//! model's `linear_model.json` artifact is downloaded through the
//! model-version artifact proxy.

use async_trait::async_trait;
use nimbus_core::{Error, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::linear::LinearClassifier;
use crate::model::{ModelHandle, ModelInfo};
use crate::registry::{ModelRegistry, ModelVersion};

/// Artifact file the registered model must contain
pub const DEFAULT_ARTIFACT_PATH: &str = "linear_model.json";

const ALIAS_ENDPOINT: &str = "api/2.0/mlflow/registered-models/alias";
const ARTIFACT_ENDPOINT: &str = "model-versions/get-artifact";

/// HTTP registry client
pub struct HttpModelRegistry {
    client: reqwest::Client,
    base_url: Url,
    artifact_path: String,
}

#[derive(Debug, Deserialize)]
struct AliasResponse {
    model_version: RegisteredVersion,
}

#[derive(Debug, Deserialize)]
struct RegisteredVersion {
    name: String,
    version: String,
    #[serde(default)]
    source: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

impl HttpModelRegistry {
    /// Create a client for the tracking server at `tracking_uri`
    pub fn new(tracking_uri: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(tracking_uri)
            .map_err(|e| Error::config(format!("Invalid tracking URI '{}': {}", tracking_uri, e)))?;

        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build registry client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            artifact_path: DEFAULT_ARTIFACT_PATH.to_string(),
        })
    }

    /// Use a different artifact file name inside the registered model
    pub fn with_artifact_path(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = path.into();
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::config(format!("Invalid registry endpoint '{}': {}", path, e)))
    }

    async fn get(&self, url: Url, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::registry_unavailable(format!("Registry request failed: {}", e)))
    }
}

/// Map a non-success registry response onto the error taxonomy
async fn classify_failure(response: reqwest::Response, name: &str, alias: &str) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail: Option<ErrorResponse> = serde_json::from_str(&body).ok();

    let missing = status == StatusCode::NOT_FOUND
        || detail.as_ref().is_some_and(|d| {
            d.error_code == "RESOURCE_DOES_NOT_EXIST" || d.error_code == "INVALID_PARAMETER_VALUE"
        });

    if missing {
        return Error::model_not_found(name, alias);
    }

    let message = detail
        .map(|d| d.message)
        .filter(|m| !m.is_empty())
        .unwrap_or(body);
    Error::registry_unavailable(format!("Registry returned {}: {}", status, message))
}

#[async_trait]
impl ModelRegistry for HttpModelRegistry {
    async fn resolve(&self, name: &str, alias: &str) -> Result<ModelVersion> {
        let url = self.endpoint(ALIAS_ENDPOINT)?;
        let response = self.get(url, &[("name", name), ("alias", alias)]).await?;

        if !response.status().is_success() {
            return Err(classify_failure(response, name, alias).await);
        }

        let body: AliasResponse = response.json().await.map_err(|e| {
            Error::registry_unavailable(format!("Malformed alias response: {}", e))
        })?;

        Ok(ModelVersion {
            name: body.model_version.name,
            alias: alias.to_string(),
            version: body.model_version.version,
            source: body.model_version.source,
        })
    }

    async fn fetch(&self, version: &ModelVersion) -> Result<ModelHandle> {
        let url = self.endpoint(ARTIFACT_ENDPOINT)?;
        let response = self
            .get(
                url,
                &[
                    ("path", self.artifact_path.as_str()),
                    ("name", version.name.as_str()),
                    ("version", version.version.as_str()),
                ],
            )
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(response, &version.name, &version.alias).await);
        }

        let bytes = response.bytes().await.map_err(|e| {
            Error::registry_unavailable(format!("Failed to download artifact: {}", e))
        })?;
        let model = LinearClassifier::from_json(&bytes)?;

        Ok(ModelHandle::new(
            model,
            ModelInfo {
                name: version.name.clone(),
                alias: version.alias.clone(),
                version: version.version.clone(),
                source: version.source.clone(),
            },
        ))
    }

    fn describe(&self) -> String {
        format!("mlflow tracking server {}", self.base_url)
    }
}
