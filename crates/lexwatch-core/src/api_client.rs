//! Client for the case/analysis REST collaborator.

use crate::config::BackendConfig;
use async_trait::async_trait;
use lexwatch_proto::{CaseRecord, Error, StartedAnalysis};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("case {0} not found")]
    NotFound(String),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Error::Api(err.to_string())
    }
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "healthy" | "ok")
    }
}

#[async_trait]
pub trait CaseApi: Send + Sync {
    /// Reads the case with its analyses, used to seed state on mount.
    async fn get_case_analysis(&self, case_id: &str) -> Result<CaseRecord, ApiError>;

    /// Asks the backend to start a new analysis run.
    async fn start_analysis(&self, case_id: &str) -> Result<StartedAnalysis, ApiError>;

    async fn health(&self) -> Result<HealthReport, ApiError>;
}

/// [`CaseApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCaseApi {
    base_url: String,
    client: Client,
}

impl HttpCaseApi {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(
        method: &'static str,
        url: String,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            method,
            url,
            status,
            body,
        })
    }
}

#[async_trait]
impl CaseApi for HttpCaseApi {
    async fn get_case_analysis(&self, case_id: &str) -> Result<CaseRecord, ApiError> {
        let url = format!("{}/api/v1/cases/{}", self.base_url, case_id);
        debug!(%url, "fetching case");
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(case_id.to_string()));
        }
        let response = Self::check("GET", url, response).await?;
        Ok(response.json().await?)
    }

    async fn start_analysis(&self, case_id: &str) -> Result<StartedAnalysis, ApiError> {
        let url = format!("{}/api/v1/analysis/{}/start", self.base_url, case_id);
        debug!(%url, "starting analysis");
        let response = self.client.post(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(case_id.to_string()));
        }
        let response = Self::check("POST", url, response).await?;
        Ok(response.json().await?)
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = Self::check("GET", url, response).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let config = BackendConfig {
            api_url: "http://localhost:8000/".into(),
            ..BackendConfig::default()
        };
        let api = HttpCaseApi::new(&config).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_health_report() {
        let report: HealthReport =
            serde_json::from_str(r#"{"status": "healthy", "database": "connected"}"#).unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.version, None);
    }

    #[test]
    fn test_api_error_maps_to_taxonomy() {
        let err: Error = ApiError::NotFound("case-9".into()).into();
        assert!(matches!(err, Error::Api(ref m) if m.contains("case-9")));
    }
}
