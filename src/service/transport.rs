//! Request/response transport to the analysis service.
//!
//! The client only ever speaks in [`Operation`]s and JSON bodies; how they
//! travel is up to the [`Transport`]. Production uses [`HttpTransport`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::error::{ServiceError, ServiceResult};

/// Every endpoint the analysis service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Initialize,
    SetProjectRoot,
    SetPythonPath,
    Open,
    Change,
    Complete,
    Hover,
    Definition,
    Signature,
    Diagnostics,
    Dispose,
}

impl Operation {
    /// URL path of the endpoint.
    pub fn path(self) -> &'static str {
        match self {
            Self::Initialize => "/initialize",
            Self::SetProjectRoot => "/config/set_project_root",
            Self::SetPythonPath => "/config/set_python_path",
            Self::Open => "/open_file",
            Self::Change => "/change_file",
            Self::Complete => "/complete",
            Self::Hover => "/hover",
            Self::Definition => "/definition",
            Self::Signature => "/signature",
            Self::Diagnostics => "/diagnostics",
            Self::Dispose => "/dispose",
        }
    }

    /// Only the diagnostics snapshot is fetched with GET.
    pub fn is_get(self) -> bool {
        matches!(self, Self::Diagnostics)
    }
}

/// One request, one response. Implementations map failures onto
/// [`ServiceError::Network`] (nothing came back) and
/// [`ServiceError::Server`] (something came back, but not a success).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, operation: Operation, body: Option<Value>) -> ServiceResult<Value>;
}

/// HTTP transport backed by reqwest.
#[derive(Debug)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the given base URL (e.g. `http://localhost:5000`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ServiceResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Validation(format!("failed to build HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, operation: Operation, body: Option<Value>) -> ServiceResult<Value> {
        let url = format!("{}{}", self.base_url, operation.path());
        debug!(?operation, %url, "service request");

        let builder = if operation.is_get() {
            self.http.get(&url)
        } else {
            self.http
                .post(&url)
                .json(&body.unwrap_or_else(|| Value::Object(Default::default())))
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();

        if status >= 400 {
            let body = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(ServiceError::Server { status, body });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("failed to parse response: {e}")))?;

        // The service relays language-server errors inside a 2xx envelope.
        if value.get("error").is_some() && value.get("result").is_none() {
            return Err(ServiceError::Server {
                status,
                body: value.to_string(),
            });
        }

        Ok(value)
    }
}
