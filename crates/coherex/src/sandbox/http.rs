//! HTTP sandbox client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::error::{SandboxError, SandboxResult};
use super::{CommandOutput, SandboxExecutor, SandboxOptions, SandboxRef};

/// Client for a remote sandbox service.
#[derive(Debug, Clone)]
pub struct HttpSandboxExecutor {
    /// HTTP client.
    client: Client,
    /// Base URL for the sandbox service (e.g., "https://sandboxes.example.com").
    base_url: String,
    /// API key for authenticated operations.
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CreateSandboxResponse {
    sandbox_id: String,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    contents: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: String,
    #[serde(default)]
    code: Option<String>,
}

impl HttpSandboxExecutor {
    /// Create a new sandbox client.
    ///
    /// Provisioning can take minutes on a cold pool, so the request timeout
    /// is deliberately generous.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> SandboxResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(SandboxError::RequestFailed)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Handle response and parse JSON or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        sandbox: &str,
    ) -> SandboxResult<T> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| SandboxError::Parse(format!("failed to parse response: {}", e)));
        }

        match status {
            StatusCode::NOT_FOUND => Err(SandboxError::NotFound(sandbox.to_string())),
            _ => {
                let error: ApiErrorResponse = response.json().await.map_err(|e| {
                    SandboxError::Parse(format!("failed to parse error response: {}", e))
                })?;
                Err(SandboxError::Api {
                    message: error.error,
                    code: error.code.unwrap_or_else(|| status.as_u16().to_string()),
                })
            }
        }
    }
}

#[async_trait]
impl SandboxExecutor for HttpSandboxExecutor {
    async fn create_sandbox(&self, id: &str, opts: &SandboxOptions) -> SandboxResult<SandboxRef> {
        let response = self
            .client
            .post(self.url("/sandboxes"))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "id": id,
                "timeout_seconds": opts.timeout_seconds,
            }))
            .send()
            .await
            .map_err(|e| SandboxError::Provisioning(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::Provisioning(format!(
                "service returned {}: {}",
                status, body
            )));
        }

        let created: CreateSandboxResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::Parse(format!("failed to parse response: {}", e)))?;

        Ok(SandboxRef(created.sandbox_id))
    }

    async fn run_command(
        &self,
        sandbox: &SandboxRef,
        command: &str,
    ) -> SandboxResult<CommandOutput> {
        let response = self
            .client
            .post(self.url(&format!("/sandboxes/{}/exec", sandbox)))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "command": command }))
            .send()
            .await?;

        let output: CommandOutput = self.handle_response(response, sandbox.as_str()).await?;

        if let Some(ref error) = output.error {
            return Err(SandboxError::Command {
                sandbox: sandbox.to_string(),
                message: error.clone(),
            });
        }

        Ok(output)
    }

    async fn upload_file(
        &self,
        sandbox: &SandboxRef,
        path: &str,
        contents: &[u8],
    ) -> SandboxResult<()> {
        let response = self
            .client
            .put(self.url(&format!("/sandboxes/{}/files", sandbox)))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "path": path,
                "contents": String::from_utf8_lossy(contents),
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SandboxError::NotFound(sandbox.to_string()));
        }
        response.error_for_status()?;
        Ok(())
    }

    async fn download_file(&self, sandbox: &SandboxRef, path: &str) -> SandboxResult<Vec<u8>> {
        let response = self
            .client
            .get(self.url(&format!("/sandboxes/{}/files", sandbox)))
            .bearer_auth(&self.api_key)
            .query(&[("path", path)])
            .send()
            .await?;

        let body: DownloadResponse = self.handle_response(response, sandbox.as_str()).await?;
        Ok(body.contents.into_bytes())
    }

    async fn destroy_sandbox(&self, sandbox: &SandboxRef) -> SandboxResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/sandboxes/{}", sandbox)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            // Already gone counts as destroyed.
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(SandboxError::Api {
                message: "failed to destroy sandbox".to_string(),
                code: status.as_u16().to_string(),
            }),
        }
    }
}
