use std::time::Duration;

use anyhow::Context;
use reqwest::{Client as ReqwestClient, Response};
use serde::de::DeserializeOwned;

use super::model::{
    AgentsResponse, CommandRequest, CommandResult, LinkExtractionRequest, LinkExtractionResponse,
    TtsRequest,
};
use super::{Backend, BackendError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpBackend {
    client: ReqwestClient,
    base_url: String,
    health_timeout: Duration,
}

impl HttpBackend {
    /// `health_timeout` bounds a single health check; keep it within the poll
    /// interval so a hanging backend cannot hold back the next one.
    pub fn new(base_url: &str, health_timeout: Duration) -> anyhow::Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build the HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            health_timeout: health_timeout.min(REQUEST_TIMEOUT),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Backend for HttpBackend {
    async fn health(&self) -> Result<(), BackendError> {
        let resp = self
            .client
            .get(self.url("/health"))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(connect_error)?;
        successful(resp).map(|_| ())
    }

    async fn process_command(&self, command: &str) -> Result<CommandResult, BackendError> {
        let resp = self
            .client
            .post(self.url("/process-command"))
            .json(&CommandRequest { command })
            .send()
            .await
            .map_err(connect_error)?;
        decode(successful(resp)?).await
    }

    async fn text_to_speech(&self, request: &TtsRequest<'_>) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(self.url("/text-to-speech"))
            .json(request)
            .send()
            .await
            .map_err(connect_error)?;
        successful(resp).map(|_| ())
    }

    async fn extract_handoff_link(&self, message: &str) -> Result<Option<String>, BackendError> {
        let resp = self
            .client
            .post(self.url("/extract-whatsapp-url"))
            .json(&LinkExtractionRequest { message })
            .send()
            .await
            .map_err(connect_error)?;
        let body: LinkExtractionResponse = decode(successful(resp)?).await?;
        Ok(body.whatsapp_url.filter(|url| !url.trim().is_empty()))
    }

    async fn agents(&self) -> Result<Vec<String>, BackendError> {
        let resp = self
            .client
            .get(self.url("/agents"))
            .send()
            .await
            .map_err(connect_error)?;
        let body: AgentsResponse = decode(successful(resp)?).await?;
        Ok(body.agents)
    }
}

fn connect_error(err: reqwest::Error) -> BackendError {
    BackendError::Connect(err.to_string())
}

fn successful(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(BackendError::Status(status.as_u16()))
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, BackendError> {
    let body = resp
        .text()
        .await
        .map_err(|err| BackendError::Connect(err.to_string()))?;
    serde_json::from_str(&body).map_err(|err| BackendError::Decode(err.to_string()))
}
