//! The agent backend as seen by the client: a small HTTP surface plus an
//! optional websocket that pushes results on its own schedule.
//!
//! [`Backend`] abstracts over the transport so the coordination core can be
//! driven by [`http::HttpBackend`] in production and by scripted doubles in
//! tests.

pub mod http;
pub mod model;
pub mod push;

use std::future::Future;

pub use model::{CommandResult, TtsRequest};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("could not reach the backend: {0}")]
    Connect(String),

    #[error("backend answered with HTTP status {0}")]
    Status(u16),

    #[error("backend response could not be decoded: {0}")]
    Decode(String),
}

impl BackendError {
    /// Connectivity failures degrade the backend status; the other kinds
    /// mean the backend is up but produced nothing usable.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

pub trait Backend {
    /// `GET /health`. Any 2xx answer is healthy.
    fn health(&self) -> impl Future<Output = Result<(), BackendError>>;

    /// `POST /process-command`.
    fn process_command(
        &self,
        command: &str,
    ) -> impl Future<Output = Result<CommandResult, BackendError>>;

    /// `POST /text-to-speech`. The acknowledgement payload is not needed.
    fn text_to_speech(
        &self,
        request: &TtsRequest<'_>,
    ) -> impl Future<Output = Result<(), BackendError>>;

    /// `POST /extract-whatsapp-url`. `Ok(None)` means the backend found no
    /// link either.
    fn extract_handoff_link(
        &self,
        message: &str,
    ) -> impl Future<Output = Result<Option<String>, BackendError>>;

    /// `GET /agents`.
    fn agents(&self) -> impl Future<Output = Result<Vec<String>, BackendError>>;
}
