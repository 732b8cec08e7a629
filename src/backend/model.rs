use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one command as reported by the backend, either as the reply to
/// `POST /process-command` or as a pushed `command_result`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub agent_used: String,
    #[serde(default)]
    pub timestamp: String,
    // pushed results call this `results`
    #[serde(default, alias = "results", skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    /// The error reported either at top level or inside `details`.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.detail_str("error"))
            .filter(|e| !e.trim().is_empty())
    }

    /// A hand-off link carried in a dedicated field rather than in the text.
    #[must_use]
    pub fn explicit_handoff_link(&self) -> Option<&str> {
        self.whatsapp_url
            .as_deref()
            .or_else(|| self.detail_str("whatsapp_url"))
    }

    /// The command text the backend echoes back in `details`, if any.
    #[must_use]
    pub fn original_command(&self) -> Option<&str> {
        self.detail_str("original_command")
    }

    fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.as_ref()?.get(key)?.as_str()
    }
}

#[derive(Serialize)]
pub struct CommandRequest<'a> {
    pub command: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct TtsRequest<'a> {
    pub text: &'a str,
    pub language: &'a str,
    pub voice_speed: f32,
}

#[derive(Serialize)]
pub struct LinkExtractionRequest<'a> {
    pub message: &'a str,
}

#[derive(Deserialize)]
pub struct LinkExtractionResponse {
    #[serde(default)]
    pub whatsapp_url: Option<String>,
}

#[derive(Deserialize)]
pub struct AgentsResponse {
    #[serde(default)]
    pub agents: Vec<String>,
}

/* Websocket messages */

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    #[serde(rename = "command_result")]
    CommandResult { data: CommandResult },

    #[serde(rename = "pong")]
    Pong { timestamp: Option<String> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "ping")]
    Ping,
}
