//! Transcription through the [Open AI realtime transcription API](https://platform.openai.com/docs/guides/realtime?use-case=transcription).
//!
//! Audio comes from a pre-recorded PCM file (16-bit little-endian, 24kHz,
//! mono) standing in for the microphone.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use base64::prelude::*;
use futures_util::{SinkExt, Stream, StreamExt, future};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, http, protocol::Message},
};

use crate::logger::{SharedLogger, with_logger};

use super::{CaptureError, SpeechEngine, SpeechEvent};

const TRANSCRIPTION_URL: &str = "wss://api.openai.com/v1/realtime?intent=transcription";
const TRANSCRIPTION_MODEL: &str = "gpt-4o-transcribe";
const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(30);
const CHUNK_SIZE: usize = 32 * 1024;

pub struct RealtimeTranscriber {
    api_key: String,
    recording_file: PathBuf,
    language: String,
    logger: SharedLogger,
}

impl RealtimeTranscriber {
    /// Fails with [`CaptureError::Unsupported`] when there is no key or no
    /// audio to transcribe.
    pub fn new(
        api_key: Option<&str>,
        recording_file: Option<&Path>,
        language: &str,
        logger: SharedLogger,
    ) -> Result<Self, CaptureError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CaptureError::Unsupported("no OpenAI API key configured".to_owned()))?;
        let recording_file = recording_file
            .ok_or_else(|| CaptureError::Unsupported("no audio source configured".to_owned()))?;
        if !recording_file.is_file() {
            return Err(CaptureError::Unsupported(format!(
                "audio source {} does not exist",
                recording_file.display()
            )));
        }

        Ok(Self {
            api_key: api_key.to_owned(),
            recording_file: recording_file.to_path_buf(),
            language: language.to_owned(),
            logger,
        })
    }

    async fn transcribe(&self) -> anyhow::Result<Option<String>> {
        let ws_stream = create_ws(&self.api_key).await?;
        let (mut ws_write, ws_read) = ws_stream.split();

        let update = ClientEvent::SessionUpdate {
            session: SessionConfig {
                input_audio_format: "pcm16",
                input_audio_transcription: TranscriptionModel {
                    model: TRANSCRIPTION_MODEL,
                    language: &self.language,
                },
                turn_detection: None,
            },
        };
        ws_write
            .send(Message::Text(serde_json::to_string(&update)?.into()))
            .await
            .context("Failed to configure the transcription session")?;

        let mut file = tokio::fs::File::open(&self.recording_file)
            .await
            .context(format!("Could not open {}", self.recording_file.display()))?;
        let mut buf = vec![0; CHUNK_SIZE];
        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            let append = ClientEvent::Append {
                audio: BASE64_STANDARD.encode(&buf[..read]),
            };
            ws_write
                .feed(Message::Text(serde_json::to_string(&append)?.into()))
                .await
                .context("Could not send audio data")?;
        }
        ws_write
            .send(Message::Text(serde_json::to_string(&ClientEvent::Commit)?.into()))
            .await
            .context("Could not commit the audio buffer")?;

        let logger = self.logger.clone();
        let mut events = Box::pin(to_event_stream(ws_read, logger));
        let wait_for_transcript = async {
            while let Some(event) = events.next().await {
                match event? {
                    ServerEvent::Error { error } => {
                        bail!("Transcription failed with an error from the API: {}", error.message)
                    }
                    ServerEvent::TranscriptionCompleted { transcript } => {
                        return Ok(Some(transcript));
                    }
                    ServerEvent::Other => (),
                }
            }
            Ok::<_, anyhow::Error>(None)
        };

        tokio::time::timeout(TRANSCRIPTION_TIMEOUT, wait_for_transcript)
            .await
            .context("Timed out waiting for a transcript")?
    }
}

impl SpeechEngine for RealtimeTranscriber {
    async fn recognize(&self) -> SpeechEvent {
        match self.transcribe().await {
            Ok(Some(text)) => SpeechEvent::Transcript(text),
            Ok(None) => SpeechEvent::End,
            Err(err) => {
                with_logger(&self.logger, |l| l.error(&format!("Transcription failed: {err:#}")));
                SpeechEvent::Error(err.to_string())
            }
        }
    }
}

fn to_event_stream<S>(
    ws_stream: S,
    logger: SharedLogger,
) -> impl Stream<Item = anyhow::Result<ServerEvent>>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>,
{
    ws_stream.filter_map(move |try_msg| {
        let event = match try_msg {
            Err(_err) => Some(Err(anyhow::Error::msg("Failed to consume websocket stream"))),
            Ok(Message::Text(msg)) => {
                let msg = msg.as_str();
                with_logger(&logger, |l| l.debug(&format!("Received message {msg}")));
                Some(
                    serde_json::from_str::<ServerEvent>(msg)
                        .context(format!("Failed to parse transcription message {msg}")),
                )
            }
            Ok(_) => None,
        };
        future::ready(event)
    })
}

async fn create_ws(api_key: &str) -> anyhow::Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let url = http::Uri::from_str(TRANSCRIPTION_URL)?;
    // into_client_request for Uri will set headers required for websockets
    let mut req = url.into_client_request()?;
    let headers = req.headers_mut();
    let header_val = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .context("Could not create header from OpenAI API key")?;
    headers
        .try_insert("Authorization", header_val)
        .context("Failed to modify transcription websocket request headers")?;
    headers
        .try_insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"))
        .context("Failed to modify transcription websocket request headers")?;

    let (ws_stream, _res) = connect_async(req).await?;
    Ok(ws_stream)
}

/* Transcription messages */

#[derive(Serialize)]
#[serde(tag = "type")]
enum ClientEvent<'a> {
    #[serde(rename = "transcription_session.update")]
    SessionUpdate { session: SessionConfig<'a> },

    #[serde(rename = "input_audio_buffer.append")]
    Append { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    Commit,
}

#[derive(Serialize)]
struct SessionConfig<'a> {
    // input audio must be 16-bit PCM at a 24kHz sample rate, single channel, little-endian
    input_audio_format: &'static str,
    input_audio_transcription: TranscriptionModel<'a>,
    // null turns off server-side VAD; the buffer is committed explicitly
    turn_detection: Option<()>,
}

#[derive(Serialize)]
struct TranscriptionModel<'a> {
    model: &'static str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ErrorDetail },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use crate::logger::{NullLogger, shared};

    use super::*;

    #[test]
    fn missing_key_or_audio_is_unsupported() {
        let logger = shared(NullLogger);

        let no_key = RealtimeTranscriber::new(None, Some(Path::new("/tmp")), "en", logger.clone());
        assert!(matches!(no_key, Err(CaptureError::Unsupported(_))));

        let no_audio = RealtimeTranscriber::new(Some("sk-test"), None, "en", logger.clone());
        assert!(matches!(no_audio, Err(CaptureError::Unsupported(_))));

        let missing_file = RealtimeTranscriber::new(
            Some("sk-test"),
            Some(Path::new("/definitely/not/here.pcm")),
            "en",
            logger,
        );
        assert!(matches!(missing_file, Err(CaptureError::Unsupported(_))));
    }

    #[test]
    fn client_events_match_the_api_shape() {
        let commit = serde_json::to_value(ClientEvent::Commit).unwrap();
        assert_eq!(commit, serde_json::json!({ "type": "input_audio_buffer.commit" }));

        let update = serde_json::to_value(ClientEvent::SessionUpdate {
            session: SessionConfig {
                input_audio_format: "pcm16",
                input_audio_transcription: TranscriptionModel {
                    model: TRANSCRIPTION_MODEL,
                    language: "en",
                },
                turn_detection: None,
            },
        })
        .unwrap();
        assert_eq!(update["type"], "transcription_session.update");
        assert!(update["session"]["turn_detection"].is_null());
    }

    #[test]
    fn unknown_server_events_are_tolerated() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"input_audio_buffer.committed","item_id":"i"}"#)
                .unwrap();
        assert!(matches!(event, ServerEvent::Other));

        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"conversation.item.input_audio_transcription.completed",
                "item_id":"i","content_index":0,"transcript":"Call Mom"}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ServerEvent::TranscriptionCompleted { transcript } if transcript == "Call Mom"
        ));
    }
}
