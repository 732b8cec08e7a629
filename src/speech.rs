//! Speech capture. A [`SpeechEngine`] turns one utterance into a
//! [`SpeechEvent`]; [`SpeechCapture`] wraps it with the preconditions and
//! the single-session rule, and maps every outcome to either a transcript or a
//! user-facing feedback message.

pub mod realtime;

use std::future::Future;
use std::rc::Rc;

use crate::status::BackendStatus;

/// What an engine reports for one capture session. Engines only ever report
/// a final transcript, never interim ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeechEvent {
    Transcript(String),
    Error(String),
    End,
}

pub trait SpeechEngine {
    fn recognize(&self) -> impl Future<Output = SpeechEvent>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Speech recognition not supported: {0}")]
    Unsupported(String),

    #[error("The assistant backend is not online")]
    BackendUnavailable,

    #[error("Already listening")]
    AlreadyListening,

    #[error("Still processing the previous command")]
    Busy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    Transcript(String),
    Feedback(String),
}

pub struct SpeechCapture<E> {
    engine: Result<Rc<E>, CaptureError>,
    listening: bool,
}

impl<E: SpeechEngine> SpeechCapture<E> {
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            engine: Ok(Rc::new(engine)),
            listening: false,
        }
    }

    /// Capture where the platform has no engine. Every start attempt reports
    /// `reason` back to the user.
    #[must_use]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            engine: Err(CaptureError::Unsupported(reason.into())),
            listening: false,
        }
    }

    #[must_use]
    pub fn from_result(engine: Result<E, CaptureError>) -> Self {
        match engine {
            Ok(engine) => Self::new(engine),
            Err(err) => Self {
                engine: Err(err),
                listening: false,
            },
        }
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Enters `listening` and hands out the engine to drive. The caller must
    /// pass the engine's event to [`SpeechCapture::finish`].
    pub fn start(
        &mut self,
        status: BackendStatus,
        processing: bool,
    ) -> Result<Rc<E>, CaptureError> {
        let engine = self.engine.as_ref().map_err(Clone::clone)?;
        if !status.is_online() {
            return Err(CaptureError::BackendUnavailable);
        }
        if self.listening {
            return Err(CaptureError::AlreadyListening);
        }
        if processing {
            return Err(CaptureError::Busy);
        }
        self.listening = true;
        Ok(Rc::clone(engine))
    }

    /// Leaves `listening`. Exactly one outcome per session.
    pub fn finish(&mut self, event: SpeechEvent) -> CaptureOutcome {
        self.listening = false;
        match event {
            SpeechEvent::Transcript(text) if !text.trim().is_empty() => {
                CaptureOutcome::Transcript(text.trim().to_owned())
            }
            SpeechEvent::Transcript(_) | SpeechEvent::End => {
                CaptureOutcome::Feedback("No speech detected. Please try again.".to_owned())
            }
            SpeechEvent::Error(err) => {
                CaptureOutcome::Feedback(format!("Speech recognition error: {err}"))
            }
        }
    }
}
