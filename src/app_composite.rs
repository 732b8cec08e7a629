use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    assistant::{Assistant, Notice, Settings},
    backend::http::HttpBackend,
    config::Config,
    logger::{self, ConsoleLogger, SharedLogger, with_logger},
    sound::TerminalChime,
    speech::{SpeechCapture, realtime::RealtimeTranscriber},
};

pub struct AppComposite {
    pub assistant: Assistant<HttpBackend, RealtimeTranscriber, TerminalChime>,
    pub notices: UnboundedReceiver<Notice>,
    pub logger: SharedLogger,
}

impl AppComposite {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let logger = logger::shared(ConsoleLogger::new(config.verbose));

        let backend = HttpBackend::new(&config.backend_url, config.poll_interval)?;

        let engine = RealtimeTranscriber::new(
            config.openai_key.as_deref(),
            config.recording_file.as_deref(),
            &config.tts_language,
            logger.clone(),
        );
        if let Err(err) = &engine {
            with_logger(&logger, |l| l.info(&format!("Voice input disabled: {err}")));
        }

        let settings = Settings {
            poll_interval: config.poll_interval,
            timings: config.timings,
            tts_language: config.tts_language.clone(),
            speak_results: config.speak_results,
        };
        let (assistant, notices) = Assistant::new(
            backend,
            SpeechCapture::from_result(engine),
            TerminalChime::new(logger.clone()),
            settings,
            logger.clone(),
        );

        Ok(Self {
            assistant,
            notices,
            logger,
        })
    }
}
