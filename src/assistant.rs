//! The orchestration context. One [`Assistant`] owns every coordination
//! component and runs them on a single task: user input, pushed results,
//! backend round-trips, the status poll and the presentation deadlines are
//! all interleaved by one `select!` loop, so no two handlers ever run at the
//! same time.
//!
//! Renderers observe the outcome through [`Assistant::subscribe`],
//! [`Assistant::status`] and the [`Notice`] stream.

use std::rc::Rc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::{FutureExt, LocalBoxFuture};
use futures_util::stream::FuturesUnordered;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::backend::{Backend, BackendError, CommandResult, TtsRequest};
use crate::config::Timings;
use crate::executor::{CommandExecutor, Execution, PendingCommand};
use crate::history::{CommandHistory, CommandHistoryItem};
use crate::logger::{SharedLogger, with_logger};
use crate::presentation::{Effect, PresentationController, PresentationState};
use crate::result_channel::{Accepted, Generation, ResultChannel, Ticket};
use crate::sound::{SoundCue, SoundEmitter};
use crate::speech::{CaptureError, CaptureOutcome, SpeechCapture, SpeechEngine, SpeechEvent};
use crate::status::{BackendStatus, StatusMonitor};

const VOICE_SPEED: f32 = 1.0;

pub struct Settings {
    pub poll_interval: Duration,
    pub timings: Timings,
    pub tts_language: String,
    /// Read successful results aloud through the backend.
    pub speak_results: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            timings: Timings::default(),
            tts_language: "en".to_owned(),
            speak_results: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserInput {
    Submit(String),
    StartVoice,
    Dismiss,
    ConfirmHandoff,
    DeclineHandoff,
    /// Agent shortcut: remember the agent and run its command.
    SelectAgent {
        agent_id: String,
        command: String,
    },
    ListAgents,
    ShowHistory,
}

/// One-off messages for the user, next to the continuously published state.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    Feedback(String),
    Transcript(String),
    Agents(Vec<String>),
    History(Vec<CommandHistoryItem>),
    OpenLink(String),
}

pub struct Assistant<B, E, S> {
    backend: B,
    core: Core<E, S>,
}

/// Everything except the backend, which the running jobs borrow.
struct Core<E, S> {
    capture: SpeechCapture<E>,
    sounds: S,
    monitor: StatusMonitor,
    executor: CommandExecutor,
    channel: ResultChannel,
    history: CommandHistory,
    presentation: PresentationController,
    tts_language: String,
    speak_results: bool,
    logger: SharedLogger,
    state_tx: watch::Sender<PresentationState>,
    status_tx: watch::Sender<BackendStatus>,
    notices: mpsc::UnboundedSender<Notice>,
}

enum Job<E> {
    HealthCheck,
    Execute(Ticket, PendingCommand),
    Listen(Rc<E>),
    ResolveLink(Generation, String),
    Speak { text: String, language: String },
    ListAgents,
}

enum Completion {
    Health(Result<(), BackendError>),
    Executed(Ticket, Execution),
    Heard(SpeechEvent),
    LinkResolved(Generation, Option<String>),
    Spoken(Result<(), BackendError>),
    Agents(Result<Vec<String>, BackendError>),
}

impl<B, E, S> Assistant<B, E, S>
where
    B: Backend,
    E: SpeechEngine + 'static,
    S: SoundEmitter,
{
    pub fn new(
        backend: B,
        capture: SpeechCapture<E>,
        sounds: S,
        settings: Settings,
        logger: SharedLogger,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, notices_rx) = mpsc::unbounded_channel();
        let core = Core {
            capture,
            sounds,
            monitor: StatusMonitor::new(settings.poll_interval, logger.clone()),
            executor: CommandExecutor::new(logger.clone()),
            channel: ResultChannel::new(),
            history: CommandHistory::new(),
            presentation: PresentationController::new(settings.timings),
            tts_language: settings.tts_language,
            speak_results: settings.speak_results,
            logger,
            state_tx: watch::Sender::new(PresentationState::default()),
            status_tx: watch::Sender::new(BackendStatus::Checking),
            notices,
        };

        (Self { backend, core }, notices_rx)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PresentationState> {
        self.core.state_tx.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> watch::Receiver<BackendStatus> {
        self.core.status_tx.subscribe()
    }

    /// Runs until `inputs` is closed. In-flight requests are dropped on the
    /// way out.
    pub async fn run(
        self,
        mut inputs: mpsc::Receiver<UserInput>,
        pushes: mpsc::Receiver<CommandResult>,
    ) {
        let Self { backend, mut core } = self;
        let mut pushes = Some(pushes);
        let mut pending: FuturesUnordered<LocalBoxFuture<'_, Completion>> =
            FuturesUnordered::new();
        let mut poll = time::interval(core.monitor.interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut checking_health = false;

        loop {
            let deadline = core.presentation.next_deadline();

            let jobs = tokio::select! {
                _ = poll.tick(), if !checking_health => {
                    checking_health = true;
                    vec![Job::HealthCheck]
                }
                input = inputs.recv() => match input {
                    Some(input) => core.on_input(input),
                    None => break,
                },
                pushed = next_push(&mut pushes) => match pushed {
                    Some(result) => core.on_push(result),
                    None => {
                        with_logger(&core.logger, |l| l.debug("Push channel closed"));
                        pushes = None;
                        Vec::new()
                    }
                },
                Some(done) = pending.next(), if !pending.is_empty() => {
                    if matches!(done, Completion::Health(_)) {
                        checking_health = false;
                    }
                    core.on_completion(done)
                }
                () = wait_until(deadline) => core.on_deadline(),
            };

            for job in jobs {
                pending.push(run_job(&backend, job));
            }
            core.publish();
        }
    }
}

impl<E: SpeechEngine, S: SoundEmitter> Core<E, S> {
    fn on_input(&mut self, input: UserInput) -> Vec<Job<E>> {
        let now = Instant::now();
        match input {
            UserInput::Submit(text) => self.submit(&text),
            UserInput::StartVoice => self.start_voice(),
            UserInput::Dismiss => {
                self.presentation.dismiss(now);
                Vec::new()
            }
            UserInput::ConfirmHandoff => {
                let effects = self.presentation.confirm_handoff(now);
                self.apply(effects)
            }
            UserInput::DeclineHandoff => {
                self.presentation.decline_handoff(now);
                Vec::new()
            }
            UserInput::SelectAgent { agent_id, command } => {
                self.presentation.select_agent(agent_id);
                self.submit(&command)
            }
            UserInput::ListAgents => vec![Job::ListAgents],
            UserInput::ShowHistory => {
                self.notify(Notice::History(self.history.items().cloned().collect()));
                Vec::new()
            }
        }
    }

    fn submit(&mut self, text: &str) -> Vec<Job<E>> {
        let Some(pending) = self.executor.prepare(text, self.monitor.status()) else {
            with_logger(&self.logger, |l| {
                l.debug(&format!(
                    "Command not sent (status: {:?}, processing: {})",
                    self.monitor.status(),
                    self.executor.is_processing()
                ));
            });
            return Vec::new();
        };

        with_logger(&self.logger, |l| l.info(&format!("Sending command: {}", pending.command())));
        let ticket = self.channel.begin(pending.command());
        vec![Job::Execute(ticket, pending)]
    }

    fn start_voice(&mut self) -> Vec<Job<E>> {
        match self
            .capture
            .start(self.monitor.status(), self.executor.is_processing())
        {
            Ok(engine) => {
                self.sounds.play(SoundCue::Start);
                vec![Job::Listen(engine)]
            }
            Err(err @ CaptureError::Unsupported(_)) => {
                self.notify(Notice::Feedback(err.to_string()));
                Vec::new()
            }
            Err(err) => {
                with_logger(&self.logger, |l| l.debug(&format!("Voice capture refused: {err}")));
                Vec::new()
            }
        }
    }

    fn on_push(&mut self, result: CommandResult) -> Vec<Job<E>> {
        match self.channel.push(result) {
            Some(accepted) => self.accept(accepted),
            None => {
                with_logger(&self.logger, |l| l.debug("Dropped duplicate pushed result"));
                Vec::new()
            }
        }
    }

    fn on_completion(&mut self, done: Completion) -> Vec<Job<E>> {
        let now = Instant::now();
        match done {
            Completion::Health(outcome) => {
                self.monitor.record_health(&outcome);
                Vec::new()
            }
            Completion::Executed(ticket, execution) => {
                if matches!(&execution, Execution::Failed(err) if err.is_connectivity()) {
                    self.monitor.mark_offline();
                }
                match self.channel.complete(ticket, execution.into_result()) {
                    Some(accepted) => self.accept(accepted),
                    None => Vec::new(),
                }
            }
            Completion::Heard(event) => match self.capture.finish(event) {
                CaptureOutcome::Transcript(text) => {
                    self.notify(Notice::Transcript(text.clone()));
                    self.sounds.play(SoundCue::Processing);
                    self.submit(&text)
                }
                CaptureOutcome::Feedback(message) => {
                    self.notify(Notice::Feedback(message));
                    Vec::new()
                }
            },
            Completion::LinkResolved(generation, link) => {
                let effects = self.presentation.link_resolved(generation, link, now);
                self.apply(effects)
            }
            Completion::Spoken(outcome) => {
                if let Err(err) = outcome {
                    with_logger(&self.logger, |l| {
                        l.debug(&format!("Text-to-speech failed: {err}"));
                    });
                }
                Vec::new()
            }
            Completion::Agents(Ok(agents)) => {
                self.notify(Notice::Agents(agents));
                Vec::new()
            }
            Completion::Agents(Err(err)) => {
                with_logger(&self.logger, |l| l.warn(&format!("Could not list agents: {err}")));
                if err.is_connectivity() {
                    self.monitor.mark_offline();
                }
                Vec::new()
            }
        }
    }

    fn on_deadline(&mut self) -> Vec<Job<E>> {
        let effects = self.presentation.tick(Instant::now());
        self.apply(effects)
    }

    fn accept(&mut self, accepted: Accepted) -> Vec<Job<E>> {
        let Accepted {
            generation,
            command,
            result,
            solicited,
        } = accepted;

        self.history
            .record(CommandHistoryItem::now(command, result.clone()));
        let effects = self
            .presentation
            .accept(generation, result, solicited, Instant::now());
        self.apply(effects)
    }

    fn apply(&mut self, effects: Vec<Effect>) -> Vec<Job<E>> {
        let mut jobs = Vec::new();
        for effect in effects {
            match effect {
                Effect::Play(cue) => self.sounds.play(cue),
                Effect::ResolveLink {
                    generation,
                    message,
                } => jobs.push(Job::ResolveLink(generation, message)),
                Effect::Announce(text) if self.speak_results => jobs.push(Job::Speak {
                    text,
                    language: self.tts_language.clone(),
                }),
                Effect::Announce(_) => (),
                Effect::OpenLink(link) => self.notify(Notice::OpenLink(link)),
            }
        }
        jobs
    }

    fn notify(&self, notice: Notice) {
        // nobody listening is fine
        let _ = self.notices.send(notice);
    }

    fn publish(&self) {
        let state = self
            .presentation
            .snapshot(self.executor.is_processing(), self.capture.is_listening());
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });

        let status = self.monitor.status();
        self.status_tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }
}

fn run_job<'a, B, E>(backend: &'a B, job: Job<E>) -> LocalBoxFuture<'a, Completion>
where
    B: Backend,
    E: SpeechEngine + 'a,
{
    async move {
        match job {
            Job::HealthCheck => Completion::Health(backend.health().await),
            Job::Execute(ticket, pending) => {
                Completion::Executed(ticket, pending.send(backend).await)
            }
            Job::Listen(engine) => Completion::Heard(engine.recognize().await),
            Job::ResolveLink(generation, message) => {
                let link = backend.extract_handoff_link(&message).await.ok().flatten();
                Completion::LinkResolved(generation, link)
            }
            Job::Speak { text, language } => {
                let request = TtsRequest {
                    text: &text,
                    language: &language,
                    voice_speed: VOICE_SPEED,
                };
                Completion::Spoken(backend.text_to_speech(&request).await)
            }
            Job::ListAgents => Completion::Agents(backend.agents().await),
        }
    }
    .boxed_local()
}

async fn next_push(pushes: &mut Option<mpsc::Receiver<CommandResult>>) -> Option<CommandResult> {
    match pushes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crate::executor::tests::{MockBackend, result};
    use crate::logger::{NullLogger, shared};
    use crate::sound::Silent;
    use crate::speech::tests::ScriptedEngine;

    use super::*;

    const WHATSAPP_LINK: &str = "https://wa.me/15551234567?text=running%20late";

    #[derive(Clone, Default)]
    struct RecordedSounds(Rc<RefCell<Vec<SoundCue>>>);

    impl SoundEmitter for RecordedSounds {
        fn play(&self, cue: SoundCue) {
            self.0.borrow_mut().push(cue);
        }
    }

    struct Harness<S> {
        assistant: Assistant<MockBackend, ScriptedEngine, S>,
        notices: mpsc::UnboundedReceiver<Notice>,
        state: watch::Receiver<PresentationState>,
        status: watch::Receiver<BackendStatus>,
    }

    fn harness<S: SoundEmitter>(
        backend: &MockBackend,
        capture: SpeechCapture<ScriptedEngine>,
        sounds: S,
        settings: Settings,
    ) -> Harness<S> {
        let (assistant, notices) =
            Assistant::new(backend.clone(), capture, sounds, settings, shared(NullLogger));
        let state = assistant.subscribe();
        let status = assistant.status();
        Harness {
            assistant,
            notices,
            state,
            status,
        }
    }

    fn no_speech() -> SpeechCapture<ScriptedEngine> {
        SpeechCapture::new(ScriptedEngine::new([]))
    }

    fn whatsapp() -> CommandResult {
        result(
            "WhatsAppAgent",
            "whatsapp_send",
            &format!("Message ready: {WHATSAPP_LINK}"),
        )
    }

    fn snapshot(state: &watch::Receiver<PresentationState>) -> PresentationState {
        state.borrow().clone()
    }

    fn drain(notices: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
        let mut all = Vec::new();
        while let Ok(notice) = notices.try_recv() {
            all.push(notice);
        }
        all
    }

    async fn sleep_ms(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn whatsapp_result_is_handed_off_after_grace() {
        let backend = MockBackend::online();
        backend.answer(Ok(whatsapp()));
        let sounds = RecordedSounds::default();
        let Harness {
            assistant,
            mut notices,
            state,
            status,
        } = harness(&backend, no_speech(), sounds.clone(), Settings::default());
        let (inputs, inputs_rx) = mpsc::channel(8);
        let (_pushes, pushes_rx) = mpsc::channel(8);

        let script = async move {
            sleep_ms(10).await;
            assert_eq!(*status.borrow(), BackendStatus::Online);

            inputs
                .send(UserInput::Submit("Send WhatsApp to Mom: running late".to_owned()))
                .await
                .unwrap();
            sleep_ms(100).await;
            let shown = snapshot(&state);
            assert!(shown.show_results);
            assert!(!shown.show_whatsapp_popup);
            assert!(!shown.is_processing);

            sleep_ms(1500).await;
            assert!(snapshot(&state).show_whatsapp_popup);

            inputs.send(UserInput::ConfirmHandoff).await.unwrap();
            sleep_ms(10).await;
            let closed = snapshot(&state);
            assert!(!closed.show_results);
            assert!(!closed.show_whatsapp_popup);
        };
        tokio::join!(assistant.run(inputs_rx, pushes_rx), script);

        assert_eq!(drain(&mut notices), vec![Notice::OpenLink(WHATSAPP_LINK.to_owned())]);
        assert_eq!(
            *sounds.0.borrow(),
            vec![SoundCue::Success, SoundCue::Notification]
        );
        assert_eq!(backend.0.extraction_requests.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn calendar_result_auto_hides_without_handoff() {
        let backend = MockBackend::online();
        backend.answer(Ok(result("CalendarAgent", "calendar", "Reminder set for 13:00")));
        let Harness {
            assistant,
            state,
            ..
        } = harness(&backend, no_speech(), Silent, Settings::default());
        let (inputs, inputs_rx) = mpsc::channel(8);
        let (_pushes, pushes_rx) = mpsc::channel(8);

        let script = async move {
            sleep_ms(10).await;
            inputs
                .send(UserInput::Submit("Remind me to call in 1 hour".to_owned()))
                .await
                .unwrap();
            sleep_ms(2000).await;
            let shown = snapshot(&state);
            assert!(shown.show_results);
            assert!(!shown.show_whatsapp_popup);

            sleep_ms(3100).await;
            assert!(!snapshot(&state).show_results);
            sleep_ms(600).await;
            assert!(snapshot(&state).last_result.is_none());
        };
        tokio::join!(assistant.run(inputs_rx, pushes_rx), script);

        assert_eq!(backend.commands(), vec!["Remind me to call in 1 hour"]);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_backend_gets_no_commands() {
        let backend = MockBackend::default();
        let Harness {
            assistant,
            mut notices,
            state,
            status,
        } = harness(&backend, no_speech(), Silent, Settings::default());
        let (inputs, inputs_rx) = mpsc::channel(8);
        let (_pushes, pushes_rx) = mpsc::channel(8);

        let script = async move {
            sleep_ms(10).await;
            assert_eq!(*status.borrow(), BackendStatus::Offline);

            inputs.send(UserInput::Submit("Call Mom".to_owned())).await.unwrap();
            inputs.send(UserInput::StartVoice).await.unwrap();
            inputs.send(UserInput::ShowHistory).await.unwrap();
            sleep_ms(100).await;
            let current = snapshot(&state);
            assert!(!current.show_results);
            assert!(!current.is_listening);
        };
        tokio::join!(assistant.run(inputs_rx, pushes_rx), script);

        assert!(backend.commands().is_empty());
        assert_eq!(drain(&mut notices), vec![Notice::History(Vec::new())]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_push_cannot_reopen_a_dismissed_banner() {
        let backend = MockBackend::online();
        backend.answer(Ok(whatsapp()));
        let Harness {
            assistant,
            mut notices,
            state,
            ..
        } = harness(&backend, no_speech(), Silent, Settings::default());
        let (inputs, inputs_rx) = mpsc::channel(8);
        let (pushes, pushes_rx) = mpsc::channel(8);

        let script = async move {
            sleep_ms(10).await;
            inputs.send(UserInput::Submit("Send WhatsApp".to_owned())).await.unwrap();
            sleep_ms(100).await;
            inputs.send(UserInput::Dismiss).await.unwrap();
            inputs.send(UserInput::Dismiss).await.unwrap();
            sleep_ms(10).await;
            let closing = snapshot(&state);
            assert!(closing.is_manually_closing);
            assert!(!closing.show_results);

            pushes.send(whatsapp()).await.unwrap();
            pushes
                .send(result("CalendarAgent", "calendar", "Meeting in 10 minutes"))
                .await
                .unwrap();
            sleep_ms(100).await;
            assert!(!snapshot(&state).show_results);
            assert!(!snapshot(&state).show_whatsapp_popup);

            sleep_ms(500).await;
            assert!(!snapshot(&state).is_manually_closing);
            assert!(!snapshot(&state).show_results);

            pushes
                .send(result("CalendarAgent", "calendar", "Meeting moved to 15:00"))
                .await
                .unwrap();
            sleep_ms(10).await;
            let reopened = snapshot(&state);
            assert!(reopened.show_results);
            assert_eq!(reopened.last_result.unwrap().message, "Meeting moved to 15:00");

            inputs.send(UserInput::ShowHistory).await.unwrap();
            sleep_ms(10).await;
        };
        tokio::join!(assistant.run(inputs_rx, pushes_rx), script);

        let Some(Notice::History(items)) = drain(&mut notices).pop() else {
            panic!("expected the history notice");
        };
        let messages: Vec<_> = items.iter().map(|it| it.result.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Meeting moved to 15:00",
                "Meeting in 10 minutes",
                "Message ready: https://wa.me/15551234567?text=running%20late",
            ]
        );
        assert_eq!(items[2].command, "Send WhatsApp");
    }

    #[tokio::test(start_paused = true)]
    async fn voice_transcript_is_submitted() {
        let backend = MockBackend::online();
        backend.answer(Ok(result("CalendarAgent", "calendar", "Reminder set")));
        let capture = SpeechCapture::new(ScriptedEngine::new([SpeechEvent::Transcript(
            " Remind me to call in 1 hour ".to_owned(),
        )]));
        let sounds = RecordedSounds::default();
        let Harness {
            assistant,
            mut notices,
            state,
            ..
        } = harness(&backend, capture, sounds.clone(), Settings::default());
        let (inputs, inputs_rx) = mpsc::channel(8);
        let (_pushes, pushes_rx) = mpsc::channel(8);

        let script = async move {
            sleep_ms(10).await;
            inputs.send(UserInput::StartVoice).await.unwrap();
            sleep_ms(10).await;
            assert!(snapshot(&state).show_results);
            assert!(!snapshot(&state).is_listening);

            inputs.send(UserInput::StartVoice).await.unwrap();
            sleep_ms(10).await;
        };
        tokio::join!(assistant.run(inputs_rx, pushes_rx), script);

        assert_eq!(backend.commands(), vec!["Remind me to call in 1 hour"]);
        assert_eq!(
            drain(&mut notices),
            vec![
                Notice::Transcript("Remind me to call in 1 hour".to_owned()),
                Notice::Feedback("No speech detected. Please try again.".to_owned()),
            ]
        );
        assert_eq!(
            *sounds.0.borrow(),
            vec![
                SoundCue::Start,
                SoundCue::Processing,
                SoundCue::Success,
                SoundCue::Start
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_speech_is_reported_to_the_user() {
        let backend = MockBackend::online();
        let Harness {
            assistant,
            mut notices,
            ..
        } = harness(
            &backend,
            SpeechCapture::unsupported("no OpenAI key configured"),
            Silent,
            Settings::default(),
        );
        let (inputs, inputs_rx) = mpsc::channel(8);
        let (_pushes, pushes_rx) = mpsc::channel(8);

        let script = async move {
            sleep_ms(10).await;
            inputs.send(UserInput::StartVoice).await.unwrap();
            sleep_ms(10).await;
        };
        tokio::join!(assistant.run(inputs_rx, pushes_rx), script);

        let notices = drain(&mut notices);
        assert_eq!(notices.len(), 1);
        assert!(
            matches!(&notices[0], Notice::Feedback(msg) if msg.contains("no OpenAI key configured"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_failure_degrades_until_the_next_health_check() {
        let backend = MockBackend::online();
        backend.answer(Err(BackendError::Connect("connection reset".to_owned())));
        let Harness {
            assistant,
            state,
            status,
            ..
        } = harness(&backend, no_speech(), Silent, Settings::default());
        let (inputs, inputs_rx) = mpsc::channel(8);
        let (_pushes, pushes_rx) = mpsc::channel(8);

        let script = async move {
            sleep_ms(10).await;
            inputs.send(UserInput::Submit("Call Mom".to_owned())).await.unwrap();
            sleep_ms(10).await;
            assert_eq!(*status.borrow(), BackendStatus::Offline);
            let current = snapshot(&state);
            assert!(!current.is_processing);
            assert!(!current.show_results);

            sleep_ms(10_000).await;
            assert_eq!(*status.borrow(), BackendStatus::Online);
        };
        tokio::join!(assistant.run(inputs_rx, pushes_rx), script);

        assert_eq!(backend.commands(), vec!["Call Mom"]);
    }

    #[tokio::test(start_paused = true)]
    async fn agent_shortcut_and_announcements() {
        let backend = MockBackend::online();
        backend.answer(Ok(result("CalendarAgent", "calendar", "You have 2 meetings")));
        let settings = Settings {
            speak_results: true,
            ..Settings::default()
        };
        let Harness {
            assistant,
            mut notices,
            state,
            ..
        } = harness(&backend, no_speech(), Silent, settings);
        let (inputs, inputs_rx) = mpsc::channel(8);
        let (_pushes, pushes_rx) = mpsc::channel(8);

        let script = async move {
            sleep_ms(10).await;
            inputs
                .send(UserInput::SelectAgent {
                    agent_id: "calendar".to_owned(),
                    command: "What's on my calendar today?".to_owned(),
                })
                .await
                .unwrap();
            inputs.send(UserInput::ListAgents).await.unwrap();
            sleep_ms(10).await;
            let current = snapshot(&state);
            assert_eq!(current.current_agent_id.as_deref(), Some("calendar"));
            assert!(current.show_results);
        };
        tokio::join!(assistant.run(inputs_rx, pushes_rx), script);

        assert_eq!(backend.commands(), vec!["What's on my calendar today?"]);
        assert_eq!(*backend.0.spoken.borrow(), vec!["You have 2 meetings"]);
        assert_eq!(
            drain(&mut notices),
            vec![Notice::Agents(vec!["whatsapp".to_owned(), "calendar".to_owned()])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn handoff_link_is_fetched_from_the_backend_as_last_resort() {
        let backend = MockBackend::online();
        backend.answer(Ok(result(
            "WhatsAppAgent",
            "whatsapp_send",
            "Your message to Mom is ready",
        )));
        *backend.0.extracted_link.borrow_mut() =
            Some("https://wa.me/15551234567?text=hi".to_owned());
        let Harness {
            assistant,
            mut notices,
            state,
            ..
        } = harness(&backend, no_speech(), Silent, Settings::default());
        let (inputs, inputs_rx) = mpsc::channel(8);
        let (_pushes, pushes_rx) = mpsc::channel(8);

        let script = async move {
            sleep_ms(10).await;
            inputs.send(UserInput::Submit("Text Mom hi".to_owned())).await.unwrap();
            sleep_ms(1600).await;
            assert!(snapshot(&state).show_whatsapp_popup);
            inputs.send(UserInput::ConfirmHandoff).await.unwrap();
            sleep_ms(10).await;
        };
        tokio::join!(assistant.run(inputs_rx, pushes_rx), script);

        assert_eq!(backend.0.extraction_requests.get(), 1);
        assert_eq!(
            drain(&mut notices),
            vec![Notice::OpenLink("https://wa.me/15551234567?text=hi".to_owned())]
        );
    }
}
