use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::backend::{Backend, BackendError, CommandResult};
use crate::logger::{SharedLogger, with_logger};
use crate::status::BackendStatus;

/// The in-flight flag. Raising it hands out a [`ProcessingGuard`] that lowers
/// it again when dropped, whether the command finished, failed or was
/// abandoned.
#[derive(Clone, Default)]
pub struct ProcessingFlag {
    raised: Arc<AtomicBool>,
}

impl ProcessingFlag {
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Relaxed)
    }

    fn raise(&self) -> ProcessingGuard {
        self.raised.store(true, Ordering::Relaxed);
        ProcessingGuard(self.clone())
    }
}

pub struct ProcessingGuard(ProcessingFlag);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.raised.store(false, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub enum Execution {
    Completed(CommandResult),
    /// Already logged. Carries the error so the caller can tell a dead
    /// backend from an unusable answer.
    Failed(BackendError),
}

impl Execution {
    #[must_use]
    pub fn into_result(self) -> Option<CommandResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Failed(_) => None,
        }
    }
}

/// A command that passed the preconditions. The processing flag stays raised
/// for as long as this value (or the future sending it) is alive.
pub struct PendingCommand {
    command: String,
    logger: SharedLogger,
    _guard: ProcessingGuard,
}

impl PendingCommand {
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    pub async fn send<B: Backend>(self, backend: &B) -> Execution {
        match backend.process_command(&self.command).await {
            Ok(result) => {
                with_logger(&self.logger, |l| {
                    l.debug(&format!(
                        "Command processed - success: {}, agent: {}, intent: {}",
                        result.success, result.agent_used, result.intent
                    ));
                });
                Execution::Completed(result)
            }
            Err(err) => {
                with_logger(&self.logger, |l| {
                    l.error(&format!("Error sending command '{}': {err}", self.command));
                });
                Execution::Failed(err)
            }
        }
    }
}

pub struct CommandExecutor {
    flag: ProcessingFlag,
    logger: SharedLogger,
}

impl CommandExecutor {
    #[must_use]
    pub fn new(logger: SharedLogger) -> Self {
        Self {
            flag: ProcessingFlag::default(),
            logger,
        }
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.flag.is_raised()
    }

    /// Checks the preconditions and raises the processing flag. `None` when
    /// the text is blank, the backend is not online or a command is already
    /// in flight.
    #[must_use]
    pub fn prepare(&self, text: &str, status: BackendStatus) -> Option<PendingCommand> {
        let command = text.trim();
        if command.is_empty() || !status.is_online() || self.is_processing() {
            return None;
        }

        Some(PendingCommand {
            command: command.to_owned(),
            logger: self.logger.clone(),
            _guard: self.flag.raise(),
        })
    }
}
