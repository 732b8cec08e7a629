use std::time::Duration;

use serde::Serialize;

use crate::backend::BackendError;
use crate::logger::{SharedLogger, with_logger};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    #[default]
    Checking,
    Online,
    Offline,
}

impl BackendStatus {
    #[must_use]
    pub fn is_online(self) -> bool {
        self == Self::Online
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Checking => "Connecting...",
            Self::Online => "Ready to help",
            Self::Offline => "Backend offline",
        }
    }
}

/// Tracks backend liveness from fixed-interval health checks. There is no
/// backoff: the caller keeps checking at [`StatusMonitor::interval`] no matter
/// how many checks failed in a row.
pub struct StatusMonitor {
    status: BackendStatus,
    interval: Duration,
    logger: SharedLogger,
}

impl StatusMonitor {
    #[must_use]
    pub fn new(interval: Duration, logger: SharedLogger) -> Self {
        Self {
            status: BackendStatus::Checking,
            interval,
            logger,
        }
    }

    #[must_use]
    pub fn status(&self) -> BackendStatus {
        self.status
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn record_health(&mut self, outcome: &Result<(), BackendError>) -> BackendStatus {
        match outcome {
            Ok(()) => self.set(BackendStatus::Online),
            Err(err) => {
                if self.status != BackendStatus::Offline {
                    with_logger(&self.logger, |l| l.warn(&format!("Health check failed: {err}")));
                }
                self.set(BackendStatus::Offline)
            }
        }
    }

    /// A command could not reach the backend; don't wait for the next health check.
    pub fn mark_offline(&mut self) {
        self.set(BackendStatus::Offline);
    }

    fn set(&mut self, status: BackendStatus) -> BackendStatus {
        if self.status != status {
            with_logger(&self.logger, |l| {
                l.debug(&format!("Backend status {:?} -> {status:?}", self.status));
            });
            self.status = status;
        }
        status
    }
}
