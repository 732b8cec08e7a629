use std::sync::{Arc, Mutex};

use colored::Colorize;

pub trait Logger: Send {
    fn debug(&self, msg: &str);

    fn info(&self, msg: &str);

    fn warn(&self, msg: &str);

    fn error(&self, msg: &str);
}

pub type SharedLogger = Arc<Mutex<dyn Logger>>;

#[derive(PartialEq, PartialOrd)]
pub enum Level {
    Info,
    Debug,
}

pub struct ConsoleLogger {
    verbosity: Level,
}

impl ConsoleLogger {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        let verbosity = if verbose { Level::Debug } else { Level::Info };
        Self { verbosity }
    }
}

impl Logger for ConsoleLogger {
    fn debug(&self, msg: &str) {
        if self.verbosity >= Level::Debug {
            println!("{}", msg.cyan());
        }
    }

    fn info(&self, msg: &str) {
        println!("{msg}");
    }

    fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }
}

/// Swallows everything. Used when embedding the core without a console.
pub struct NullLogger;

impl Logger for NullLogger {
    fn debug(&self, _msg: &str) {}

    fn info(&self, _msg: &str) {}

    fn warn(&self, _msg: &str) {}

    fn error(&self, _msg: &str) {}
}

pub fn shared<L: Logger + 'static>(logger: L) -> SharedLogger {
    Arc::new(Mutex::new(logger))
}

// A poisoned lock still logs.
pub fn with_logger(logger: &SharedLogger, f: impl FnOnce(&dyn Logger)) {
    let guard = match logger.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&*guard);
}
