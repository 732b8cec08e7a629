#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

pub mod app_composite;
pub mod assistant;
pub mod backend;
pub mod config;
pub mod console;
pub mod executor;
pub mod history;
pub mod logger;
pub mod presentation;
pub mod result_channel;
pub mod sound;
pub mod speech;
pub mod status;
