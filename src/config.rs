use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;

pub struct Config {
    pub backend_url: String,
    pub push_url: String,
    pub poll_interval: Duration,
    pub timings: Timings,
    pub tts_language: String,
    pub speak_results: bool,
    pub openai_key: Option<String>,
    pub recording_file: Option<PathBuf>,
    pub verbose: bool,
}

/// Delays driving the result banner. See [`crate::presentation`].
#[derive(Clone, Copy, Debug)]
pub struct Timings {
    pub handoff_grace: Duration,
    pub auto_hide: Duration,
    pub settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            handoff_grace: Duration::from_millis(1500),
            auto_hide: Duration::from_millis(5000),
            settle: Duration::from_millis(500),
        }
    }
}

const ENV_PREFIX: &str = "VAANI__";

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const MIN_POLL_SECS: u64 = 10;
const MAX_POLL_SECS: u64 = 30;
/// Upper bound for every UI timing; keeps deadlines representable as `Instant`s.
const MAX_TIMING_MS: u64 = 60_000;

pub fn from_env() -> anyhow::Result<Config> {
    let backend_url = get_opt_env("BACKEND_URL")
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_owned())
        .trim_end_matches('/')
        .to_owned();
    let push_url = match get_opt_env("PUSH_URL") {
        Some(url) => url,
        None => derive_push_url(&backend_url)?,
    };

    let poll_secs = get_parsed_env("POLL_INTERVAL_SECS")?.unwrap_or(MIN_POLL_SECS);
    let poll_interval = Duration::from_secs(poll_secs.clamp(MIN_POLL_SECS, MAX_POLL_SECS));

    let defaults = Timings::default();
    let timings = Timings {
        handoff_grace: timing(get_parsed_env("HANDOFF_GRACE_MS")?, defaults.handoff_grace),
        auto_hide: timing(get_parsed_env("AUTO_HIDE_MS")?, defaults.auto_hide),
        settle: timing(get_parsed_env("SETTLE_MS")?, defaults.settle),
    };

    let recording_file = get_opt_env("RECORDING_FILE")
        .map(|s| PathBuf::from_str(&s).context("Could not parse provided recording file path"))
        .map_or(Ok(None), |v| v.map(Some))?;

    Ok(Config {
        backend_url,
        push_url,
        poll_interval,
        timings,
        tts_language: get_opt_env("TTS_LANGUAGE").unwrap_or_else(|| "en".to_owned()),
        speak_results: get_parsed_env("SPEAK_RESULTS")?.unwrap_or(false),
        openai_key: get_opt_env("OPENAI_KEY"),
        recording_file,
        verbose: get_parsed_env("VERBOSE")?.unwrap_or(false),
    })
}

fn timing(millis: Option<u64>, default: Duration) -> Duration {
    millis.map_or(default, |ms| Duration::from_millis(ms.min(MAX_TIMING_MS)))
}

/// `http://host:8000` becomes `ws://host:8000/ws`.
fn derive_push_url(backend_url: &str) -> anyhow::Result<String> {
    let mut url = url::Url::parse(backend_url)
        .context(format!("{ENV_PREFIX}BACKEND_URL '{backend_url}' is not a valid URL"))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| anyhow::anyhow!("Cannot derive a websocket URL from {backend_url}"))?;
    url.set_path("/ws");
    Ok(url.to_string())
}

fn get_parsed_env<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get_opt_env(key)
        .map(|s| {
            s.trim()
                .parse::<T>()
                .context(format!("Could not parse environment variable {ENV_PREFIX}{key}"))
        })
        .transpose()
}

fn get_opt_env(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}")).ok()
}
