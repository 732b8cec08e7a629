//! Short audio cues. Purely a side effect: nothing in the core reads back
//! from here.

use std::io::Write;

use crate::logger::{SharedLogger, with_logger};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoundCue {
    Start,
    Processing,
    Success,
    Error,
    Notification,
}

/// One sine beep, `offset_ms` after the cue starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u32,
    pub offset_ms: u32,
}

const fn tone(frequency_hz: u32, duration_ms: u32, offset_ms: u32) -> Tone {
    Tone {
        frequency_hz,
        duration_ms,
        offset_ms,
    }
}

const START: &[Tone] = &[tone(800, 150, 0)];
const PROCESSING: &[Tone] = &[tone(600, 100, 0)];
// C E G
const SUCCESS: &[Tone] = &[tone(523, 100, 0), tone(659, 100, 100), tone(784, 200, 200)];
const ERROR: &[Tone] = &[tone(300, 300, 0)];
const NOTIFICATION: &[Tone] = &[tone(440, 150, 0), tone(554, 150, 150)];

impl SoundCue {
    #[must_use]
    pub fn tones(self) -> &'static [Tone] {
        match self {
            Self::Start => START,
            Self::Processing => PROCESSING,
            Self::Success => SUCCESS,
            Self::Error => ERROR,
            Self::Notification => NOTIFICATION,
        }
    }
}

pub trait SoundEmitter {
    fn play(&self, cue: SoundCue);
}

/// Rings the terminal bell. The tone sequence only shows up in debug logs.
pub struct TerminalChime {
    logger: SharedLogger,
}

impl TerminalChime {
    #[must_use]
    pub fn new(logger: SharedLogger) -> Self {
        Self { logger }
    }
}

impl SoundEmitter for TerminalChime {
    fn play(&self, cue: SoundCue) {
        let tones = cue
            .tones()
            .iter()
            .map(|t| format!("{}Hz/{}ms@{}", t.frequency_hz, t.duration_ms, t.offset_ms))
            .collect::<Vec<_>>()
            .join(" ");
        with_logger(&self.logger, |l| l.debug(&format!("Sound {cue:?}: {tones}")));

        let mut stdout = std::io::stdout();
        if let Err(err) = stdout.write_all(b"\x07").and_then(|()| stdout.flush()) {
            with_logger(&self.logger, |l| l.warn(&format!("Audio playback failed: {err}")));
        }
    }
}

pub struct Silent;

impl SoundEmitter for Silent {
    fn play(&self, _cue: SoundCue) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_a_rising_chord() {
        let tones = SoundCue::Success.tones();
        assert_eq!(tones.len(), 3);
        assert!(tones.windows(2).all(|w| w[0].frequency_hz < w[1].frequency_hz));
        assert!(tones.windows(2).all(|w| w[0].offset_ms < w[1].offset_ms));
    }

    #[test]
    fn error_is_a_single_low_tone() {
        assert_eq!(SoundCue::Error.tones(), &[tone(300, 300, 0)]);
    }
}
