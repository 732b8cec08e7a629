//! What the user sees: the result banner, the WhatsApp hand-off popup and the
//! guards that keep the two consistent.
//!
//! The controller is a plain state machine. It never sleeps; every timed
//! transition is a deadline that the owner polls through
//! [`PresentationController::next_deadline`] and [`PresentationController::tick`].
//! Leaving a state drops its deadlines with it, so no timer outlives the state
//! that armed it.
//!
//! ```text
//! idle -> listening -> processing -> displayed -> dismissed -> idle
//!                                        |            ^
//!                                        v            |
//!                                  handoff-offered ---+
//! ```

pub mod handoff;

use serde::Serialize;
use tokio::time::Instant;

use crate::backend::CommandResult;
use crate::config::Timings;
use crate::result_channel::Generation;
use crate::sound::SoundCue;

/// Snapshot for renderers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PresentationState {
    pub is_processing: bool,
    pub is_listening: bool,
    pub show_results: bool,
    pub show_whatsapp_popup: bool,
    pub is_manually_closing: bool,
    pub current_agent_id: Option<String>,
    pub last_result: Option<CommandResult>,
    pub stage: Stage,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Listening,
    Processing,
    Displayed,
    HandoffOffered,
    Dismissed,
}

/// Side effects the owner has to carry out.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Play(SoundCue),
    /// Ask the backend for the hand-off link of the displayed result.
    ResolveLink {
        generation: Generation,
        message: String,
    },
    OpenLink(String),
    /// A successful result was displayed; its message may be read aloud.
    Announce(String),
}

enum Banner {
    Hidden,
    Shown(Shown),
    /// Closed, waiting for the settle window to pass before the result is
    /// cleared.
    Settling {
        result: CommandResult,
        manual: bool,
        until: Instant,
    },
}

struct Shown {
    generation: Generation,
    result: CommandResult,
    hide_at: Instant,
    handoff: Handoff,
}

enum Handoff {
    NotOffered,
    /// The popup opens at `offer_at`, provided the link is known by then.
    /// A link that is still missing at `offer_at` opens it on arrival.
    Pending {
        offer_at: Instant,
        link: Option<String>,
    },
    Offered {
        link: String,
    },
}

pub struct PresentationController {
    timings: Timings,
    banner: Banner,
    dismissed: Option<Generation>,
    current_agent_id: Option<String>,
}

impl PresentationController {
    #[must_use]
    pub fn new(timings: Timings) -> Self {
        Self {
            timings,
            banner: Banner::Hidden,
            dismissed: None,
            current_agent_id: None,
        }
    }

    /// A result became current. It replaces whatever is on screen unless it
    /// is no newer than the last dismissed one, or it arrived unsolicited
    /// while a dismissal is still settling.
    pub fn accept(
        &mut self,
        generation: Generation,
        result: CommandResult,
        solicited: bool,
        now: Instant,
    ) -> Vec<Effect> {
        if self.dismissed.is_some_and(|dismissed| generation <= dismissed) {
            return Vec::new();
        }
        if !solicited && matches!(self.banner, Banner::Settling { .. }) {
            return Vec::new();
        }

        let mut effects = vec![Effect::Play(if result.success {
            SoundCue::Success
        } else {
            SoundCue::Error
        })];
        if result.success {
            effects.push(Effect::Announce(result.message.clone()));
        }

        let handoff = if handoff::is_candidate(&result) {
            let link = handoff::recover_link(&result);
            if link.is_none() {
                effects.push(Effect::ResolveLink {
                    generation,
                    message: result.message.clone(),
                });
            }
            Handoff::Pending {
                offer_at: now + self.timings.handoff_grace,
                link,
            }
        } else {
            Handoff::NotOffered
        };

        self.banner = Banner::Shown(Shown {
            generation,
            result,
            hide_at: now + self.timings.auto_hide,
            handoff,
        });
        effects
    }

    /// Answer to [`Effect::ResolveLink`]. A missing link abandons the
    /// hand-off without telling anyone.
    pub fn link_resolved(
        &mut self,
        generation: Generation,
        link: Option<String>,
        now: Instant,
    ) -> Vec<Effect> {
        let Banner::Shown(shown) = &mut self.banner else {
            return Vec::new();
        };
        if shown.generation != generation {
            return Vec::new();
        }
        let Handoff::Pending { offer_at, link: None } = shown.handoff else {
            return Vec::new();
        };

        match link.as_deref().and_then(handoff::validate) {
            Some(link) if now >= offer_at => {
                shown.handoff = Handoff::Offered { link };
                vec![Effect::Play(SoundCue::Notification)]
            }
            Some(link) => {
                shown.handoff = Handoff::Pending {
                    offer_at,
                    link: Some(link),
                };
                Vec::new()
            }
            None => {
                shown.handoff = Handoff::NotOffered;
                Vec::new()
            }
        }
    }

    /// Manual close. Closing something that is not shown does nothing.
    pub fn dismiss(&mut self, now: Instant) -> bool {
        self.close(true, now)
    }

    /// The user turned the hand-off down.
    pub fn decline_handoff(&mut self, now: Instant) -> bool {
        if self.offered_link().is_none() {
            return false;
        }
        self.close(true, now)
    }

    /// The user accepted the hand-off: open the link and close the banner.
    pub fn confirm_handoff(&mut self, now: Instant) -> Vec<Effect> {
        let Some(link) = self.offered_link().map(str::to_owned) else {
            return Vec::new();
        };
        self.close(true, now);
        vec![Effect::OpenLink(link)]
    }

    /// Runs every transition whose deadline is at or before `now`, in
    /// deadline order.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        loop {
            match &mut self.banner {
                Banner::Shown(shown) => {
                    let offer = match &shown.handoff {
                        Handoff::Pending {
                            offer_at,
                            link: Some(link),
                        } if *offer_at <= now && *offer_at < shown.hide_at => Some(link.clone()),
                        _ => None,
                    };
                    if let Some(link) = offer {
                        shown.handoff = Handoff::Offered { link };
                        effects.push(Effect::Play(SoundCue::Notification));
                        continue;
                    }
                    if shown.hide_at <= now {
                        let hide_at = shown.hide_at;
                        self.close(false, hide_at);
                        continue;
                    }
                }
                Banner::Settling { until, .. } => {
                    if *until <= now {
                        self.banner = Banner::Hidden;
                        continue;
                    }
                }
                Banner::Hidden => (),
            }
            break;
        }
        effects
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.banner {
            Banner::Shown(shown) => match &shown.handoff {
                Handoff::Pending {
                    offer_at,
                    link: Some(_),
                } => Some((*offer_at).min(shown.hide_at)),
                _ => Some(shown.hide_at),
            },
            Banner::Settling { until, .. } => Some(*until),
            Banner::Hidden => None,
        }
    }

    pub fn select_agent(&mut self, agent_id: impl Into<String>) {
        self.current_agent_id = Some(agent_id.into());
    }

    /// The link currently offered in the popup.
    #[must_use]
    pub fn offered_link(&self) -> Option<&str> {
        match &self.banner {
            Banner::Shown(Shown {
                handoff: Handoff::Offered { link },
                ..
            }) => Some(link),
            _ => None,
        }
    }

    #[must_use]
    pub fn stage(&self, processing: bool, listening: bool) -> Stage {
        match &self.banner {
            Banner::Shown(shown) if matches!(shown.handoff, Handoff::Offered { .. }) => {
                Stage::HandoffOffered
            }
            Banner::Shown(_) => Stage::Displayed,
            Banner::Settling { .. } => Stage::Dismissed,
            Banner::Hidden if listening => Stage::Listening,
            Banner::Hidden if processing => Stage::Processing,
            Banner::Hidden => Stage::Idle,
        }
    }

    #[must_use]
    pub fn snapshot(&self, processing: bool, listening: bool) -> PresentationState {
        let (show_results, last_result) = match &self.banner {
            Banner::Shown(shown) => (true, Some(shown.result.clone())),
            Banner::Settling { result, .. } => (false, Some(result.clone())),
            Banner::Hidden => (false, None),
        };

        PresentationState {
            is_processing: processing,
            is_listening: listening,
            show_results,
            show_whatsapp_popup: self.offered_link().is_some(),
            is_manually_closing: matches!(self.banner, Banner::Settling { manual: true, .. }),
            current_agent_id: self.current_agent_id.clone(),
            last_result,
            stage: self.stage(processing, listening),
        }
    }

    fn close(&mut self, manual: bool, at: Instant) -> bool {
        let shown = match std::mem::replace(&mut self.banner, Banner::Hidden) {
            Banner::Shown(shown) => shown,
            other => {
                self.banner = other;
                return false;
            }
        };
        self.dismissed = Some(shown.generation);
        self.banner = Banner::Settling {
            result: shown.result,
            manual,
            until: at + self.timings.settle,
        };
        true
    }
}
