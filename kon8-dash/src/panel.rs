//! Two-button front panel.
//!
//! The controller has a "next" and a "previous" button and a small screen
//! cycling through four pages. [`Panel`] turns sampled button levels into
//! display actions; it does no I/O and takes the current instant as input.
//! The display driver samples the GPIOs, feeds [`Panel::tick`] and renders
//! what comes back.
//!
//! # Behaviour
//!
//! - A press is the released-to-pressed edge of one button. It moves to
//!   the next/previous page, wrapping around. In configuration mode the
//!   screen shows the access point details and presses only refresh it.
//! - After [`SCREEN_TIMEOUT`] without interaction the splash is shown and
//!   the backlight turned off. A press while dark turns it back on and
//!   shows the clock page.
//! - Holding both buttons starts the factory-reset countdown. The remaining
//!   whole seconds are shown every [`COUNTDOWN_REFRESH`]; after
//!   [`RESET_HOLD`] a single [`PanelAction::FactoryReset`] is emitted.
//!   Releasing earlier cancels and redraws the current page.

use std::time::Duration;

use tokio::time::Instant;

use crate::tracing::prelude::*;

pub const SCREEN_TIMEOUT: Duration = Duration::from_secs(30);
pub const RESET_HOLD: Duration = Duration::from_secs(5);
pub const COUNTDOWN_REFRESH: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Wifi,
    Miner,
    Clock,
    Climate,
}

impl Page {
    const ALL: [Page; 4] = [Page::Wifi, Page::Miner, Page::Clock, Page::Climate];

    fn position(self) -> usize {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.position() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Something the display side should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    BacklightOn,
    BacklightOff,
    ShowSplash,
    ShowPage(Page),
    /// Access point details, shown instead of pages in configuration mode.
    ShowConfig,
    /// Seconds left before the factory reset fires.
    ShowResetCountdown(u8),
    FactoryReset,
}

/// Sampled button levels, `true` while held down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buttons {
    pub next: bool,
    pub prev: bool,
}

#[derive(Debug)]
struct ResetHold {
    started: Instant,
    last_countdown: Option<Instant>,
    fired: bool,
}

#[derive(Debug)]
pub struct Panel {
    page: Page,
    config_mode: bool,
    backlight_on: bool,
    last_interaction: Instant,
    previous: Buttons,
    reset: Option<ResetHold>,
}

impl Panel {
    /// Start on the clock page with the backlight on.
    pub fn new(now: Instant, config_mode: bool) -> Self {
        Self {
            page: Page::Clock,
            config_mode,
            backlight_on: true,
            last_interaction: now,
            previous: Buttons::default(),
            reset: None,
        }
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn backlight_on(&self) -> bool {
        self.backlight_on
    }

    /// What the screen should currently show.
    pub fn current_view(&self) -> PanelAction {
        if self.config_mode {
            PanelAction::ShowConfig
        } else {
            PanelAction::ShowPage(self.page)
        }
    }

    /// Feed one sample of the buttons.
    pub fn tick(&mut self, buttons: Buttons, now: Instant) -> Vec<PanelAction> {
        let mut actions = Vec::new();

        let pressed_next = buttons.next && !self.previous.next;
        let pressed_prev = buttons.prev && !self.previous.prev;
        self.previous = buttons;

        if buttons.next && buttons.prev {
            self.hold_reset(now, &mut actions);
            // Holding keeps the screen awake.
            self.last_interaction = now;
            return actions;
        }

        if self.reset.take().is_some() {
            debug!("Factory reset cancelled");
            self.last_interaction = now;
            actions.push(self.current_view());
        }

        if pressed_next || pressed_prev {
            self.last_interaction = now;
            if !self.backlight_on {
                self.backlight_on = true;
                self.page = Page::Clock;
                actions.push(PanelAction::BacklightOn);
                actions.push(PanelAction::ShowSplash);
            } else if !self.config_mode {
                if pressed_next {
                    self.page = self.page.next();
                }
                if pressed_prev {
                    self.page = self.page.prev();
                }
            }
            actions.push(self.current_view());
        }

        if self.backlight_on && now.saturating_duration_since(self.last_interaction) > SCREEN_TIMEOUT
        {
            trace!("Screen timeout");
            self.backlight_on = false;
            actions.push(PanelAction::ShowSplash);
            actions.push(PanelAction::BacklightOff);
        }

        actions
    }

    fn hold_reset(&mut self, now: Instant, actions: &mut Vec<PanelAction>) {
        if self.reset.is_none() {
            info!("Factory reset countdown started");
            self.reset = Some(ResetHold {
                started: now,
                last_countdown: None,
                fired: false,
            });
            if !self.backlight_on {
                self.backlight_on = true;
                actions.push(PanelAction::BacklightOn);
            }
        }
        let Some(hold) = self.reset.as_mut() else {
            return;
        };
        if hold.fired {
            return;
        }

        let held = now.saturating_duration_since(hold.started);
        if held >= RESET_HOLD {
            hold.fired = true;
            actions.push(PanelAction::ShowResetCountdown(0));
            actions.push(PanelAction::FactoryReset);
            return;
        }

        let due = hold
            .last_countdown
            .is_none_or(|last| now.saturating_duration_since(last) > COUNTDOWN_REFRESH);
        if due {
            let remaining_ms = (RESET_HOLD - held).as_millis();
            let seconds = u8::try_from(remaining_ms.div_ceil(1000)).unwrap_or(u8::MAX);
            actions.push(PanelAction::ShowResetCountdown(seconds));
            hold.last_countdown = Some(now);
        }
    }
}
