use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};
use tracing::warn;

use crate::app::{Action, App};

/// Input the app reacts to; `Tick` is synthesized when nothing arrives in time
#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// What the terminal loop should do after one event was applied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Redraw,
    Idle,
    Quit,
}

pub trait EventSource: Send + 'static {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Terminal input read on a background thread
pub struct CrosstermEventSource {
    rx: Receiver<AppEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                // key releases are reported on some platforms; only presses drive the UI
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                    tx.send(AppEvent::Key(key))
                }
                Ok(CtEvent::Resize(_, _)) => tx.send(AppEvent::Resize),
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!(error = %e, "terminal input closed");
                    break;
                }
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Scripted input fed through a channel, for driving the app without a terminal
pub struct ChannelEventSource {
    rx: Receiver<AppEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Feeds events into an [`App`] one at a time, ticking when input is idle
pub struct Runner<E: EventSource> {
    events: E,
    tick: Duration,
}

impl<E: EventSource> Runner<E> {
    pub fn new(events: E, tick: Duration) -> Self {
        Self { events, tick }
    }

    /// Next event, `Tick` after one idle interval, or `None` once the source is gone
    pub fn next_event(&self) -> Option<AppEvent> {
        match self.events.recv_timeout(self.tick) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) => Some(AppEvent::Tick),
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Wait for one event and apply it to `app`
    pub fn step(&self, app: &mut App) -> Step {
        match self.next_event() {
            None => Step::Quit,
            Some(AppEvent::Tick) => {
                let had_toast = app.toast.is_some();
                app.on_tick();
                if had_toast && app.toast.is_none() {
                    Step::Redraw
                } else {
                    Step::Idle
                }
            }
            Some(AppEvent::Resize) => Step::Redraw,
            Some(AppEvent::Key(key)) => match app.on_key(key) {
                Action::Quit => Step::Quit,
                Action::Continue => Step::Redraw,
            },
        }
    }

    /// Apply queued input until the queue runs dry (one idle tick) or the app quits
    pub fn drain(&self, app: &mut App) -> Action {
        loop {
            match self.next_event() {
                None => return Action::Quit,
                Some(AppEvent::Tick) => return Action::Continue,
                Some(AppEvent::Resize) => {}
                Some(AppEvent::Key(key)) => {
                    if app.on_key(key) == Action::Quit {
                        return Action::Quit;
                    }
                }
            }
        }
    }
}
