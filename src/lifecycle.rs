//! Start/stop lifecycle latch.
//!
//! ```text
//! NotStarted ──begin_start──▶ Starting ──mark_started──▶ Started
//!                               │                          │
//!                          abort_start                 begin_stop
//!                               │                          ▼
//!                               └────────▶ Stopped ◀──mark_stopped── Stopping
//! ```
//!
//! Transitions are compare-and-swap on an atomic: of several callers racing
//! to leave the same state exactly one wins, the rest get
//! [`Error::CannotStart`] / [`Error::CannotStop`]. States only move forward,
//! so a stopped latch stays stopped.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::watch;

use crate::error::Error;

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum State {
    NotStarted = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
    Stopped = 4,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NotStarted,
            1 => Self::Starting,
            2 => Self::Started,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// The lifecycle latch of one server instance.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    reached_started: AtomicBool,
    notify: watch::Sender<State>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(State::NotStarted);
        Self {
            state: AtomicU8::new(State::NotStarted as u8),
            reached_started: AtomicBool::new(false),
            notify,
        }
    }

    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn can_start(&self) -> bool { self.state() == State::NotStarted }
    pub fn can_stop(&self) -> bool { self.state() == State::Started }
    pub fn is_started(&self) -> bool { self.state() == State::Started }
    pub fn is_stopped(&self) -> bool { self.state() == State::Stopped }

    /// `NotStarted → Starting`.
    pub fn begin_start(&self) -> Result<(), Error> {
        self.transition(State::NotStarted, State::Starting)
            .then_some(())
            .ok_or(Error::CannotStart)
    }

    /// `Starting → Started`. Releases [`wait_started`](Self::wait_started).
    pub fn mark_started(&self) -> bool {
        self.transition(State::Starting, State::Started)
    }

    /// `Starting → Stopped`, for a start that failed before binding.
    pub fn abort_start(&self) -> bool {
        self.transition(State::Starting, State::Stopped)
    }

    /// `Started → Stopping`.
    pub fn begin_stop(&self) -> Result<(), Error> {
        self.transition(State::Started, State::Stopping)
            .then_some(())
            .ok_or(Error::CannotStop)
    }

    /// `Stopping → Stopped`. Releases [`wait_stopped`](Self::wait_stopped).
    pub fn mark_stopped(&self) -> bool {
        self.transition(State::Stopping, State::Stopped)
    }

    /// Resolves once the latch has reached `Started`. Fails with
    /// [`Error::CannotStart`] if it went straight to `Stopped` instead.
    pub async fn wait_started(&self) -> Result<(), Error> {
        let mut rx = self.notify.subscribe();
        let _ = rx.wait_for(|s| *s >= State::Started).await;
        if self.reached_started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::CannotStart)
        }
    }

    /// Resolves once the latch has reached `Stopped`.
    pub async fn wait_stopped(&self) {
        let mut rx = self.notify.subscribe();
        let _ = rx.wait_for(|s| *s == State::Stopped).await;
    }

    fn transition(&self, from: State, to: State) -> bool {
        let swapped = self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if swapped {
            if to == State::Started {
                self.reached_started.store(true, Ordering::Release);
            }
            // States only grow, so publishing the max keeps watchers in order
            // even if two winning transitions publish out of order.
            self.notify.send_if_modified(|current| {
                if to > *current {
                    *current = to;
                    true
                } else {
                    false
                }
            });
        }
        swapped
    }
}

impl Default for Lifecycle {
    fn default() -> Self { Self::new() }
}
