//! Rotation timer and the owner's single event queue.
//!
//! Timer ticks, relayed commands and in-session actions all arrive on one
//! `mpsc` channel with a single consumer, so rotations never overlap.

use std::{
    cell::Cell,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{ipc_connector::Command, warn, DEBUG_NAME};

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The periodic timer fired.
    Tick,
    /// A command from a relay process or from this session.
    Command(Command),
}

/// Cloneable handle for feeding the event queue from other threads.
#[derive(Debug, Clone)]
pub struct Trigger {
    events: Sender<Event>,
}

impl Trigger {
    /// Queues an out-of-cadence rotation. The timer phase is left alone.
    pub fn advance_now(&self) -> bool {
        self.send(Command::Advance)
    }

    /// Returns `false` once the owner loop has gone away.
    pub fn send(&self, command: Command) -> bool {
        self.events.send(Event::Command(command)).is_ok()
    }
}

pub struct Scheduler {
    period: Cell<Duration>,
    control: Option<Sender<Duration>>,
    events: Sender<Event>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Arms a repeating timer and returns the receiving end of the queue.
    pub fn start(period: Duration) -> (Self, Receiver<Event>) {
        let (events, receiver) = mpsc::channel::<Event>();
        let (control, control_rx) = mpsc::channel::<Duration>();
        let timer_events = events.clone();

        let handle = thread::Builder::new()
            .name("rotation-timer".to_string())
            .spawn(move || run_timer(period, &control_rx, &timer_events));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("[{}][TIMER] Failed to start timer thread: {}", DEBUG_NAME, e);
                None
            }
        };

        let scheduler = Self {
            period: Cell::new(period.max(MIN_PERIOD)),
            control: Some(control),
            events,
            handle,
        };
        (scheduler, receiver)
    }

    /// Restarts the cadence with a new period, measured from now.
    pub fn rearm(&self, period: Duration) {
        self.period.set(period.max(MIN_PERIOD));
        if let Some(control) = &self.control {
            let _ = control.send(period);
        }
    }

    /// The period the timer was last armed with.
    pub fn period(&self) -> Duration {
        self.period.get()
    }

    pub fn trigger(&self) -> Trigger {
        Trigger {
            events: self.events.clone(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Disconnecting the control channel ends the timer loop.
        self.control.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_timer(period: Duration, control: &Receiver<Duration>, events: &Sender<Event>) {
    let mut period = period.max(MIN_PERIOD);
    let mut deadline = Instant::now() + period;

    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        match control.recv_timeout(wait) {
            Ok(new_period) => {
                period = new_period.max(MIN_PERIOD);
                deadline = Instant::now() + period;
            }
            Err(RecvTimeoutError::Timeout) => {
                if events.send(Event::Tick).is_err() {
                    break;
                }
                deadline += period;
                // After a suspend, skip the missed ticks instead of bursting.
                let now = Instant::now();
                if deadline <= now {
                    deadline = now + period;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
