//! The real-time clock.
//!
//! `Clock::initialize` moves the simulation onto an engine thread, which
//! is its only writer from then on. Ticks, commands and queries are all
//! handled on that thread, one at a time, so a command never observes a
//! half-done tick.

use crate::commands::{Command, CommandError};
use crate::output::events::{Event, EventName};
use crate::simulation::Simulation;
use log::{info, warn};
use serde_json::Value;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Wall time between two ticks.
pub const TIME_STEP: Duration = Duration::from_millis(500);

type Query = Box<dyn FnOnce(&Simulation) + Send>;

enum Control {
    Start,
    Pause,
    Command(Command, Sender<Result<(), CommandError>>),
    Query(Query),
    Shutdown,
}

struct Engine {
    sim: Simulation,
    interval: Duration,
    running: bool,
}

impl Engine {
    fn set_running(&mut self, running: bool) {
        if self.running == running {
            return;
        }
        self.running = running;
        info!("Simulation {}", if running { "started" } else { "paused" });
        self.sim.emit(EventName::StateChanged, "", Value::Bool(running));
    }

    /// Handles one control message. Returns false on shutdown.
    fn handle(&mut self, msg: Control) -> bool {
        match msg {
            Control::Start => self.set_running(true),
            Control::Pause => self.set_running(false),
            Control::Command(cmd, reply) => {
                if reply.send(self.sim.execute(cmd)).is_err() {
                    warn!("command issuer went away before the reply");
                }
            }
            Control::Query(f) => f(&self.sim),
            Control::Shutdown => return false,
        }
        true
    }

    fn run(mut self, control: Receiver<Control>) -> Simulation {
        let mut next_tick = Instant::now();
        loop {
            let msg = if self.running {
                let now = Instant::now();
                if now >= next_tick {
                    self.sim.tick(self.interval.as_secs_f64());
                    next_tick = (next_tick + self.interval).max(now);
                    continue;
                }
                match control.recv_timeout(next_tick - now) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match control.recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                }
            };
            let was_running = self.running;
            if !self.handle(msg) {
                break;
            }
            if self.running && !was_running {
                next_tick = Instant::now() + self.interval;
            }
        }
        self.sim
    }
}

pub struct Clock {
    interval: Duration,
    control: Option<Sender<Control>>,
    engine: Option<JoinHandle<Simulation>>,
    started: bool,
}

impl Default for Clock {
    fn default() -> Self {
        Clock::new(TIME_STEP)
    }
}

impl Clock {
    pub fn new(interval: Duration) -> Self {
        Clock { interval, control: None, engine: None, started: false }
    }

    /// Initializes the simulation and hands it to a new engine thread.
    /// Returns the event stream.
    pub fn initialize(&mut self, mut sim: Simulation) -> Receiver<Event> {
        if self.control.is_some() {
            panic!("clock already initialized");
        }
        let events = sim.subscribe();
        sim.initialize();
        let (tx, rx) = mpsc::channel();
        let engine = Engine { sim, interval: self.interval, running: false };
        self.engine = Some(thread::spawn(move || engine.run(rx)));
        self.control = Some(tx);
        events
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn send(&self, msg: Control) -> Result<(), CommandError> {
        match &self.control {
            Some(control) => control.send(msg).map_err(|_| CommandError::Disconnected),
            None => Err(CommandError::Disconnected),
        }
    }

    /// Starts ticking.
    ///
    /// # Panics
    ///
    /// If the clock has not been initialized.
    pub fn start(&mut self) {
        if self.control.is_none() {
            panic!("clock started before initialization");
        }
        if self.send(Control::Start).is_err() {
            warn!("engine thread is gone");
        }
        self.started = true;
    }

    /// Stops ticking after the current tick.
    ///
    /// # Panics
    ///
    /// If the clock is not started.
    pub fn pause(&mut self) {
        if !self.started {
            panic!("clock paused while not started");
        }
        if self.send(Control::Pause).is_err() {
            warn!("engine thread is gone");
        }
        self.started = false;
    }

    /// Runs a command between two ticks and waits for its outcome.
    pub fn execute(&self, command: Command) -> Result<(), CommandError> {
        let (tx, rx) = mpsc::channel();
        self.send(Control::Command(command, tx))?;
        rx.recv().map_err(|_| CommandError::Disconnected)?
    }

    /// Reads from the simulation between two ticks.
    pub fn query<R, F>(&self, f: F) -> Result<R, CommandError>
    where
        R: Send + 'static,
        F: FnOnce(&Simulation) -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.send(Control::Query(Box::new(move |sim| {
            // The caller may have stopped waiting.
            let _ = tx.send(f(sim));
        })))?;
        rx.recv().map_err(|_| CommandError::Disconnected)
    }

    /// Stops the engine thread and gives the simulation back.
    pub fn shutdown(mut self) -> Option<Simulation> {
        let control = self.control.take()?;
        let engine = self.engine.take()?;
        // A dead engine has already dropped its receiver.
        let _ = control.send(Control::Shutdown);
        match engine.join() {
            Ok(sim) => Some(sim),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
