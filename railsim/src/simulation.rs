//! The simulation: everything a scenario describes, plus the pluggable
//! managers and the event stream.

use crate::managers::Managers;
use crate::options::Options;
use crate::output::events::{EventName, EventSink};
use crate::output::messages::MessageLogger;
use crate::railway::infrastructure::Infrastructure;
use crate::railway::route::{Route, RouteState};
use crate::railway::service::{Service, TrainType};
use crate::railway::signal::SignalLibrary;
use crate::railway::train::Train;
use crate::railway::triggers::{TriggerSource, Triggers};
use crate::railway::RouteId;
use crate::time::Time;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use serde_json::Value;
use std::collections::BTreeMap;

/// Seed of the random generator when the caller gives none.
pub const DEFAULT_SEED: u64 = 0x7261_696c;

pub struct Simulation {
    pub options: Options,
    pub signal_library: SignalLibrary,
    pub infra: Infrastructure,
    pub routes: BTreeMap<RouteId, Route>,
    pub train_types: BTreeMap<String, TrainType>,
    pub services: BTreeMap<String, Service>,
    /// Sorted by scheduled departure; a train's identifier is its index.
    pub trains: Vec<Train>,
    pub messages: MessageLogger,

    pub(crate) triggers: Triggers,
    pub(crate) managers: Managers,
    pub(crate) events: EventSink,
    pub(crate) rng: StdRng,
    pub(crate) initialized: bool,
}

impl Simulation {
    pub fn current_time(&self) -> Time {
        self.options.current_time
    }

    /// Sets up the state the scenario starts in: routes are activated and
    /// trains already running are put back on the track. Does nothing the
    /// second time.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        let mut to_activate = Vec::new();
        for route in self.routes.values_mut() {
            let target = if route.state != RouteState::Deactivated {
                route.state
            } else {
                route.initial_state
            };
            route.state = RouteState::Deactivated;
            if target != RouteState::Deactivated {
                to_activate.push((route.id.clone(), target == RouteState::Persistent));
            }
        }
        for (id, persistent) in to_activate {
            if let Err(e) = self.activate_route(&id, persistent) {
                warn!("Initial route {} not set: {}", id, e);
            }
        }
        for idx in 0..self.trains.len() {
            if self.trains[idx].is_active() {
                self.occupy_under_train(idx);
            }
        }
        self.refresh_signals();
        info!("Simulation initialized at {} with {} routes and {} trains",
              self.options.current_time,
              self.routes.len(),
              self.trains.len());
    }

    /// Advances the simulation by `step` seconds of wall time, scaled by
    /// the time factor.
    pub fn tick(&mut self, step: f64) {
        let secs = step * self.options.time_factor;
        self.options.current_time = self.options.current_time.add_seconds(secs);
        let now = self.options.current_time;
        debug!("Tick to {} ({:.1}s)", now, secs);

        for points in self.infra.points.update(now) {
            self.emit(EventName::TrackItemChanged, &points, self.item_value(&points));
            self.fire_trigger(&TriggerSource::TrackItem(points));
        }

        let mut occupancy_changed = false;
        for idx in 0..self.trains.len() {
            occupancy_changed |= self.activate_train_if_due(idx);
            occupancy_changed |= self.advance_train(idx, secs);
        }
        if occupancy_changed {
            self.refresh_signals();
        }
        self.emit(EventName::Clock, "", Value::String(now.to_string()));
    }
}
