//! Pluggable policies: interlocking checks, points control, signal
//! aspects and train driving.
//!
//! A `ManagerRegistry` is assembled once at startup and handed to the
//! simulation when a scenario is loaded. Categories left empty fall back to
//! the standard implementations.

pub mod points;
pub mod routes;
pub mod signals;

use crate::railway::driver::StandardTrainsManager;
use crate::railway::route::Route;
use crate::railway::signal::SignalError;
use crate::railway::trackitem::{ItemId, PointDirection, PointsItem};
use crate::railway::train::Train;
use crate::simulation::Simulation;
use crate::time::Time;

/// Vets route activation and deactivation. A rejection carries the reason
/// shown to the player.
pub trait RoutesManager: Send {
    fn name(&self) -> &str;
    fn can_activate(&self, sim: &Simulation, route: &Route) -> Result<(), String>;
    fn can_deactivate(&self, sim: &Simulation, route: &Route) -> Result<(), String>;
}

/// Owns the physical state of points. Changes requested through
/// `set_direction` may take effect later; `update` is called at every tick
/// and returns the points whose direction changed.
pub trait PointsManager: Send {
    fn name(&self) -> &str;
    fn direction(&self, points: &str) -> PointDirection;
    fn set_direction(&mut self, points: &PointsItem, dir: PointDirection, now: Time);
    fn update(&mut self, _now: Time) -> Vec<ItemId> {
        Vec::new()
    }
}

pub trait SignalManager: Send {
    fn name(&self) -> &str;
    fn get_aspect(&self, sim: &Simulation, signal: &str) -> Result<String, SignalError>;
}

/// Computes the new speed of a train after `elapsed` simulated seconds.
pub trait TrainsManager: Send {
    fn name(&self) -> &str;
    fn speed(&self, sim: &Simulation, train: &Train, elapsed: f64) -> f64;
}

#[derive(Default)]
pub struct ManagerRegistry {
    routes: Vec<Box<dyn RoutesManager>>,
    points: Option<Box<dyn PointsManager>>,
    signals: Option<Box<dyn SignalManager>>,
    trains: Vec<Box<dyn TrainsManager>>,
}

impl ManagerRegistry {
    /// An empty registry. Every category falls back to its standard
    /// implementation.
    pub fn new() -> Self {
        Default::default()
    }

    /// All routes managers are consulted in registration order; the first
    /// rejection wins.
    pub fn register_routes_manager(mut self, m: Box<dyn RoutesManager>) -> Self {
        self.routes.push(m);
        self
    }

    pub fn with_points_manager(mut self, m: Box<dyn PointsManager>) -> Self {
        self.points = Some(m);
        self
    }

    pub fn with_signal_manager(mut self, m: Box<dyn SignalManager>) -> Self {
        self.signals = Some(m);
        self
    }

    /// The first registered trains manager drives trains that do not name
    /// one.
    pub fn register_trains_manager(mut self, m: Box<dyn TrainsManager>) -> Self {
        self.trains.push(m);
        self
    }

    pub(crate) fn into_parts(self) -> (Box<dyn PointsManager>, Managers) {
        let points = self
            .points
            .unwrap_or_else(|| Box::new(points::StandardPointsManager::new()));
        let mut routes = self.routes;
        if routes.is_empty() {
            routes.push(Box::new(routes::StandardRoutesManager));
        }
        let mut trains = self.trains;
        if trains.is_empty() {
            trains.push(Box::new(StandardTrainsManager));
        }
        let signals = self
            .signals
            .unwrap_or_else(|| Box::new(signals::StandardSignalManager));
        (points, Managers { routes, signals, trains })
    }
}

/// Managers held by a running simulation. Points live with the
/// infrastructure.
pub(crate) struct Managers {
    pub routes: Vec<Box<dyn RoutesManager>>,
    pub signals: Box<dyn SignalManager>,
    pub trains: Vec<Box<dyn TrainsManager>>,
}

impl Managers {
    /// The manager named by the train, or the default one.
    pub fn trains_manager(&self, name: Option<&str>) -> &dyn TrainsManager {
        let named = name.and_then(|n| self.trains.iter().find(|m| m.name() == n));
        match named {
            Some(m) => m.as_ref(),
            None => self.trains[0].as_ref(),
        }
    }
}
