//! Routes between two signals and the interlocking around them.

use super::infrastructure::Infrastructure;
use super::position::Position;
use super::trackitem::{ItemId, PointDirection, TopologyError, TrackItem};
use super::triggers::TriggerSource;
use super::RouteId;
use crate::input::de_id;
use crate::output::events::EventName;
use crate::simulation::Simulation;
use log::{debug, info};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RouteState {
    Deactivated,
    /// Active until the first train has passed.
    Activated,
    /// Active until explicitly deactivated.
    Persistent,
}

impl Default for RouteState {
    fn default() -> Self {
        RouteState::Deactivated
    }
}

impl Serialize for RouteState {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(match self {
            RouteState::Deactivated => 0,
            RouteState::Activated => 1,
            RouteState::Persistent => 2,
        })
    }
}

impl<'de> Deserialize<'de> for RouteState {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<RouteState, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(RouteState::Deactivated),
            1 => Ok(RouteState::Activated),
            2 => Ok(RouteState::Persistent),
            x => Err(de::Error::custom(format!("invalid route state {}", x))),
        }
    }
}

#[derive(Debug, Fail)]
pub enum RouteError {
    #[fail(display = "unknown route {}", _0)]
    UnknownRoute(RouteId),
    #[fail(display = "{} is not a signal", _0)]
    NotASignal(ItemId),
    #[fail(display = "unable to link signal {} to signal {}", begin, end)]
    Unreachable { begin: ItemId, end: ItemId },
    #[fail(display = "{} refused route {}: {}", manager, route, reason)]
    Vetoed { route: RouteId, manager: String, reason: String },
    #[fail(display = "{}", _0)]
    Topology(#[cause] TopologyError),
}

impl From<TopologyError> for RouteError {
    fn from(e: TopologyError) -> Self {
        RouteError::Topology(e)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(skip)]
    pub id: RouteId,
    #[serde(deserialize_with = "de_id")]
    pub begin_signal: ItemId,
    #[serde(deserialize_with = "de_id")]
    pub end_signal: ItemId,
    #[serde(default)]
    pub initial_state: RouteState,
    #[serde(default)]
    pub directions: BTreeMap<ItemId, PointDirection>,
    #[serde(default)]
    pub state: RouteState,
    /// Path from the begin signal to the end signal, both included.
    #[serde(skip)]
    pub positions: Vec<Position>,
}

impl Route {
    pub fn is_active(&self) -> bool {
        self.state != RouteState::Deactivated
    }

    /// Computes the path of the route. Points without a declared direction
    /// get the direction the path actually uses.
    pub fn initialize(&mut self, inf: &Infrastructure) -> Result<(), RouteError> {
        for id in &[&self.begin_signal, &self.end_signal] {
            match inf.items.get(id.as_str()) {
                Some(TrackItem::Signal(_)) => {}
                _ => return Err(RouteError::NotASignal(id.to_string())),
            }
        }
        let begin = inf.item(&self.begin_signal)?;
        let start = Position::new(&self.begin_signal, begin.previous_id(), 0.0);
        let mut search = PathSearch {
            inf,
            end: &self.end_signal,
            declared: &self.directions,
            inferred: Vec::new(),
            path: Vec::new(),
            visited: HashSet::new(),
        };
        if !search.walk(start)? {
            return Err(RouteError::Unreachable {
                begin: self.begin_signal.clone(),
                end: self.end_signal.clone(),
            });
        }
        let PathSearch { path, inferred, .. } = search;
        self.positions = path;
        self.directions.extend(inferred);
        Ok(())
    }
}

/// Depth-first walk from the begin signal, branching only at facing points
/// whose direction is not given.
struct PathSearch<'a> {
    inf: &'a Infrastructure,
    end: &'a str,
    declared: &'a BTreeMap<ItemId, PointDirection>,
    inferred: Vec<(ItemId, PointDirection)>,
    path: Vec<Position>,
    visited: HashSet<(ItemId, Option<ItemId>)>,
}

impl<'a> PathSearch<'a> {
    fn walk(&mut self, pos: Position) -> Result<bool, TopologyError> {
        if !self.visited.insert((pos.track_item.clone(), pos.previous_item.clone())) {
            return Ok(false);
        }
        self.path.push(pos.clone());
        if pos.track_item == self.end {
            return Ok(true);
        }
        if !pos.is_out(self.inf) {
            let item = self.inf.item(&pos.track_item)?;
            let declared = self.declared.get(&pos.track_item).cloned();
            let mut choices: Vec<(PointDirection, bool)> = Vec::new();
            if let TrackItem::Points(_) = item {
                let from = pos.previous_item.as_ref().map(String::as_str);
                if from.is_some() && from == item.previous_id() {
                    match declared {
                        Some(d) => choices.push((d, false)),
                        None => {
                            choices.push((PointDirection::Normal, true));
                            choices.push((PointDirection::Reversed, true));
                        }
                    }
                } else {
                    let trailing = if from.is_some() && from == item.reverse_id() {
                        PointDirection::Reversed
                    } else {
                        PointDirection::Normal
                    };
                    choices.push((declared.unwrap_or(trailing), declared.is_none()));
                }
            } else {
                choices.push((PointDirection::Normal, false));
            }

            for (dir, record) in choices {
                let next = match pos.next(self.inf, dir) {
                    Ok(next) => next,
                    Err(TopologyError::EndOfLine(_)) => continue,
                    Err(e) => return Err(e),
                };
                if record {
                    self.inferred.push((pos.track_item.clone(), dir));
                }
                if self.walk(next)? {
                    return Ok(true);
                }
                if record {
                    self.inferred.pop();
                }
            }
        }
        self.path.pop();
        Ok(false)
    }
}

impl Simulation {
    /// Sets a route if every routes manager agrees. On rejection nothing
    /// changes.
    pub fn activate_route(&mut self, id: &str, persistent: bool) -> Result<(), RouteError> {
        let route = self
            .routes
            .get(id)
            .ok_or_else(|| RouteError::UnknownRoute(id.to_string()))?;
        for manager in &self.managers.routes {
            manager.can_activate(self, route).map_err(|reason| RouteError::Vetoed {
                route: id.to_string(),
                manager: manager.name().to_string(),
                reason,
            })?;
        }
        let route = route.clone();

        let now = self.options.current_time;
        for (points, dir) in &route.directions {
            if let Some(TrackItem::Points(p)) = self.infra.items.get(points) {
                self.infra.points.set_direction(p, *dir, now);
            }
        }
        for pos in &route.positions {
            if let Some(state) = self.infra.state_mut(&pos.track_item) {
                state.active_route = Some(route.id.clone());
                state.active_route_previous = pos.previous_item.clone();
            }
        }
        if let Some(end) = self.infra.signal_status_mut(&route.end_signal) {
            end.previous_active_route = Some(route.id.clone());
        }
        if let Some(begin) = self.infra.signal_status_mut(&route.begin_signal) {
            begin.next_active_route = Some(route.id.clone());
        }
        let state = if persistent { RouteState::Persistent } else { RouteState::Activated };
        if let Some(r) = self.routes.get_mut(id) {
            r.state = state;
        }
        info!("Route {} activated ({:?})", id, state);

        self.after_route_change(&route, EventName::RouteActivated);
        Ok(())
    }

    /// Cancels a route if every routes manager agrees. Items already taken
    /// over by another route are left alone.
    pub fn deactivate_route(&mut self, id: &str) -> Result<(), RouteError> {
        let route = self
            .routes
            .get(id)
            .ok_or_else(|| RouteError::UnknownRoute(id.to_string()))?;
        for manager in &self.managers.routes {
            manager.can_deactivate(self, route).map_err(|reason| RouteError::Vetoed {
                route: id.to_string(),
                manager: manager.name().to_string(),
                reason,
            })?;
        }
        let route = route.clone();
        self.clear_route(&route);
        info!("Route {} deactivated", id);
        self.after_route_change(&route, EventName::RouteDeactivated);
        Ok(())
    }

    fn clear_route(&mut self, route: &Route) {
        if let Some(begin) = self.infra.signal_status_mut(&route.begin_signal) {
            if begin.next_active_route.as_ref() == Some(&route.id) {
                begin.next_active_route = None;
            }
        }
        if let Some(end) = self.infra.signal_status_mut(&route.end_signal) {
            if end.previous_active_route.as_ref() == Some(&route.id) {
                end.previous_active_route = None;
            }
        }
        for pos in &route.positions {
            if let Some(state) = self.infra.state_mut(&pos.track_item) {
                if state.active_route.as_ref() == Some(&route.id) {
                    state.active_route = None;
                    state.active_route_previous = None;
                }
            }
        }
        if let Some(r) = self.routes.get_mut(&route.id) {
            r.state = RouteState::Deactivated;
        }
    }

    fn after_route_change(&mut self, route: &Route, event: EventName) {
        self.fire_trigger(&TriggerSource::Route(route.id.clone()));
        self.emit(event, &route.id, self.route_value(&route.id));
        for pos in &route.positions {
            self.emit(EventName::TrackItemChanged, &pos.track_item, self.item_value(&pos.track_item));
        }
        for pos in &route.positions {
            if self.infra.signal_status(&pos.track_item).is_some() {
                self.update_signal_state(&pos.track_item);
            }
        }
    }

    /// Called for each item the tail of a train has just left. Items of a
    /// non-persistent route are given back as the train clears them, and the
    /// route ends once it holds no item any more.
    pub(crate) fn release_behind_train(&mut self, pos: &Position) {
        let (route_id, approach) = match self.infra.state(&pos.track_item) {
            Some(s) => match &s.active_route {
                Some(r) => (r.clone(), s.active_route_previous.clone()),
                None => return,
            },
            None => return,
        };
        let begin_signal = match self.routes.get(&route_id) {
            Some(r) if r.state == RouteState::Activated => r.begin_signal.clone(),
            _ => return,
        };
        if approach != pos.previous_item {
            return;
        }
        if let Some(state) = self.infra.state_mut(&pos.track_item) {
            state.active_route = None;
            state.active_route_previous = None;
        }
        debug!("Route {} released item {}", route_id, pos.track_item);
        self.emit(EventName::TrackItemChanged, &pos.track_item, self.item_value(&pos.track_item));

        let mut finished = vec![route_id.clone()];
        if begin_signal == pos.track_item {
            if let Some(begin) = self.infra.signal_status_mut(&begin_signal) {
                if begin.next_active_route.as_ref() == Some(&route_id) {
                    begin.next_active_route = None;
                }
            }
            self.update_signal_state(&begin_signal);
        }
        if let Some(arriving) = self
            .infra
            .signal_status(&pos.track_item)
            .and_then(|s| s.previous_active_route.clone())
        {
            if arriving != route_id {
                finished.push(arriving);
            }
        }
        for id in finished {
            self.end_route_if_released(&id);
        }
    }

    fn end_route_if_released(&mut self, id: &str) {
        let route = match self.routes.get(id) {
            Some(r) if r.state == RouteState::Activated => r.clone(),
            _ => return,
        };
        let holds_items = route
            .positions
            .iter()
            .any(|p| self.infra.active_route(&p.track_item) == Some(&route.id));
        if holds_items {
            return;
        }
        self.clear_route(&route);
        info!("Route {} released by train", id);
        self.fire_trigger(&TriggerSource::Route(route.id.clone()));
        self.emit(EventName::RouteDeactivated, &route.id, self.route_value(&route.id));
        self.update_signal_state(&route.begin_signal);
        self.update_signal_state(&route.end_signal);
    }
}
