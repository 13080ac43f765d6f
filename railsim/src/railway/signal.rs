//! Signal library and aspect resolution.
//!
//! A signal type is an ordered list of states. The displayed aspect is the
//! one of the first state whose conditions all hold, or of the last state
//! when none does.

use super::conditions::ConditionKind;
use super::position::Position;
use super::trackitem::{ItemId, PointDirection, TrackItem};
use crate::output::events::EventName;
use crate::primitives::Color;
use crate::simulation::Simulation;
use log::error;
use serde::de::{self, Deserializer};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Speed used for "no restriction".
pub const VERY_HIGH_SPEED: f64 = 999.0;

#[derive(Debug, Fail)]
pub enum SignalError {
    #[fail(display = "no aspect with code {} found", _0)]
    UnknownAspect(String),
    #[fail(display = "unknown condition type: {}", _0)]
    UnknownCondition(String),
    #[fail(display = "unknown signal type {} for signal {}", signal_type, signal)]
    UnknownType { signal: ItemId, signal_type: String },
    #[fail(display = "signal type {} has no states", _0)]
    NoStates(String),
    #[fail(display = "{} is not a signal", _0)]
    NotASignal(ItemId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActionTarget {
    Asap,
    BeforeThisSignal,
    BeforeNextSignal,
}

/// Speed a train must respect when it sees an aspect, and from where.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SignalAction {
    pub target: ActionTarget,
    pub speed: f64,
    /// Seconds the speed must be held before the next action applies.
    pub duration: f64,
}

impl Default for SignalAction {
    fn default() -> Self {
        SignalAction { target: ActionTarget::Asap, speed: VERY_HIGH_SPEED, duration: 0.0 }
    }
}

impl Serialize for SignalAction {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let target = match self.target {
            ActionTarget::Asap => 0.0,
            ActionTarget::BeforeThisSignal => 1.0,
            ActionTarget::BeforeNextSignal => 2.0,
        };
        let mut t = s.serialize_tuple(3)?;
        t.serialize_element(&target)?;
        t.serialize_element(&self.speed)?;
        t.serialize_element(&self.duration)?;
        t.end()
    }
}

impl<'de> Deserialize<'de> for SignalAction {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<SignalAction, D::Error> {
        let raw = <[f64; 3]>::deserialize(d)?;
        let target = match raw[0] as i64 {
            0 => ActionTarget::Asap,
            1 => ActionTarget::BeforeThisSignal,
            2 => ActionTarget::BeforeNextSignal,
            x => return Err(de::Error::custom(format!("unable to read signal action target {}", x))),
        };
        Ok(SignalAction { target, speed: raw[1], duration: raw[2] })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalAspect {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub line_style: u8,
    #[serde(default)]
    pub outer_shapes: [u8; 6],
    #[serde(default)]
    pub outer_colors: [Color; 6],
    #[serde(default)]
    pub shapes: [u8; 6],
    #[serde(default)]
    pub shapes_colors: [Color; 6],
    #[serde(default)]
    pub actions: Vec<SignalAction>,
}

impl SignalAspect {
    /// False if the aspect requires trains to stop.
    pub fn means_proceed(&self) -> bool {
        match self.actions.first() {
            None => true,
            Some(a) => a.speed != 0.0 || a.target == ActionTarget::BeforeNextSignal,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SignalState {
    #[serde(rename = "aspectName", alias = "AspectName")]
    pub aspect_name: String,
    #[serde(rename = "conditions", alias = "Conditions", default)]
    pub conditions: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    pub parsed: Vec<(ConditionKind, Vec<String>)>,
}

impl SignalState {
    fn conditions_met(&self, sim: &Simulation, signal: &str) -> bool {
        let props = sim.infra.items.get(signal).map(|i| &i.base().custom_properties);
        self.parsed.iter().all(|(kind, values)| {
            let params = props
                .and_then(|p| p.get(kind.code()))
                .and_then(|p| p.get(&self.aspect_name))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            kind.is_met(sim, signal, values, params)
        })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SignalType {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "states", alias = "States", default)]
    pub states: Vec<SignalState>,
}

impl SignalType {
    /// The aspect the signal should display now.
    pub fn get_aspect(&self, sim: &Simulation, signal: &str) -> Result<&str, SignalError> {
        let last = self
            .states
            .last()
            .ok_or_else(|| SignalError::NoStates(self.name.clone()))?;
        let state = self
            .states
            .iter()
            .find(|s| s.conditions_met(sim, signal))
            .unwrap_or(last);
        Ok(&state.aspect_name)
    }

    /// The aspect of the last state, shown before any evaluation.
    pub fn default_aspect(&self) -> Result<&str, SignalError> {
        self.states
            .last()
            .map(|s| s.aspect_name.as_str())
            .ok_or_else(|| SignalError::NoStates(self.name.clone()))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalLibrary {
    #[serde(default)]
    pub signal_aspects: BTreeMap<String, SignalAspect>,
    #[serde(default)]
    pub signal_types: BTreeMap<String, SignalType>,
}

impl SignalLibrary {
    /// Names aspects and types, and resolves every state's aspect and
    /// condition codes.
    pub fn initialize(&mut self) -> Result<(), SignalError> {
        for (name, aspect) in self.signal_aspects.iter_mut() {
            aspect.name = name.clone();
        }
        for (name, t) in self.signal_types.iter_mut() {
            t.name = name.clone();
            for state in t.states.iter_mut() {
                if !self.signal_aspects.contains_key(&state.aspect_name) {
                    return Err(SignalError::UnknownAspect(state.aspect_name.clone()));
                }
                state.parsed = state
                    .conditions
                    .iter()
                    .map(|(code, values)| {
                        ConditionKind::from_code(code)
                            .map(|kind| (kind, values.clone()))
                            .ok_or_else(|| SignalError::UnknownCondition(code.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
            }
        }
        Ok(())
    }

    pub fn aspect(&self, name: &str) -> Option<&SignalAspect> {
        self.signal_aspects.get(name)
    }
}

impl Simulation {
    /// The signal type of a signal item.
    pub fn signal_type(&self, signal: &str) -> Result<&SignalType, SignalError> {
        let item = self
            .infra
            .items
            .get(signal)
            .and_then(TrackItem::as_signal)
            .ok_or_else(|| SignalError::NotASignal(signal.to_string()))?;
        self.signal_library
            .signal_types
            .get(&item.signal_type)
            .ok_or_else(|| SignalError::UnknownType {
                signal: signal.to_string(),
                signal_type: item.signal_type.clone(),
            })
    }

    /// The aspect currently displayed by a signal.
    pub fn active_aspect(&self, signal: &str) -> Option<&SignalAspect> {
        let status = self.infra.signal_status(signal)?;
        self.signal_library.aspect(&status.active_aspect)
    }

    /// Position at the foot of a signal, facing the way it applies.
    pub fn signal_position(&self, signal: &str) -> Option<Position> {
        let item = self.infra.items.get(signal)?;
        Some(Position::new(signal, item.previous_id(), 0.0))
    }

    /// True if `pos` is on the signal item, in the direction of the signal.
    pub fn is_on_position(&self, signal: &str, pos: &Position) -> bool {
        match self.infra.items.get(signal) {
            Some(TrackItem::Signal(s)) => {
                pos.track_item == signal && pos.previous_item == s.base.previous_ti_id
            }
            _ => false,
        }
    }

    /// True if `pos` is on any signal facing the direction of travel.
    pub fn is_facing_signal(&self, pos: &Position) -> bool {
        self.is_on_position(&pos.track_item, pos)
    }

    /// The next signal a train passing `signal` will meet: the exit signal
    /// of the route set from it, or else the next facing signal on the line.
    pub fn next_signal(&self, signal: &str) -> Option<ItemId> {
        if let Some(route) = self
            .infra
            .signal_status(signal)
            .and_then(|s| s.next_active_route.as_ref())
            .and_then(|r| self.routes.get(r))
        {
            return Some(route.end_signal.clone());
        }
        let mut pos = self.signal_position(signal)?;
        for _ in 0..self.infra.items.len() {
            if pos.is_out(&self.infra) {
                return None;
            }
            pos = pos.next(&self.infra, PointDirection::Current).ok()?;
            if self.is_facing_signal(&pos) {
                return Some(pos.track_item);
            }
        }
        None
    }

    /// Position of the first facing signal strictly ahead of `pos`.
    pub fn next_signal_position(&self, pos: &Position) -> Option<Position> {
        if let Some(TrackItem::End(_)) = self.infra.items.get(&pos.track_item) {
            return None;
        }
        let mut cur = pos.clone();
        for _ in 0..self.infra.items.len() {
            cur = cur.next(&self.infra, PointDirection::Current).ok()?;
            if let Some(TrackItem::End(_)) = self.infra.items.get(&cur.track_item) {
                return None;
            }
            if self.is_facing_signal(&cur) {
                return Some(cur);
            }
        }
        None
    }

    fn resolve_aspect(&self, signal: &str) -> Option<String> {
        match self.managers.signals.get_aspect(self, signal) {
            Ok(aspect) => Some(aspect),
            Err(e) => {
                error!("Cannot compute aspect of signal {}: {}", signal, e);
                None
            }
        }
    }

    /// Recomputes the aspect of a signal. A change also refreshes the
    /// signal at the start of the route leading to it.
    pub fn update_signal_state(&mut self, signal: &str) {
        let mut queue = VecDeque::new();
        queue.push_back(signal.to_string());
        let mut seen = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if self.apply_aspect(&id) {
                let previous_route = self
                    .infra
                    .signal_status(&id)
                    .and_then(|s| s.previous_active_route.as_ref())
                    .and_then(|r| self.routes.get(r));
                if let Some(route) = previous_route {
                    queue.push_back(route.begin_signal.clone());
                }
            }
        }
    }

    /// Sets the resolved aspect on the signal and reports whether it changed.
    fn apply_aspect(&mut self, signal: &str) -> bool {
        let aspect = match self.resolve_aspect(signal) {
            Some(aspect) => aspect,
            None => return false,
        };
        let changed = match self.infra.signal_status_mut(signal) {
            Some(status) if status.active_aspect != aspect => {
                status.active_aspect = aspect;
                true
            }
            _ => false,
        };
        if changed {
            self.emit(EventName::SignalAspectChanged, signal, self.item_value(signal));
            self.emit(EventName::TrackItemChanged, signal, self.item_value(signal));
        }
        changed
    }

    /// Re-evaluates every signal until no aspect changes any more.
    pub fn refresh_signals(&mut self) {
        let signals: Vec<ItemId> = self
            .infra
            .items
            .values()
            .filter_map(TrackItem::as_signal)
            .map(|s| s.base.id.clone())
            .collect();
        for _ in 0..=signals.len() {
            let mut changed = false;
            for id in &signals {
                changed |= self.apply_aspect(id);
            }
            if !changed {
                break;
            }
        }
    }
}
