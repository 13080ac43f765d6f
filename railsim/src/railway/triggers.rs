//! Subscriptions of signals to the items and routes their conditions
//! depend on.

use super::trackitem::{ItemId, TrackItem};
use super::RouteId;
use crate::input::scenario::LoadError;
use crate::simulation::Simulation;
use log::debug;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    /// Train occupancy of an item changed.
    TrackItem(ItemId),
    /// A route was activated or deactivated.
    Route(RouteId),
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TriggerSource::TrackItem(id) => write!(f, "TrackItem {}", id),
            TriggerSource::Route(id) => write!(f, "Route {}", id),
        }
    }
}

/// Source to subscribed signals.
#[derive(Debug, Default)]
pub struct Triggers {
    subscribers: HashMap<TriggerSource, SmallVec<[ItemId; 2]>>,
}

impl Triggers {
    pub fn subscribe(&mut self, source: TriggerSource, signal: &str) {
        let subs = self.subscribers.entry(source).or_insert_with(SmallVec::new);
        if !subs.iter().any(|s| s == signal) {
            subs.push(signal.to_string());
        }
    }

    pub fn subscribers(&self, source: &TriggerSource) -> &[ItemId] {
        self.subscribers.get(source).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.subscribers.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl Simulation {
    /// Re-evaluates every signal subscribed to `source`.
    pub(crate) fn fire_trigger(&mut self, source: &TriggerSource) {
        let signals = self.triggers.subscribers(source).to_vec();
        for signal in signals {
            self.update_signal_state(&signal);
        }
    }

    /// Builds the subscription table from the conditions of every signal.
    /// Conditions naming unknown items or routes are rejected.
    pub(crate) fn setup_triggers(&mut self) -> Result<(), LoadError> {
        let mut triggers = Triggers::default();
        for item in self.infra.items.values() {
            let signal = match item {
                TrackItem::Signal(s) => s,
                _ => continue,
            };
            let signal_type = self
                .signal_library
                .signal_types
                .get(&signal.signal_type)
                .ok_or_else(|| LoadError::UnknownSignalType {
                    signal: signal.base.id.clone(),
                    signal_type: signal.signal_type.clone(),
                })?;
            for state in &signal_type.states {
                for (kind, _) in &state.parsed {
                    let params = signal
                        .base
                        .custom_properties
                        .get(kind.code())
                        .and_then(|p| p.get(&state.aspect_name))
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    for source in kind.trigger_sources(params) {
                        let known = match &source {
                            TriggerSource::TrackItem(id) => self.infra.items.contains_key(id),
                            TriggerSource::Route(id) => self.routes.contains_key(id),
                        };
                        if !known {
                            return Err(LoadError::UnknownReference {
                                signal: signal.base.id.clone(),
                                condition: kind.code().to_string(),
                                reference: source,
                            });
                        }
                        triggers.subscribe(source, &signal.base.id);
                    }
                }
            }
        }
        debug!("{} signal triggers installed", triggers.len());
        self.triggers = triggers;
        Ok(())
    }
}
