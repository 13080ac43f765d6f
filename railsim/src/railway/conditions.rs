//! Conditions used by signal states.
//!
//! `values` are given by the signal type, `params` by the signal itself
//! through its custom properties.

use super::trackitem::PointDirection;
use super::triggers::TriggerSource;
use crate::simulation::Simulation;

/// Aspect names ending with this suffix are looked through to the signal
/// beyond.
const SKIP_SUFFIX: char = '!';

const MAX_SIGNAL_LOOKUP: usize = 100;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConditionKind {
    NextRouteActive,
    PreviousRouteActive,
    RouteSetAcross,
    TrainNotPresentOnNextRoute,
    TrainNotPresentBeforeNextSignal,
    TrainNotPresentOnItems,
    TrainPresentOnItems,
    RoutesSet,
    NextSignalAspects,
    RouteExitSignalAspects,
}

use self::ConditionKind::*;

const ALL: [ConditionKind; 10] = [
    NextRouteActive,
    PreviousRouteActive,
    RouteSetAcross,
    TrainNotPresentOnNextRoute,
    TrainNotPresentBeforeNextSignal,
    TrainNotPresentOnItems,
    TrainPresentOnItems,
    RoutesSet,
    NextSignalAspects,
    RouteExitSignalAspects,
];

impl ConditionKind {
    pub fn code(&self) -> &'static str {
        match self {
            NextRouteActive => "NEXT_ROUTE_ACTIVE",
            PreviousRouteActive => "PREVIOUS_ROUTE_ACTIVE",
            RouteSetAcross => "ROUTE_SET_ACROSS",
            TrainNotPresentOnNextRoute => "TRAIN_NOT_PRESENT_ON_NEXT_ROUTE",
            TrainNotPresentBeforeNextSignal => "TRAIN_NOT_PRESENT_BEFORE_NEXT_SIGNAL",
            TrainNotPresentOnItems => "TRAIN_NOT_PRESENT_ON_ITEMS",
            TrainPresentOnItems => "TRAIN_PRESENT_ON_ITEMS",
            RoutesSet => "ROUTES_SET",
            NextSignalAspects => "NEXT_SIGNAL_ASPECTS",
            RouteExitSignalAspects => "ROUTE_EXIT_SIGNAL_ASPECTS",
        }
    }

    pub fn from_code(code: &str) -> Option<ConditionKind> {
        ALL.iter().cloned().find(|k| k.code() == code)
    }

    /// Sources whose changes must trigger a re-evaluation of the signal.
    /// Other conditions are covered by route changes and the refresh after
    /// occupancy changes.
    pub fn trigger_sources(&self, params: &[String]) -> Vec<TriggerSource> {
        match self {
            TrainNotPresentOnItems | TrainPresentOnItems => {
                params.iter().map(|id| TriggerSource::TrackItem(id.clone())).collect()
            }
            RoutesSet => params.iter().map(|id| TriggerSource::Route(id.clone())).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_met(&self, sim: &Simulation, signal: &str, values: &[String], params: &[String]) -> bool {
        let status = match sim.infra.signal_status(signal) {
            Some(status) => status,
            None => return false,
        };
        let route_active = |id: Option<&String>| {
            id.and_then(|r| sim.routes.get(r)).map(|r| r.is_active()).unwrap_or(false)
        };
        match self {
            NextRouteActive => route_active(status.next_active_route.as_ref()),
            PreviousRouteActive => route_active(status.previous_active_route.as_ref()),
            RouteSetAcross => {
                let route = match sim.infra.active_route(signal).and_then(|r| sim.routes.get(r)) {
                    Some(route) => route,
                    None => return false,
                };
                let n = route.positions.len();
                n > 2 && route.positions[1..n - 1].iter().any(|p| sim.is_on_position(signal, p))
            }
            TrainNotPresentOnNextRoute => {
                let next = status.next_active_route.as_ref().and_then(|r| sim.routes.get(r));
                match next {
                    Some(route) => !route.positions.iter().any(|p| sim.infra.has_train(&p.track_item)),
                    None => train_not_present_before_next_signal(sim, signal, &[]),
                }
            }
            TrainNotPresentBeforeNextSignal => train_not_present_before_next_signal(sim, signal, values),
            TrainNotPresentOnItems => params.iter().all(|id| !sim.infra.has_train(id)),
            TrainPresentOnItems => params.iter().all(|id| sim.infra.has_train(id)),
            RoutesSet => params.iter().any(|id| route_active(Some(id))),
            NextSignalAspects => check_signal_aspect(sim, sim.next_signal(signal), values, 0),
            RouteExitSignalAspects => {
                let exit = status
                    .next_active_route
                    .as_ref()
                    .and_then(|r| sim.routes.get(r))
                    .and_then(|r| sim.infra.signal_status(&r.end_signal));
                match exit {
                    Some(exit) => values.iter().any(|v| *v == exit.active_aspect),
                    None => false,
                }
            }
        }
    }
}

fn skipped_aspect(value: &str) -> Option<&str> {
    if value.ends_with(SKIP_SUFFIX) {
        Some(value.trim_end_matches(SKIP_SUFFIX))
    } else {
        None
    }
}

/// Walks ahead of the signal up to the next facing signal. Signals showing
/// one of the `!` aspects of `values` are walked through.
fn train_not_present_before_next_signal(sim: &Simulation, signal: &str, values: &[String]) -> bool {
    let mut pos = match sim.signal_position(signal) {
        Some(pos) => pos,
        None => return true,
    };
    for _ in 0..=sim.infra.items.len() {
        if pos.is_out(&sim.infra) {
            break;
        }
        if sim.infra.has_train(&pos.track_item) {
            return false;
        }
        if pos.track_item != signal && sim.is_facing_signal(&pos) {
            let shown = sim
                .infra
                .signal_status(&pos.track_item)
                .map(|s| s.active_aspect.as_str())
                .unwrap_or("");
            let skip = values.iter().filter_map(|v| skipped_aspect(v)).any(|a| a == shown);
            if !skip {
                break;
            }
        }
        pos = match pos.next(&sim.infra, PointDirection::Current) {
            Ok(next) => next,
            Err(_) => break,
        };
    }
    true
}

fn check_signal_aspect(sim: &Simulation, signal: Option<String>, values: &[String], depth: usize) -> bool {
    if depth > MAX_SIGNAL_LOOKUP {
        return false;
    }
    let signal = match signal {
        Some(s) => s,
        None => return false,
    };
    let shown = match sim.infra.signal_status(&signal) {
        Some(s) => s.active_aspect.as_str(),
        None => return false,
    };
    for v in values {
        match skipped_aspect(v) {
            Some(aspect) if aspect == shown => {
                return check_signal_aspect(sim, sim.next_signal(&signal), values, depth + 1);
            }
            Some(_) => continue,
            None if v == shown => return true,
            None => {}
        }
    }
    false
}
