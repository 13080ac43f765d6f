//! The standard driver: obeys signals, speed limits, timetabled stops and
//! keeps clear of the train ahead.

use super::dynamics::{next_velocity, StaticMaximumVelocityProfile, TrainParams};
use super::position::Position;
use super::signal::ActionTarget;
use super::trackitem::{PointDirection, TrackItem};
use super::train::{Train, TrainStatus};
use crate::managers::TrainsManager;
use crate::simulation::Simulation;

/// Shortest distance the driver looks ahead, whatever the speed.
pub const MIN_LOOK_AHEAD: f64 = 50.0;
/// Gap kept to the train ahead.
pub const LINE_SAFETY_DISTANCE: f64 = 100.0;

pub struct StandardTrainsManager;

impl TrainsManager for StandardTrainsManager {
    fn name(&self) -> &str {
        "Standard trains manager"
    }

    fn speed(&self, sim: &Simulation, train: &Train, elapsed: f64) -> f64 {
        if !train.is_active() || train.status == TrainStatus::Stopped {
            return 0.0;
        }
        let params = match sim.train_params(train) {
            Some(p) => p,
            None => return 0.0,
        };
        let head = &train.train_head;
        let local_max = params.max_vel.min(sim.infra.max_speed(&head.track_item));
        let look_ahead = if params.max_brk > 0.0 {
            (train.speed * train.speed / params.max_brk).max(MIN_LOOK_AHEAD)
        } else {
            MIN_LOOK_AHEAD
        };

        let mut profile = StaticMaximumVelocityProfile::new(local_max);
        if let Some(dx) = distance_to_next_stop(sim, train, look_ahead) {
            profile.restrict(dx, 0.0);
        }
        for (dx, v) in speed_limits_ahead(sim, head, local_max, look_ahead) {
            profile.restrict(dx, v);
        }
        if let Some(dx) = distance_to_next_train(sim, train, look_ahead) {
            profile.restrict((dx - LINE_SAFETY_DISTANCE).max(0.0), 0.0);
        }
        apply_signal_action(sim, train, &params, &mut profile, elapsed);

        next_velocity(&params, train.speed, &profile, elapsed)
    }
}

/// Distance to the end of the first line item of the next place where the
/// train must stop. A signal at danger before it takes precedence.
fn distance_to_next_stop(sim: &Simulation, train: &Train, look_ahead: f64) -> Option<f64> {
    let service = sim.service_of(train)?;
    let stop = service.next_stop(train.next_place_index?)?;
    let place = &service.lines[stop].place_code;

    let mut cur = train.train_head.clone();
    let mut dist = -cur.position_on_ti;
    for _ in 0..sim.infra.items.len() {
        if dist > look_ahead {
            return None;
        }
        let item = sim.infra.items.get(&cur.track_item)?;
        dist += item.real_length();
        match item {
            _ if item.is_at_place(place) => return Some(dist.max(0.0)),
            TrackItem::End(_) => return None,
            _ => {}
        }
        cur = cur.next(&sim.infra, PointDirection::Current).ok()?;
        if sim.is_facing_signal(&cur) {
            let proceed = sim.active_aspect(&cur.track_item).map(|a| a.means_proceed()).unwrap_or(false);
            if !proceed {
                return None;
            }
        }
    }
    None
}

/// Lower speed limits starting within `look_ahead`, as distance to the
/// start of the item and its limit.
fn speed_limits_ahead(sim: &Simulation, head: &Position, local_max: f64, look_ahead: f64) -> Vec<(f64, f64)> {
    let mut limits = Vec::new();
    let mut cur = head.clone();
    let mut dist = match sim.infra.real_length(&head.track_item) {
        Ok(len) => len - head.position_on_ti,
        Err(_) => return limits,
    };
    while dist <= look_ahead {
        cur = match cur.next(&sim.infra, PointDirection::Current) {
            Ok(pos) if !pos.is_out(&sim.infra) => pos,
            _ => break,
        };
        let limit = sim.infra.max_speed(&cur.track_item);
        if limit < local_max {
            limits.push((dist, limit));
        }
        dist += match sim.infra.real_length(&cur.track_item) {
            Ok(len) => len,
            Err(_) => break,
        };
    }
    limits
}

/// Distance from the head to the closest point of another train ahead:
/// the tail of a train running the same way, or the head of one coming
/// towards us.
fn distance_to_next_train(sim: &Simulation, train: &Train, look_ahead: f64) -> Option<f64> {
    let head = &train.train_head;
    let max = look_ahead + LINE_SAFETY_DISTANCE;
    sim.trains
        .iter()
        .filter(|other| other.id != train.id && other.is_active())
        .flat_map(|other| {
            let tail = sim.train_tail(other).ok();
            let front = other.train_head.reversed(&sim.infra).ok();
            tail.into_iter().chain(front)
        })
        .filter_map(|pos| pos.distance_from(&sim.infra, head, max).ok().and_then(|d| d))
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))))
}

fn apply_signal_action(sim: &Simulation,
                       train: &Train,
                       params: &TrainParams,
                       profile: &mut StaticMaximumVelocityProfile,
                       elapsed: f64) {
    let action = train.applicable_action();
    let head = &train.train_head;
    let next = sim.next_signal_position(head);
    let seen = match (&next, train.last_seen_signal()) {
        (Some(pos), Some(last)) => pos.track_item == last,
        _ => false,
    };
    let distance_to = |pos: &Position| pos.sub(&sim.infra, head).ok();

    match action.target {
        ActionTarget::Asap => {
            profile.cap(action.speed.max(train.speed - params.max_brk * elapsed));
        }
        ActionTarget::BeforeThisSignal => match next.as_ref().filter(|_| seen).and_then(|p| distance_to(p)) {
            Some(dx) => profile.restrict(dx, action.speed),
            None => profile.cap(action.speed),
        },
        ActionTarget::BeforeNextSignal => {
            let target = if seen {
                next.as_ref()
                    .and_then(|p| sim.next_signal(&p.track_item))
                    .and_then(|s| sim.signal_position(&s))
            } else {
                next
            };
            if let Some(dx) = target.as_ref().and_then(|p| distance_to(p)) {
                profile.restrict(dx, action.speed);
            }
        }
    }
}
