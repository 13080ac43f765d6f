//! Trains and their progress along the track and through their service.

use super::dynamics::TrainParams;
use super::position::Position;
use super::service::{PostAction, Service, ServiceLine};
use super::signal::SignalAction;
use super::trackitem::{ItemId, TopologyError, TrackItem};
use super::triggers::TriggerSource;
use super::TrainId;
use crate::input::{de_id, de_opt_id};
use crate::output::events::EventName;
use crate::output::messages::MessageType;
use crate::simulation::Simulation;
use crate::time::{opt_time, DelayGenerator, Time};
use log::{debug, info, warn};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Below this speed a train counts as stopped.
pub const MIN_RUNNING_SPEED: f64 = 0.25;

/// `nextPlaceIndex` value meaning "no more places to call at".
pub const NO_MORE_PLACE: usize = 9999;

/// Speed within which a signal action's target speed counts as reached.
const ACTION_SPEED_TOLERANCE: f64 = 0.1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrainStatus {
    /// Not yet entered the area.
    Inactive,
    Running,
    /// Stopped at a scheduled place.
    Stopped,
    /// Unscheduled stop, e.g. at a red signal.
    Waiting,
    /// Left the area.
    Out,
    /// Service finished and no new service assigned.
    EndOfService,
}

impl Default for TrainStatus {
    fn default() -> Self {
        TrainStatus::Inactive
    }
}

impl Serialize for TrainStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(match self {
            TrainStatus::Inactive => 0,
            TrainStatus::Running => 10,
            TrainStatus::Stopped => 20,
            TrainStatus::Waiting => 30,
            TrainStatus::Out => 40,
            TrainStatus::EndOfService => 50,
        })
    }
}

impl<'de> Deserialize<'de> for TrainStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<TrainStatus, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(TrainStatus::Inactive),
            10 => Ok(TrainStatus::Running),
            20 => Ok(TrainStatus::Stopped),
            30 => Ok(TrainStatus::Waiting),
            40 => Ok(TrainStatus::Out),
            50 => Ok(TrainStatus::EndOfService),
            x => Err(de::Error::custom(format!("invalid train status {}", x))),
        }
    }
}

mod next_place {
    use super::NO_MORE_PLACE;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(idx: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(idx.unwrap_or(NO_MORE_PLACE) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        let idx = Option::<i64>::deserialize(d)?;
        Ok(match idx {
            Some(i) if i >= 0 && (i as usize) < NO_MORE_PLACE => Some(i as usize),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Train {
    #[serde(skip)]
    pub id: TrainId,
    #[serde(default, with = "opt_time")]
    pub appear_time: Option<Time>,
    #[serde(default)]
    pub initial_delay: DelayGenerator,
    #[serde(default)]
    pub initial_speed: f64,
    #[serde(default, with = "next_place")]
    pub next_place_index: Option<usize>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub service_code: Option<String>,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub status: TrainStatus,
    /// Seconds spent stopped at the current place.
    #[serde(default)]
    pub stopped_time: f64,
    #[serde(deserialize_with = "de_id")]
    pub train_type_code: String,
    pub train_head: Position,
    /// Name of the trains manager driving this train, if not the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trains_manager: Option<String>,

    #[serde(skip)]
    pub(crate) eff_initial_delay: f64,
    #[serde(skip)]
    pub(crate) min_stop_time: f64,
    #[serde(skip)]
    pub(crate) signal_actions: Vec<SignalAction>,
    #[serde(skip)]
    pub(crate) action_index: usize,
    #[serde(skip)]
    pub(crate) action_time: Option<Time>,
    #[serde(skip)]
    pub(crate) last_signal: Option<ItemId>,
    /// Points under the train entered through a branch, with that branch.
    #[serde(skip)]
    pub(crate) trail: Vec<(ItemId, ItemId)>,
}

impl Train {
    /// In the area and still in service.
    pub fn is_active(&self) -> bool {
        match self.status {
            TrainStatus::Inactive | TrainStatus::Out | TrainStatus::EndOfService => false,
            _ => true,
        }
    }

    /// The signal action the driver currently obeys.
    pub fn applicable_action(&self) -> SignalAction {
        self.signal_actions.get(self.action_index).cloned().unwrap_or_default()
    }

    /// The last signal seen by the driver. It may still be ahead.
    pub fn last_seen_signal(&self) -> Option<&str> {
        self.last_signal.as_ref().map(String::as_str)
    }

    /// Train descriptor shown on signals.
    pub fn descriptor(&self) -> String {
        self.service_code.clone().unwrap_or_else(|| self.id.to_string())
    }

    fn reset_signal_actions(&mut self) {
        self.signal_actions = vec![SignalAction::default()];
        self.action_index = 0;
        self.action_time = None;
    }
}

impl Simulation {
    pub fn service_of(&self, train: &Train) -> Option<&Service> {
        train.service_code.as_ref().and_then(|c| self.services.get(c))
    }

    pub fn train_params(&self, train: &Train) -> Option<TrainParams> {
        self.train_types.get(&train.train_type_code).map(|t| t.params())
    }

    /// The service line the train is heading for.
    pub fn current_service_line(&self, train: &Train) -> Option<&ServiceLine> {
        let idx = train.next_place_index?;
        self.service_of(train)?.lines.get(idx)
    }

    pub fn train_tail(&self, train: &Train) -> Result<Position, TopologyError> {
        let length = self.train_params(train).map(|p| p.length).unwrap_or(0.0);
        train.train_head.add_along(&self.infra, -length, &train.trail)
    }

    /// Brings the train into the area once its appearance time, delay
    /// included, has come. Returns true if it did.
    pub(crate) fn activate_train_if_due(&mut self, idx: usize) -> bool {
        let now = self.options.current_time;
        {
            let t = &self.trains[idx];
            if t.status != TrainStatus::Inactive {
                return false;
            }
            if let Some(appear) = t.appear_time {
                if now.since(appear.add_seconds(t.eff_initial_delay)) < 0.0 {
                    return false;
                }
            }
        }
        let has_service = self.service_of(&self.trains[idx]).is_some();
        {
            let t = &mut self.trains[idx];
            t.speed = t.initial_speed;
            t.status = if t.stopped_time != 0.0 || !has_service {
                TrainStatus::Stopped
            } else {
                TrainStatus::Running
            };
            if has_service {
                t.next_place_index = Some(0);
            }
            t.reset_signal_actions();
        }
        self.set_descriptor_ahead(idx, true);
        self.occupy_under_train(idx);
        let head_item = self.trains[idx].train_head.track_item.clone();
        self.check_place(idx, &head_item);
        self.log_train_enters_area(idx);
        self.emit(EventName::TrainChanged, &idx.to_string(), self.train_value(idx));
        true
    }

    /// Moves an active train by one step. Returns true if the set of items
    /// occupied by trains changed.
    pub(crate) fn advance_train(&mut self, idx: usize, secs: f64) -> bool {
        if !self.trains[idx].is_active() {
            return false;
        }
        self.update_signal_actions(idx);
        let speed = {
            let t = &self.trains[idx];
            let manager = self.managers.trains_manager(t.trains_manager.as_ref().map(String::as_str));
            manager.speed(self, t, secs)
        };
        let advance = speed * secs;
        let old_head = self.trains[idx].train_head.clone();
        let old_tail = self.train_tail(&self.trains[idx]);
        let new_head = match old_head.add(&self.infra, advance) {
            Ok(pos) => pos,
            Err(e) => {
                warn!("Train {} cannot advance: {}", idx, e);
                self.trains[idx].speed = 0.0;
                return false;
            }
        };
        {
            let t = &mut self.trains[idx];
            t.speed = speed;
            t.train_head = new_head;
        }
        self.update_train_status(idx, secs);

        let mut changed = false;
        if advance > 0.0 {
            changed |= self.move_head(idx, &old_head);
            if let Ok(old_tail) = old_tail {
                changed |= self.move_tail(idx, &old_tail);
            }
        }
        self.emit(EventName::TrainChanged, &idx.to_string(), self.train_value(idx));
        changed
    }

    /// Marks every item from tail to head as occupied by the train.
    pub(crate) fn occupy_under_train(&mut self, idx: usize) {
        let head = self.trains[idx].train_head.clone();
        let positions = self
            .train_tail(&self.trains[idx])
            .and_then(|tail| tail.positions_to(&self.infra, &head));
        match positions {
            Ok(positions) => {
                for pos in &positions {
                    self.occupy(idx, &pos.track_item);
                }
            }
            Err(e) => warn!("Train {} cannot occupy its items: {}", idx, e),
        }
    }

    fn occupy(&mut self, idx: usize, item: &str) -> bool {
        let added = match self.infra.state_mut(item) {
            Some(state) => state.trains.insert(idx),
            None => false,
        };
        if added {
            self.fire_trigger(&TriggerSource::TrackItem(item.to_string()));
            self.emit(EventName::TrackItemChanged, item, self.item_value(item));
        }
        added
    }

    fn vacate(&mut self, idx: usize, item: &str) -> bool {
        let removed = match self.infra.state_mut(item) {
            Some(state) => state.trains.remove(&idx),
            None => false,
        };
        if removed {
            self.fire_trigger(&TriggerSource::TrackItem(item.to_string()));
            self.emit(EventName::TrackItemChanged, item, self.item_value(item));
        }
        removed
    }

    /// Items entered by the head since `old_head`.
    fn move_head(&mut self, idx: usize, old_head: &Position) -> bool {
        let head = self.trains[idx].train_head.clone();
        let entered = match old_head.positions_to(&self.infra, &head) {
            Ok(positions) => positions,
            Err(e) => {
                warn!("Train {} head lost: {}", idx, e);
                return false;
            }
        };
        let mut changed = false;
        for pos in entered.iter().skip(1) {
            if let (Some(TrackItem::Points(p)), Some(from)) =
                (self.infra.items.get(&pos.track_item), pos.previous_item.as_ref()) {
                if p.base.previous_ti_id.as_ref() != Some(from) {
                    self.trains[idx].trail.push((pos.track_item.clone(), from.clone()));
                }
            }
            changed |= self.occupy(idx, &pos.track_item);
            self.check_place(idx, &pos.track_item);
            if self.is_facing_signal(pos) {
                self.signal_passed_by_head(idx, &pos.track_item);
            }
        }
        changed
    }

    /// Items left by the tail since `old_tail`.
    fn move_tail(&mut self, idx: usize, old_tail: &Position) -> bool {
        let tail = match self.train_tail(&self.trains[idx]) {
            Ok(tail) => tail,
            Err(e) => {
                warn!("Train {} tail lost: {}", idx, e);
                return false;
            }
        };
        let left = match old_tail.positions_to(&self.infra, &tail) {
            Ok(positions) => positions,
            Err(e) => {
                warn!("Train {} tail lost: {}", idx, e);
                return false;
            }
        };
        let mut changed = false;
        let head_item = self.trains[idx].train_head.track_item.clone();
        for pos in left.iter().take(left.len().saturating_sub(1)) {
            if pos.track_item == head_item {
                continue;
            }
            changed |= self.vacate(idx, &pos.track_item);
            self.trains[idx].trail.retain(|(points, _)| *points != pos.track_item);
            self.release_behind_train(pos);
        }
        if tail.is_out(&self.infra) {
            let occupied: Vec<ItemId> = self
                .infra
                .state
                .iter()
                .filter(|(_, s)| s.trains.contains(&idx))
                .map(|(id, _)| id.clone())
                .collect();
            for item in occupied {
                changed |= self.vacate(idx, &item);
            }
            {
                let t = &mut self.trains[idx];
                t.status = TrainStatus::Out;
                t.speed = 0.0;
                t.trail.clear();
            }
            self.log_and_score_train_exited(idx);
        }
        changed
    }

    /// Pushes the train descriptor on to the next signal.
    fn signal_passed_by_head(&mut self, idx: usize, signal: &str) {
        let descriptor = self.trains[idx].descriptor();
        if let Some(next) = self.next_signal(signal) {
            if let Some(status) = self.infra.signal_status_mut(&next) {
                status.train_id = descriptor.clone();
            }
            self.emit(EventName::TrackItemChanged, &next, self.item_value(&next));
        }
        if let Some(status) = self.infra.signal_status_mut(signal) {
            // A train behind in the same block keeps its descriptor.
            if status.train_id == descriptor {
                status.train_id.clear();
            }
        }
        self.update_signal_state(signal);
    }

    /// Shows (or clears) the train descriptor on the first signal ahead.
    fn set_descriptor_ahead(&mut self, idx: usize, show: bool) {
        let descriptor = self.trains[idx].descriptor();
        let ahead = self.next_signal_position(&self.trains[idx].train_head);
        if let Some(pos) = ahead {
            if let Some(status) = self.infra.signal_status_mut(&pos.track_item) {
                if show {
                    status.train_id = descriptor;
                } else if status.train_id == descriptor {
                    status.train_id.clear();
                }
            }
            self.emit(EventName::TrackItemChanged, &pos.track_item, self.item_value(&pos.track_item));
        }
    }

    /// Reads the actions of the next signal when it comes into sight, and
    /// moves on to the following action once the current one is fulfilled.
    fn update_signal_actions(&mut self, idx: usize) {
        let head = self.trains[idx].train_head.clone();
        let next = match self.next_signal_position(&head) {
            Some(pos) => pos,
            None => {
                self.trains[idx].reset_signal_actions();
                return;
            }
        };
        let distance = match next.sub(&self.infra, &head) {
            Ok(d) => d,
            Err(e) => {
                warn!("Train {} cannot see signal {}: {}", idx, next.track_item, e);
                return;
            }
        };
        if distance < self.options.default_signal_visibility {
            let actions = self
                .active_aspect(&next.track_item)
                .map(|a| a.actions.clone())
                .unwrap_or_default();
            let t = &mut self.trains[idx];
            let first_sight = t.last_signal.as_ref() != Some(&next.track_item);
            t.last_signal = Some(next.track_item.clone());
            if !actions.is_empty() {
                t.signal_actions = actions;
                if first_sight || t.action_index >= t.signal_actions.len() {
                    t.action_index = 0;
                    t.action_time = None;
                }
            }
        }

        let now = self.options.current_time;
        let t = &mut self.trains[idx];
        let action = t.applicable_action();
        if (t.speed - action.speed).abs() < ACTION_SPEED_TOLERANCE {
            let since = *t.action_time.get_or_insert(now);
            if now.since(since) > action.duration && t.action_index + 1 < t.signal_actions.len() {
                t.action_index += 1;
                t.action_time = None;
            }
        }
    }

    /// Passing a waypoint: a place of the service where the train does not
    /// stop.
    fn check_place(&mut self, idx: usize, item: &str) {
        let place = match self.current_service_line(&self.trains[idx]) {
            Some(line) if !line.must_stop => line.place_code.clone(),
            _ => return,
        };
        match self.infra.items.get(item) {
            Some(ti) if ti.is_at_place(&place) => {}
            _ => return,
        }
        debug!("Train {} passes waypoint {}", idx, place);
        self.jump_to_next_service_line(idx);
    }

    fn jump_to_next_service_line(&mut self, idx: usize) {
        let min_stop = self.options.default_minimum_stop_time.yield_delay(&mut self.rng);
        self.trains[idx].min_stop_time = min_stop;
        let (n_lines, post_actions) = match self.service_of(&self.trains[idx]) {
            Some(s) => (s.lines.len(), s.post_actions.clone()),
            None => return,
        };
        match self.trains[idx].next_place_index {
            Some(i) if i + 1 < n_lines => {
                self.trains[idx].next_place_index = Some(i + 1);
                return;
            }
            _ => {}
        }
        self.trains[idx].next_place_index = None;
        for action in post_actions {
            match action.action() {
                PostAction::Reverse => self.reverse_train(idx),
                PostAction::SetService(code) => {
                    if !self.services.contains_key(&code) {
                        warn!("Train {}: unknown service {}", idx, code);
                        continue;
                    }
                    self.set_descriptor_ahead(idx, false);
                    {
                        let t = &mut self.trains[idx];
                        t.service_code = Some(code);
                        t.next_place_index = Some(0);
                        t.status = if t.stopped_time != 0.0 {
                            TrainStatus::Stopped
                        } else {
                            TrainStatus::Running
                        };
                    }
                    self.set_descriptor_ahead(idx, true);
                }
                PostAction::Split(param) | PostAction::Join(param) => {
                    let text = format!(
                        "Train {}: {} {} is not supported",
                        self.trains[idx].descriptor(),
                        action.action_code,
                        param
                    );
                    self.log_message(text, MessageType::Simulation);
                }
                PostAction::Unknown(code) => warn!("Train {}: unknown post action {}", idx, code),
            }
        }
    }

    /// Turns a stopped train round: the tail becomes the head.
    pub fn reverse_train(&mut self, idx: usize) {
        if self.trains[idx].speed != 0.0 {
            return;
        }
        self.set_descriptor_ahead(idx, false);
        let head_item = self.trains[idx].train_head.track_item.clone();
        if let Some(route) = self.infra.active_route(&head_item).cloned() {
            if let Err(e) = self.deactivate_route(&route) {
                self.log_message(e.to_string(), MessageType::Simulation);
            }
        }
        let reversed = self
            .train_tail(&self.trains[idx])
            .and_then(|tail| tail.reversed(&self.infra));
        match reversed {
            Ok(head) => {
                let t = &mut self.trains[idx];
                t.train_head = head;
                t.trail.clear();
            }
            Err(e) => {
                warn!("Train {} cannot reverse: {}", idx, e);
                return;
            }
        }
        info!("Train {} reversed", idx);
        self.set_descriptor_ahead(idx, true);
        self.trains[idx].reset_signal_actions();
        self.update_signal_actions(idx);
    }

    fn update_train_status(&mut self, idx: usize, secs: f64) {
        if !self.trains[idx].is_active() {
            return;
        }
        if self.trains[idx].speed > MIN_RUNNING_SPEED {
            self.trains[idx].status = TrainStatus::Running;
            return;
        }
        let (place_code, departure) = match self.current_service_line(&self.trains[idx]) {
            Some(line) => (line.place_code.clone(), line.scheduled_departure_time),
            None => {
                self.trains[idx].status = TrainStatus::Waiting;
                return;
            }
        };
        let head_item = self.trains[idx].train_head.track_item.clone();
        let at_place = self.infra.items.get(&head_item).map_or(false, |ti| ti.is_at_place(&place_code));
        if !at_place {
            self.trains[idx].status = TrainStatus::Waiting;
            return;
        }
        match self.trains[idx].status {
            TrainStatus::Running | TrainStatus::Waiting => {
                {
                    let t = &mut self.trains[idx];
                    t.status = TrainStatus::Stopped;
                    t.stopped_time = 0.0;
                }
                self.emit(EventName::TrainStoppedAtStation, &idx.to_string(), self.train_value(idx));
                self.log_and_score_train_stopped(idx);
                return;
            }
            TrainStatus::Stopped => {}
            _ => return,
        }

        let now = self.options.current_time;
        let t = &self.trains[idx];
        let can_depart = match departure {
            Some(dep) => now.since(dep) >= 0.0 && t.stopped_time >= t.min_stop_time,
            None => false,
        };
        if !can_depart {
            self.trains[idx].stopped_time += secs;
            return;
        }

        let old_service = self.trains[idx].service_code.clone();
        self.jump_to_next_service_line(idx);
        if self.trains[idx].service_code != old_service {
            let first_place_here = self
                .current_service_line(&self.trains[idx])
                .map(|l| l.place_code == place_code)
                .unwrap_or(false);
            if first_place_here {
                self.trains[idx].status = TrainStatus::Stopped;
                self.trains[idx].stopped_time = 0.0;
                return;
            }
            self.trains[idx].status = TrainStatus::Running;
            self.emit(EventName::TrainDepartedFromStation, &idx.to_string(), self.train_value(idx));
            return;
        }
        if self.trains[idx].next_place_index.is_none() {
            self.trains[idx].status = TrainStatus::EndOfService;
            info!("Train {} ended its service", idx);
            return;
        }
        self.trains[idx].status = TrainStatus::Running;
        self.emit(EventName::TrainDepartedFromStation, &idx.to_string(), self.train_value(idx));
    }

    fn log_train_enters_area(&mut self, idx: usize) {
        let t = &self.trains[idx];
        let delay = t.eff_initial_delay;
        let text = if delay.abs() < 60.0 {
            format!("Train {} entered the area on time", t.descriptor())
        } else if delay < 0.0 {
            format!("Train {} entered the area {} minutes early", t.descriptor(), (-delay / 60.0) as i64)
        } else {
            format!("Train {} entered the area {} minutes late", t.descriptor(), (delay / 60.0) as i64)
        };
        self.log_message(text, MessageType::Simulation);
    }

    fn log_and_score_train_stopped(&mut self, idx: usize) {
        let t = &self.trains[idx];
        let descriptor = t.descriptor();
        let delay_at_entry = t.eff_initial_delay;
        let head_item = t.train_head.track_item.clone();
        let (planned_track, arrival) = match self.current_service_line(t) {
            Some(line) => (line.track_code.clone(), line.scheduled_arrival_time),
            None => return,
        };
        let (place_name, actual_track) = match self.infra.items.get(&head_item) {
            Some(item) => (
                self.infra.place_of(&head_item).map(|p| p.base.name.clone()).unwrap_or_default(),
                item.base().track_code.clone(),
            ),
            None => return,
        };
        if actual_track != planned_track {
            self.update_score(self.options.wrong_platform_penalty);
            self.log_message(
                format!("Train {} arrived at station {} on platform {} instead of {}",
                        descriptor, place_name, actual_track, planned_track),
                MessageType::Simulation,
            );
        }
        let delay = arrival.map(|a| self.options.current_time.since(a)).unwrap_or(0.0);
        if delay > 60.0 {
            let player_delay = delay - delay_at_entry;
            if player_delay > 60.0 {
                self.update_score(self.options.late_penalty * (player_delay / 60.0) as i64);
            }
            self.log_message(
                format!("Train {} arrived {} minutes late at station {} ({:+} minutes)",
                        descriptor, (delay / 60.0) as i64, place_name, (player_delay / 60.0) as i64),
                MessageType::Simulation,
            );
            return;
        }
        self.log_message(format!("Train {} arrived on time at station {}", descriptor, place_name),
                         MessageType::Simulation);
    }

    fn log_and_score_train_exited(&mut self, idx: usize) {
        let descriptor = self.trains[idx].descriptor();
        if self.trains[idx].next_place_index.is_some() {
            self.update_score(self.options.wrong_destination_penalty);
            self.log_message(format!("Train {} badly routed", descriptor), MessageType::Simulation);
        }
        self.log_message(format!("Train {} exited the area", descriptor), MessageType::Simulation);
    }
}
