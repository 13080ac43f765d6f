//! Rolling stock types and timetabled services.

use super::dynamics::TrainParams;
use crate::input::{de_id, de_or_default};
use crate::time::{opt_time, Time};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainType {
    #[serde(skip)]
    pub code: String,
    #[serde(default, deserialize_with = "de_or_default")]
    pub description: String,
    #[serde(default)]
    pub emerg_braking: f64,
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub max_speed: f64,
    #[serde(default)]
    pub std_accel: f64,
    #[serde(default)]
    pub std_braking: f64,
    /// Codes of the train types this one is made of.
    #[serde(default, deserialize_with = "de_or_default")]
    pub elements: Vec<String>,
}

impl TrainType {
    pub fn params(&self) -> TrainParams {
        TrainParams {
            length: self.length,
            max_acc: self.std_accel,
            max_brk: self.std_braking,
            emergency_brk: self.emerg_braking.max(self.std_braking),
            max_vel: self.max_speed,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLine {
    #[serde(default)]
    pub must_stop: bool,
    #[serde(default, deserialize_with = "de_or_default")]
    pub place_code: String,
    #[serde(default, with = "opt_time")]
    pub scheduled_arrival_time: Option<Time>,
    #[serde(default, with = "opt_time")]
    pub scheduled_departure_time: Option<Time>,
    #[serde(default, deserialize_with = "de_or_default")]
    pub track_code: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PostAction {
    /// Turn the train round where it stands.
    Reverse,
    /// Continue under another service.
    SetService(String),
    Split(String),
    Join(String),
    Unknown(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAction {
    #[serde(deserialize_with = "de_id")]
    pub action_code: String,
    #[serde(default, deserialize_with = "de_or_default")]
    pub action_param: String,
}

impl ServiceAction {
    pub fn action(&self) -> PostAction {
        match self.action_code.as_str() {
            "REVERSE" => PostAction::Reverse,
            "SET_SERVICE" => PostAction::SetService(self.action_param.clone()),
            "SPLIT" => PostAction::Split(self.action_param.clone()),
            "JOIN" => PostAction::Join(self.action_param.clone()),
            other => PostAction::Unknown(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(skip)]
    pub service_code: String,
    #[serde(default, deserialize_with = "de_or_default")]
    pub description: String,
    #[serde(default, deserialize_with = "de_or_default")]
    pub lines: Vec<ServiceLine>,
    #[serde(rename = "plannedTrainType", default, deserialize_with = "de_or_default")]
    pub planned_train_type: String,
    #[serde(default, deserialize_with = "de_or_default")]
    pub post_actions: Vec<ServiceAction>,
}

impl Service {
    /// Scheduled departure from the first place, used to order trains.
    pub fn first_departure(&self) -> Option<Time> {
        self.lines.first().and_then(|l| l.scheduled_departure_time)
    }

    /// Index of the first line from `from` where the train must stop.
    pub fn next_stop(&self, from: usize) -> Option<usize> {
        (from..self.lines.len()).find(|&i| self.lines[i].must_stop)
    }
}
