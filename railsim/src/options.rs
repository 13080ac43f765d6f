//! Simulation options, as found in the `options` object of a scenario.

use crate::output::events::EventName;
use crate::simulation::Simulation;
use crate::time::{DelayGenerator, Time};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Scenario format understood by this engine.
pub const VERSION: &str = "0.7";

#[derive(Debug, Fail)]
pub enum OptionError {
    #[fail(display = "unknown option {}", _0)]
    Unknown(String),
    #[fail(display = "invalid value {} for option {}", value, name)]
    InvalidValue { name: String, value: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OptionKind {
    Text,
    Float,
    Integer,
    Boolean,
    TimeOfDay,
    Delay,
}

/// Options a client may set while the simulation runs.
pub const OPTION_SCHEMA: &[(&str, OptionKind)] = &[
    ("title", OptionKind::Text),
    ("description", OptionKind::Text),
    ("clientToken", OptionKind::Text),
    ("timeFactor", OptionKind::Float),
    ("currentTime", OptionKind::TimeOfDay),
    ("warningSpeed", OptionKind::Float),
    ("defaultMaxSpeed", OptionKind::Float),
    ("defaultSignalVisibility", OptionKind::Float),
    ("defaultDelayAtEntry", OptionKind::Delay),
    ("defaultMinimumStopTime", OptionKind::Delay),
    ("trackCircuitBased", OptionKind::Boolean),
    ("currentScore", OptionKind::Integer),
    ("wrongPlatformPenalty", OptionKind::Integer),
    ("wrongDestinationPenalty", OptionKind::Integer),
    ("latePenalty", OptionKind::Integer),
];

fn default_time_factor() -> f64 {
    5.0
}
fn default_max_speed() -> f64 {
    18.06
}
fn default_signal_visibility() -> f64 {
    100.0
}
fn default_wrong_platform_penalty() -> i64 {
    5
}
fn default_wrong_destination_penalty() -> i64 {
    100
}
fn default_late_penalty() -> i64 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub client_token: String,
    #[serde(default = "default_time_factor")]
    pub time_factor: f64,
    #[serde(default)]
    pub current_time: Time,
    #[serde(default)]
    pub warning_speed: f64,
    #[serde(default = "default_max_speed")]
    pub default_max_speed: f64,
    #[serde(default = "default_signal_visibility")]
    pub default_signal_visibility: f64,
    #[serde(default)]
    pub default_delay_at_entry: DelayGenerator,
    #[serde(default)]
    pub default_minimum_stop_time: DelayGenerator,
    #[serde(default)]
    pub track_circuit_based: bool,
    #[serde(default)]
    pub current_score: i64,
    #[serde(default = "default_wrong_platform_penalty")]
    pub wrong_platform_penalty: i64,
    #[serde(default = "default_wrong_destination_penalty")]
    pub wrong_destination_penalty: i64,
    #[serde(default = "default_late_penalty")]
    pub late_penalty: i64,
    /// Options this engine does not use, kept for saving.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            title: String::new(),
            description: String::new(),
            version: VERSION.to_string(),
            client_token: String::new(),
            time_factor: default_time_factor(),
            current_time: Time::default(),
            warning_speed: 0.0,
            default_max_speed: default_max_speed(),
            default_signal_visibility: default_signal_visibility(),
            default_delay_at_entry: DelayGenerator::default(),
            default_minimum_stop_time: DelayGenerator::default(),
            track_circuit_based: false,
            current_score: 0,
            wrong_platform_penalty: default_wrong_platform_penalty(),
            wrong_destination_penalty: default_wrong_destination_penalty(),
            late_penalty: default_late_penalty(),
            other: BTreeMap::new(),
        }
    }
}

/// A JSON value converted to the type an option expects.
enum Typed {
    Text(String),
    Float(f64),
    Integer(i64),
    Boolean(bool),
    TimeOfDay(Time),
    Delay(DelayGenerator),
}

fn convert(kind: OptionKind, value: &Value) -> Option<Typed> {
    match kind {
        OptionKind::Text => value.as_str().map(|s| Typed::Text(s.to_string())),
        OptionKind::Float => value.as_f64().map(Typed::Float),
        OptionKind::Integer => value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Typed::Integer),
        OptionKind::Boolean => value.as_bool().map(Typed::Boolean),
        OptionKind::TimeOfDay => match Time::parse(value.as_str()?) {
            Ok(Some(t)) => Some(Typed::TimeOfDay(t)),
            _ => None,
        },
        OptionKind::Delay => DelayGenerator::from_value(value).ok().map(Typed::Delay),
    }
}

impl Options {
    pub fn kind_of(name: &str) -> Option<OptionKind> {
        OPTION_SCHEMA.iter().find(|(n, _)| *n == name).map(|(_, k)| *k)
    }

    /// Sets an option by its document name. Nothing changes on error.
    pub fn set(&mut self, name: &str, value: &Value) -> Result<(), OptionError> {
        let kind = Options::kind_of(name).ok_or_else(|| OptionError::Unknown(name.to_string()))?;
        let typed = convert(kind, value).ok_or_else(|| OptionError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        })?;
        match (name, typed) {
            ("title", Typed::Text(v)) => self.title = v,
            ("description", Typed::Text(v)) => self.description = v,
            ("clientToken", Typed::Text(v)) => self.client_token = v,
            ("timeFactor", Typed::Float(v)) => self.time_factor = v,
            ("currentTime", Typed::TimeOfDay(v)) => self.current_time = v,
            ("warningSpeed", Typed::Float(v)) => self.warning_speed = v,
            ("defaultMaxSpeed", Typed::Float(v)) => self.default_max_speed = v,
            ("defaultSignalVisibility", Typed::Float(v)) => self.default_signal_visibility = v,
            ("defaultDelayAtEntry", Typed::Delay(v)) => self.default_delay_at_entry = v,
            ("defaultMinimumStopTime", Typed::Delay(v)) => self.default_minimum_stop_time = v,
            ("trackCircuitBased", Typed::Boolean(v)) => self.track_circuit_based = v,
            ("currentScore", Typed::Integer(v)) => self.current_score = v,
            ("wrongPlatformPenalty", Typed::Integer(v)) => self.wrong_platform_penalty = v,
            ("wrongDestinationPenalty", Typed::Integer(v)) => self.wrong_destination_penalty = v,
            ("latePenalty", Typed::Integer(v)) => self.late_penalty = v,
            _ => return Err(OptionError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

impl Simulation {
    pub fn set_option(&mut self, name: &str, value: &Value) -> Result<(), OptionError> {
        self.options.set(name, value)?;
        if name == "defaultMaxSpeed" {
            self.infra.default_max_speed = self.options.default_max_speed;
        }
        info!("Option {} set to {}", name, value);
        self.emit(EventName::OptionsChanged, "", serde_json::to_value(&self.options).unwrap_or_default());
        Ok(())
    }

    /// Adds `penalty` points to the score.
    pub fn update_score(&mut self, penalty: i64) {
        self.options.current_score += penalty;
        self.emit(EventName::ScoreChanged, "", Value::from(self.options.current_score));
    }
}
