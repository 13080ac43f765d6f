//! Loading and saving scenario documents.
//!
//! A scenario is one JSON object holding the options, the signal library,
//! the track items, routes, rolling stock, services, trains and the
//! message log. Loading validates everything up front so that the running
//! simulation can rely on consistent references.

use crate::managers::ManagerRegistry;
use crate::options::{Options, VERSION};
use crate::output::events::EventSink;
use crate::output::messages::MessageLogger;
use crate::railway::infrastructure::Infrastructure;
use crate::railway::route::{Route, RouteError};
use crate::railway::service::{Service, TrainType};
use crate::railway::signal::{SignalError, SignalLibrary};
use crate::railway::trackitem::{
    check_links, BasicItem, ItemId, LineItem, Place, PointsItem, SignalItem, TopologyError, TrackItem,
};
use crate::railway::train::Train;
use crate::railway::triggers::{TriggerSource, Triggers};
use crate::simulation::{Simulation, DEFAULT_SEED};
use log::info;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Fail)]
pub enum LoadError {
    #[fail(display = "unable to decode scenario: {}", _0)]
    Json(#[cause] serde_json::Error),
    #[fail(display = "version mismatch: server: {} / file: {}", server, file)]
    VersionMismatch { server: String, file: String },
    #[fail(display = "error initializing signal Library: {}", _0)]
    SignalLibrary(#[cause] SignalError),
    #[fail(display = "unknown TrackItem type: {}", _0)]
    UnknownTrackItemType(String),
    #[fail(display = "unable to decode TrackItem {}: {}", item, cause)]
    TrackItem {
        item: ItemId,
        #[cause]
        cause: serde_json::Error,
    },
    #[fail(display = "{}", _0)]
    Topology(#[cause] TopologyError),
    #[fail(display = "error initializing route {}: {}", route, cause)]
    Route {
        route: String,
        #[cause]
        cause: RouteError,
    },
    #[fail(display = "unknown signal type {} for signal {}", signal_type, signal)]
    UnknownSignalType { signal: ItemId, signal_type: String },
    #[fail(display = "condition {} of signal {} references unknown {}", condition, signal, reference)]
    UnknownReference {
        signal: ItemId,
        condition: String,
        reference: TriggerSource,
    },
    #[fail(display = "train {} has unknown train type {}", train, train_type)]
    UnknownTrainType { train: usize, train_type: String },
    #[fail(display = "train {} has unknown service {}", train, service)]
    UnknownService { train: usize, service: String },
}

impl From<serde_json::Error> for LoadError {
    fn from(e: serde_json::Error) -> Self {
        LoadError::Json(e)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioDocument {
    options: Options,
    #[serde(default)]
    signal_library: SignalLibrary,
    #[serde(default)]
    track_items: BTreeMap<String, Value>,
    #[serde(default)]
    routes: BTreeMap<String, Route>,
    #[serde(default)]
    train_types: BTreeMap<String, TrainType>,
    #[serde(default)]
    services: BTreeMap<String, Service>,
    #[serde(default)]
    trains: Vec<Train>,
    #[serde(default)]
    message_logger: MessageLogger,
}

/// Kinds of objects clients can look up by identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Route,
    TrackItem,
    Train,
    Place,
    Service,
    TrainType,
}

fn check_version(doc: &Value) -> Result<(), LoadError> {
    let file = match &doc["options"]["version"] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    if file != VERSION {
        return Err(LoadError::VersionMismatch { server: VERSION.to_string(), file });
    }
    Ok(())
}

fn decode_item<T: DeserializeOwned>(id: &str, v: Value) -> Result<T, LoadError> {
    serde_json::from_value(v).map_err(|cause| LoadError::TrackItem { item: id.to_string(), cause })
}

/// Splits the raw item table into track items and places.
fn decode_items(raw: BTreeMap<String, Value>)
    -> Result<(BTreeMap<ItemId, TrackItem>, BTreeMap<String, Place>), LoadError> {
    let mut items = BTreeMap::new();
    let mut places = BTreeMap::new();
    for (id, v) in raw {
        let type_name = v.get("__type__").and_then(Value::as_str).unwrap_or("").to_string();
        let mut item = match type_name.as_str() {
            "Place" | "PlaceItem" => {
                let mut place: Place = decode_item(&id, v)?;
                place.base.id = id.clone();
                let code = place.base.place_code.clone().unwrap_or_else(|| id.clone());
                places.insert(code, place);
                continue;
            }
            "LineItem" => TrackItem::Line(decode_item::<LineItem>(&id, v)?),
            "InvisibleLinkItem" => TrackItem::InvisibleLink(decode_item::<LineItem>(&id, v)?),
            "PlatformItem" => TrackItem::Platform(decode_item::<LineItem>(&id, v)?),
            "EndItem" => TrackItem::End(decode_item::<BasicItem>(&id, v)?),
            "TextItem" => TrackItem::Text(decode_item::<BasicItem>(&id, v)?),
            "SignalItem" => TrackItem::Signal(decode_item::<SignalItem>(&id, v)?),
            "PointsItem" => TrackItem::Points(decode_item::<PointsItem>(&id, v)?),
            other => return Err(LoadError::UnknownTrackItemType(other.to_string())),
        };
        item.base_mut().id = id.clone();
        items.insert(id, item);
    }
    Ok((items, places))
}

impl Simulation {
    /// Loads a scenario with the standard managers and the default seed.
    pub fn from_json(json: &str) -> Result<Simulation, LoadError> {
        Simulation::load(json, ManagerRegistry::new(), None)
    }

    /// Decodes and validates a scenario document. Random draws (entry
    /// delays, stop times) come from a generator seeded with `seed`.
    pub fn load(json: &str, registry: ManagerRegistry, seed: Option<u64>) -> Result<Simulation, LoadError> {
        let raw: Value = serde_json::from_str(json)?;
        Simulation::from_value(raw, registry, seed)
    }

    pub fn from_value(raw: Value, registry: ManagerRegistry, seed: Option<u64>) -> Result<Simulation, LoadError> {
        check_version(&raw)?;
        let doc: ScenarioDocument = serde_json::from_value(raw)?;
        let ScenarioDocument {
            options,
            mut signal_library,
            track_items,
            mut routes,
            mut train_types,
            mut services,
            mut trains,
            message_logger,
        } = doc;

        signal_library.initialize().map_err(LoadError::SignalLibrary)?;

        let (items, places) = decode_items(track_items)?;
        check_links(&items).map_err(LoadError::Topology)?;
        let (points, managers) = registry.into_parts();
        let infra = Infrastructure::new(items, places, points, options.default_max_speed);

        for (id, route) in routes.iter_mut() {
            route.id = id.clone();
            route
                .initialize(&infra)
                .map_err(|cause| LoadError::Route { route: id.clone(), cause })?;
        }
        for (code, t) in train_types.iter_mut() {
            t.code = code.clone();
        }
        for (code, s) in services.iter_mut() {
            s.service_code = code.clone();
        }

        let departure = |t: &Train| {
            let service = t.service_code.as_ref().and_then(|c| services.get(c));
            let time = service.and_then(Service::first_departure).map(|d| d.seconds()).unwrap_or(std::f64::MAX);
            (service.is_none(), OrderedFloat(time), t.service_code.clone())
        };
        trains.sort_by_key(|t| departure(t));

        let mut rng = StdRng::seed_from_u64(seed.unwrap_or(DEFAULT_SEED));
        for (idx, train) in trains.iter_mut().enumerate() {
            train.id = idx;
            if !train_types.contains_key(&train.train_type_code) {
                return Err(LoadError::UnknownTrainType { train: idx, train_type: train.train_type_code.clone() });
            }
            if let Some(code) = &train.service_code {
                if !services.contains_key(code) {
                    return Err(LoadError::UnknownService { train: idx, service: code.clone() });
                }
            }
            let delay = if train.initial_delay.is_null() {
                &options.default_delay_at_entry
            } else {
                &train.initial_delay
            };
            train.eff_initial_delay = delay.yield_delay(&mut rng);
            train.min_stop_time = options.default_minimum_stop_time.yield_delay(&mut rng);
        }

        let mut sim = Simulation {
            options,
            signal_library,
            infra,
            routes,
            train_types,
            services,
            trains,
            messages: message_logger,
            triggers: Triggers::default(),
            managers,
            events: EventSink::default(),
            rng,
            initialized: false,
        };
        sim.set_default_aspects()?;
        sim.setup_triggers()?;
        info!("Loaded scenario \"{}\": {} items, {} routes, {} trains",
              sim.options.title,
              sim.infra.items.len(),
              sim.routes.len(),
              sim.trains.len());
        Ok(sim)
    }

    fn set_default_aspects(&mut self) -> Result<(), LoadError> {
        let signals: Vec<ItemId> = self
            .infra
            .items
            .values()
            .filter_map(TrackItem::as_signal)
            .map(|s| s.base.id.clone())
            .collect();
        for id in signals {
            let aspect = self
                .signal_type(&id)
                .and_then(|t| t.default_aspect().map(String::from))
                .map_err(|e| match e {
                    SignalError::UnknownType { signal, signal_type } => LoadError::UnknownSignalType { signal, signal_type },
                    e => LoadError::SignalLibrary(e),
                })?;
            if let Some(status) = self.infra.signal_status_mut(&id) {
                status.active_aspect = aspect;
            }
        }
        Ok(())
    }

    /// The scenario document for the current state.
    pub fn to_value(&self) -> Value {
        let mut items = Map::new();
        for id in self.infra.items.keys() {
            items.insert(id.clone(), self.item_value(id));
        }
        for place in self.infra.places.values() {
            items.insert(place.base.id.clone(), place_value(place));
        }
        let routes: Map<String, Value> = self.routes.keys().map(|id| (id.clone(), self.route_value(id))).collect();
        let trains: Vec<Value> = (0..self.trains.len()).map(|i| self.train_value(i)).collect();

        let mut doc = Map::new();
        doc.insert("options".to_string(), to_json(&self.options));
        doc.insert("signalLibrary".to_string(), to_json(&self.signal_library));
        doc.insert("trackItems".to_string(), Value::Object(items));
        doc.insert("routes".to_string(), Value::Object(routes));
        doc.insert("trainTypes".to_string(), to_json(&self.train_types));
        doc.insert("services".to_string(), to_json(&self.services));
        doc.insert("trains".to_string(), Value::Array(trains));
        doc.insert("messageLogger".to_string(), to_json(&self.messages));
        Value::Object(doc)
    }

    pub fn save(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_value())
    }

    /// A track item with its live state.
    pub fn item_value(&self, id: &str) -> Value {
        let item = match self.infra.items.get(id) {
            Some(item) => item,
            None => return Value::Null,
        };
        let mut v = match item {
            TrackItem::Line(l) | TrackItem::InvisibleLink(l) | TrackItem::Platform(l) => to_json(l),
            TrackItem::End(b) | TrackItem::Text(b) => to_json(b),
            TrackItem::Signal(s) => to_json(s),
            TrackItem::Points(p) => to_json(p),
        };
        if let Value::Object(map) = &mut v {
            map.insert("__type__".to_string(), Value::from(item.type_name()));
            map.insert("id".to_string(), Value::from(id));
            if let Some(state) = self.infra.state(id) {
                map.insert("activeRoute".to_string(), opt_str(&state.active_route));
                map.insert("activeRoutePreviousItem".to_string(), opt_str(&state.active_route_previous));
                map.insert("trainPresent".to_string(), Value::from(!state.trains.is_empty()));
                if let Some(signal) = &state.signal {
                    map.insert("activeAspect".to_string(), Value::from(signal.active_aspect.as_str()));
                    map.insert("previousActiveRoute".to_string(), opt_str(&signal.previous_active_route));
                    map.insert("nextActiveRoute".to_string(), opt_str(&signal.next_active_route));
                    map.insert("trainID".to_string(), Value::from(signal.train_id.as_str()));
                }
            }
            if let TrackItem::Points(_) = item {
                map.insert("direction".to_string(), to_json(&self.infra.points_direction(id)));
            }
        }
        v
    }

    pub fn route_value(&self, id: &str) -> Value {
        match self.routes.get(id) {
            Some(route) => with_id(to_json(route), Value::from(id)),
            None => Value::Null,
        }
    }

    pub fn train_value(&self, idx: usize) -> Value {
        match self.trains.get(idx) {
            Some(train) => with_id(to_json(train), Value::from(idx)),
            None => Value::Null,
        }
    }

    /// Snapshot of one object, or `None` if there is no such object.
    pub fn object_value(&self, kind: ObjectKind, id: &str) -> Option<Value> {
        match kind {
            ObjectKind::Route => self.routes.get(id).map(|_| self.route_value(id)),
            ObjectKind::TrackItem => self.infra.items.get(id).map(|_| self.item_value(id)),
            ObjectKind::Train => id
                .parse::<usize>()
                .ok()
                .filter(|i| *i < self.trains.len())
                .map(|i| self.train_value(i)),
            ObjectKind::Place => self.infra.places.get(id).map(place_value),
            ObjectKind::Service => self.services.get(id).map(|s| with_id(to_json(s), Value::from(id))),
            ObjectKind::TrainType => self.train_types.get(id).map(|t| with_id(to_json(t), Value::from(id))),
        }
    }
}

fn to_json<T: serde::Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or_default()
}

fn opt_str(v: &Option<String>) -> Value {
    v.as_ref().map(|s| Value::from(s.as_str())).unwrap_or(Value::Null)
}

fn with_id(mut v: Value, id: Value) -> Value {
    if let Value::Object(map) = &mut v {
        map.insert("id".to_string(), id);
    }
    v
}

fn place_value(place: &Place) -> Value {
    let mut v = to_json(place);
    if let Value::Object(map) = &mut v {
        map.insert("__type__".to_string(), Value::from("Place"));
    }
    with_id(v, Value::from(place.base.id.as_str()))
}
