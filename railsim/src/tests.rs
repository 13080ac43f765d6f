use crate::commands::{Command, CommandError};
use crate::eventsim::Clock;
use crate::input::scenario::{LoadError, ObjectKind};
use crate::managers::points::StandardPointsManager;
use crate::managers::{ManagerRegistry, RoutesManager, TrainsManager};
use crate::output::events::{Event, EventName};
use crate::railway::driver::StandardTrainsManager;
use crate::railway::conditions::ConditionKind;
use crate::railway::position::Position;
use crate::railway::route::{Route, RouteError, RouteState};
use crate::railway::trackitem::{PointDirection, TopologyError};
use crate::railway::train::{Train, TrainStatus};
use crate::simulation::Simulation;
use crate::time::Time;
use maplit::hashmap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;

const DEMO: &str = include_str!("../tests/data/demo.json");

fn demo() -> Value {
    serde_json::from_str(DEMO).unwrap()
}

fn load(doc: Value) -> Result<Simulation, LoadError> {
    Simulation::from_value(doc, ManagerRegistry::new(), None)
}

fn aspects(sim: &Simulation) -> HashMap<&'static str, String> {
    ["3", "5", "101"]
        .iter()
        .map(|s| (*s, sim.infra.signal_status(s).unwrap().active_aspect.clone()))
        .collect()
}

fn aspect_map(a3: &str, a5: &str, a101: &str) -> HashMap<&'static str, String> {
    hashmap! {
        "3" => a3.to_string(),
        "5" => a5.to_string(),
        "101" => a101.to_string(),
    }
}

fn drain(events: &Receiver<Event>) -> Vec<Event> {
    events.try_iter().collect()
}

fn has_event(events: &[Event], name: EventName, id: &str) -> bool {
    events.iter().any(|e| e.name == name && e.id == id)
}

#[test]
fn loading_demo() {
    let sim = Simulation::from_json(DEMO).unwrap();
    assert_eq!(sim.infra.items.len(), 23);
    assert_eq!(sim.infra.places.len(), 3);
    assert_eq!(sim.infra.places["STN"].base.name, "STATION");
    assert_eq!(sim.options.current_time, Time::from_hms(6, 0, 0));
    assert_eq!(sim.messages.len(), 1);

    let services: Vec<Option<&str>> = sim.trains.iter().map(|t| t.service_code.as_ref().map(String::as_str)).collect();
    assert_eq!(services, vec![Some("S001"), Some("S003"), None]);
    for (idx, t) in sim.trains.iter().enumerate() {
        assert_eq!(t.id, idx);
        assert_eq!(t.status, TrainStatus::Inactive);
    }

    assert_eq!(aspect_map("UK_DANGER", "UK_DANGER", "UK_DANGER"), aspects(&sim));
    assert_eq!(sim.infra.signal_status("17").unwrap().active_aspect, "BUFFER");

    let route = &sim.routes["1"];
    let path: Vec<&str> = route.positions.iter().map(|p| p.track_item.as_str()).collect();
    assert_eq!(path, vec!["5", "6", "7", "8", "9", "10", "101"]);
    assert_eq!(route.state, RouteState::Deactivated);

    // The reverse branch is the only way from the siding back to the main line.
    assert_eq!(sim.routes["4"].directions["7"], PointDirection::Reversed);
    let path: Vec<&str> = sim.routes["4"].positions.iter().map(|p| p.track_item.as_str()).collect();
    assert_eq!(path, vec!["15", "14", "7", "6", "5", "4", "3"]);
}

#[test]
fn route_setting_clears_signals() {
    let mut sim = Simulation::from_json(DEMO).unwrap();
    let events = sim.subscribe();
    sim.initialize();

    sim.activate_route("2", false).unwrap();
    assert_eq!(aspect_map("UK_CAUTION", "UK_DANGER", "UK_DANGER"), aspects(&sim));
    sim.activate_route("1", false).unwrap();
    assert_eq!(aspect_map("UK_CLEAR", "UK_CAUTION", "UK_DANGER"), aspects(&sim));
    assert_eq!(sim.routes["1"].state, RouteState::Activated);
    assert_eq!(sim.infra.active_route("8"), Some(&"1".to_string()));
    assert_eq!(sim.infra.signal_status("5").unwrap().previous_active_route, Some("2".to_string()));
    assert_eq!(sim.infra.signal_status("5").unwrap().next_active_route, Some("1".to_string()));

    let evs = drain(&events);
    assert!(has_event(&evs, EventName::RouteActivated, "2"));
    assert!(has_event(&evs, EventName::RouteActivated, "1"));
    assert!(has_event(&evs, EventName::SignalAspectChanged, "3"));
    assert!(has_event(&evs, EventName::TrackItemChanged, "7"));

    sim.deactivate_route("1").unwrap();
    assert_eq!(aspect_map("UK_CAUTION", "UK_DANGER", "UK_DANGER"), aspects(&sim));
    assert_eq!(sim.infra.active_route("8"), None);
    assert_eq!(sim.infra.signal_status("5").unwrap().next_active_route, None);
    assert!(has_event(&drain(&events), EventName::RouteDeactivated, "1"));

    sim.activate_route("1", true).unwrap();
    assert_eq!(sim.routes["1"].state, RouteState::Persistent);
}

#[test]
fn conflicting_routes_are_refused() {
    let mut sim = Simulation::from_json(DEMO).unwrap();
    sim.initialize();
    sim.activate_route("1", false).unwrap();

    for id in &["3", "4"] {
        match sim.execute(Command::ActivateRoute { id: id.to_string(), persistent: false }) {
            Err(e @ CommandError::Route(RouteError::Vetoed { .. })) => assert_eq!(
                e.to_string(),
                format!("Standard routes manager refused route {}: conflicting route 1 is active", id)
            ),
            x => panic!("unexpected {:?}", x),
        }
        assert_eq!(sim.routes[*id].state, RouteState::Deactivated);
    }
    assert_eq!(sim.infra.active_route("14"), None);
    assert_eq!(sim.infra.points_direction("7"), PointDirection::Normal);

    // Setting a route again is harmless.
    sim.execute(Command::ActivateRoute { id: "1".to_string(), persistent: false }).unwrap();

    match sim.execute(Command::DeactivateRoute { id: "42".to_string() }) {
        Err(e) => assert_eq!(e.to_string(), "unknown route 42"),
        Ok(()) => panic!("deactivated an unknown route"),
    }
}

#[test]
fn conflict_items_keep_routes_apart() {
    let mut doc = demo();
    doc["trackItems"]["8"]["conflictTiId"] = json!("103");
    doc["trackItems"]["103"]["conflictTiId"] = json!("8");
    let mut sim = load(doc).unwrap();
    sim.initialize();

    sim.activate_route("5", false).unwrap();
    match sim.execute(Command::ActivateRoute { id: "1".to_string(), persistent: false }) {
        Err(e) => assert_eq!(e.to_string(), "Standard routes manager refused route 1: conflicting route 5 is active"),
        Ok(()) => panic!("route 1 set across an active conflict item"),
    }
    assert_eq!(sim.routes["1"].state, RouteState::Deactivated);
    assert_eq!(sim.infra.active_route("8"), None);
    assert_eq!(sim.infra.signal_status("5").unwrap().next_active_route, None);

    // The pair works both ways.
    sim.deactivate_route("5").unwrap();
    sim.activate_route("1", false).unwrap();
    match sim.activate_route("5", false) {
        Err(e) => assert_eq!(e.to_string(), "Standard routes manager refused route 5: conflicting route 1 is active"),
        Ok(()) => panic!("route 5 set across an active conflict item"),
    }
    assert_eq!(sim.routes["5"].state, RouteState::Deactivated);
    assert_eq!(sim.infra.active_route("103"), None);
    assert_eq!(sim.routes["1"].state, RouteState::Activated);
}

#[test]
fn route_set_across_signal() {
    let mut doc = demo();
    doc["routes"]["6"] = json!({"beginSignal": "3", "endSignal": "101", "directions": {"7": 0}});
    let mut sim = load(doc).unwrap();
    sim.initialize();
    sim.activate_route("6", false).unwrap();
    assert!(ConditionKind::RouteSetAcross.is_met(&sim, "5", &[], &[]));
    assert!(!ConditionKind::RouteSetAcross.is_met(&sim, "3", &[], &[]));

    // A route with nothing between its signals crosses no signal.
    let mut short = sim.routes["2"].clone();
    short.id = "short".to_string();
    short.positions.remove(1);
    short.state = RouteState::Activated;
    assert_eq!(short.positions.len(), 2);
    sim.routes.insert(short.id.clone(), short);
    sim.infra.state_mut("11").unwrap().active_route = Some("short".to_string());
    assert!(!ConditionKind::RouteSetAcross.is_met(&sim, "11", &[], &[]));
}

#[test]
fn points_move_for_a_route() {
    let mut sim = Simulation::from_json(DEMO).unwrap();
    let events = sim.subscribe();
    sim.initialize();

    sim.activate_route("3", false).unwrap();
    assert_eq!(sim.infra.points_direction("7"), PointDirection::Unknown);
    assert_eq!(sim.item_value("7")["direction"], 0);
    assert_eq!(sim.infra.signal_status("5").unwrap().active_aspect, "UK_CAUTION");
    drain(&events);

    for _ in 0..4 {
        sim.tick(0.5);
    }
    assert_eq!(sim.infra.points_direction("7"), PointDirection::Reversed);
    assert_eq!(sim.item_value("7")["direction"], 1);
    assert!(has_event(&drain(&events), EventName::TrackItemChanged, "7"));
}

#[test]
fn train_waits_at_red_signal() {
    let mut sim = Simulation::from_json(DEMO).unwrap();
    let events = sim.subscribe();
    sim.initialize();

    for _ in 0..60 {
        sim.tick(0.5);
    }
    let t = &sim.trains[0];
    assert_eq!(t.status, TrainStatus::Waiting);
    assert_eq!(t.train_head.track_item, "2");
    assert!(t.speed <= 0.25);
    assert_eq!(t.last_seen_signal(), Some("3"));
    assert!(sim.infra.has_train("2"));
    assert!(!sim.infra.has_train("3"));
    assert_eq!(sim.infra.signal_status("3").unwrap().train_id, "S001");
    assert!(!sim.trains[1].is_active());
    assert!(!sim.trains[2].is_active());

    let evs = drain(&events);
    assert!(has_event(&evs, EventName::TrainChanged, "0"));
    assert!(evs.iter().any(|e| e.name == EventName::Clock && e.object == "06:02:30"));
    assert_eq!(sim.messages.messages[1].msg_text, "Train S001 entered the area on time");
}

#[test]
fn train_runs_to_station() {
    let mut sim = Simulation::from_json(DEMO).unwrap();
    let events = sim.subscribe();
    sim.initialize();
    sim.activate_route("2", false).unwrap();
    sim.activate_route("1", false).unwrap();

    let mut ticks = 0;
    while sim.trains[0].status != TrainStatus::Stopped {
        sim.tick(0.5);
        ticks += 1;
        assert!(ticks < 400, "train never stopped: {:?}", sim.trains[0]);
    }

    let t = &sim.trains[0];
    assert_eq!(t.train_head.track_item, "10");
    assert_eq!(t.next_place_index, Some(1));
    assert!(sim.infra.has_train("10"));
    assert!(!sim.infra.has_train("2"));
    assert!(!sim.infra.has_train("101"));
    assert!(has_event(&drain(&events), EventName::TrainStoppedAtStation, "0"));

    // The route behind the train has been released, the one it stands on
    // has not.
    assert_eq!(sim.routes["2"].state, RouteState::Deactivated);
    assert_eq!(sim.routes["1"].state, RouteState::Activated);
    assert_eq!(sim.infra.active_route("4"), None);
    assert_eq!(sim.infra.active_route("10"), Some(&"1".to_string()));
    assert_eq!(sim.infra.signal_status("3").unwrap().active_aspect, "UK_DANGER");
    assert_eq!(sim.infra.signal_status("101").unwrap().active_aspect, "UK_DANGER");

    assert_eq!(sim.options.current_score, 0);
    assert!(sim.messages.messages.iter().any(|m| m.msg_text == "Train S001 arrived on time at station STATION"));
}

#[test]
fn unscheduled_train_runs_on_set_routes() {
    let mut doc = demo();
    let mut train = doc["trains"][0].clone();
    train["appearTime"] = json!("06:00:00");
    train["initialSpeed"] = json!(5);
    train["trainHead"] = json!({"trackItem": "2", "previousTI": "1", "positionOnTI": 300});
    doc["trains"] = json!([train]);
    let mut sim = load(doc).unwrap();
    sim.initialize();
    for id in &["2", "1", "5"] {
        sim.activate_route(id, false).unwrap();
    }

    let mut ticks = 0;
    while sim.trains[0].train_head.track_item != "104" {
        sim.tick(0.5);
        ticks += 1;
        assert!(ticks < 400, "unscheduled train never got through: {:?}", sim.trains[0]);
    }

    // No stop at the station: the train has no service.
    let t = &sim.trains[0];
    assert_eq!(t.service_code, None);
    assert_eq!(t.next_place_index, None);
    assert_eq!(t.status, TrainStatus::Running);
    assert!(sim.infra.has_train("104"));
    assert!(!sim.infra.has_train("2"));
    assert!(!sim.infra.has_train("10"));
    assert_eq!(sim.routes["2"].state, RouteState::Deactivated);
    assert!(sim.messages.messages.iter().any(|m| m.msg_text == "Train 0 entered the area on time"));
}

#[test]
fn station_stop_on_invisible_link() {
    let mut doc = demo();
    doc["trackItems"]["10"]["placeCode"] = json!("");
    doc["trackItems"]["103"]["placeCode"] = json!("STN");
    doc["trackItems"]["103"]["trackCode"] = json!("1");
    let mut sim = load(doc).unwrap();
    let events = sim.subscribe();
    sim.initialize();
    for id in &["2", "1", "5"] {
        sim.activate_route(id, false).unwrap();
    }

    let mut ticks = 0;
    while sim.trains[0].status != TrainStatus::Stopped {
        sim.tick(0.5);
        ticks += 1;
        assert!(ticks < 400, "train never stopped: {:?}", sim.trains[0]);
    }
    let t = &sim.trains[0];
    assert_eq!(t.train_head.track_item, "103");
    assert_eq!(t.next_place_index, Some(1));
    assert!(has_event(&drain(&events), EventName::TrainStoppedAtStation, "0"));
}

#[test]
fn train_tail_follows_trailed_branch() {
    let mut sim = Simulation::from_json(DEMO).unwrap();
    sim.initialize();
    assert_eq!(sim.infra.points_direction("7"), PointDirection::Normal);

    // Back from the siding through points lying normal.
    sim.trains[0].train_head = Position::new("6", Some("7"), 30.0);
    assert_eq!(sim.train_tail(&sim.trains[0]).unwrap(), Position::new("8", Some("9"), 80.0));
    sim.trains[0].trail = vec![("7".to_string(), "14".to_string())];
    assert_eq!(sim.train_tail(&sim.trains[0]).unwrap(), Position::new("14", Some("15"), 80.0));
}

#[test]
fn routes_start_from_saved_state() {
    let mut doc = demo();
    doc["routes"]["2"]["state"] = json!(1);
    doc["routes"]["5"]["initialState"] = json!(2);
    let mut sim = load(doc).unwrap();
    assert_eq!(sim.routes["2"].state, RouteState::Activated);
    assert_eq!(sim.infra.active_route("4"), None);

    sim.initialize();
    assert_eq!(sim.routes["2"].state, RouteState::Activated);
    assert_eq!(sim.routes["5"].state, RouteState::Persistent);
    assert_eq!(sim.infra.active_route("4"), Some(&"2".to_string()));
    assert_eq!(sim.infra.signal_status("3").unwrap().active_aspect, "UK_CAUTION");

    // A second call changes nothing.
    sim.initialize();
    assert_eq!(sim.routes["5"].state, RouteState::Persistent);
}

#[test]
fn save_and_reload() {
    let mut sim = Simulation::from_json(DEMO).unwrap();
    sim.initialize();
    sim.activate_route("2", false).unwrap();
    sim.activate_route("1", true).unwrap();
    for _ in 0..4 {
        sim.tick(0.5);
    }

    let saved = sim.save().unwrap();
    let doc: Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(doc["options"]["currentTime"], "06:00:10");
    assert_eq!(doc["options"]["version"], "0.7");
    assert_eq!(doc["trackItems"]["3"]["activeAspect"], "UK_CLEAR");
    assert_eq!(doc["trackItems"]["3"]["__type__"], "SignalItem");
    assert_eq!(doc["trackItems"]["2"]["trainPresent"], true);
    assert_eq!(doc["trackItems"]["STN"]["__type__"], "Place");
    assert_eq!(doc["routes"]["1"]["state"], 2);
    assert_eq!(doc["trains"][0]["status"], 10);
    assert_eq!(doc["trains"][0]["id"], 0);
    assert_eq!(doc["messageLogger"]["messages"][0]["msgText"], "Scenario loaded");

    let mut reloaded = Simulation::from_json(&saved).unwrap();
    assert_eq!(reloaded.options.current_time, sim.options.current_time);
    assert_eq!(reloaded.infra.items.len(), sim.infra.items.len());
    assert_eq!(reloaded.infra.places.len(), 3);
    assert_eq!(reloaded.routes["1"].state, RouteState::Persistent);
    let (head, saved_head) = (&reloaded.trains[0].train_head, &sim.trains[0].train_head);
    assert_eq!(head.track_item, "2");
    assert_eq!(head.previous_item, saved_head.previous_item);
    assert!((head.position_on_ti - saved_head.position_on_ti).abs() < 1e-6);
    assert_eq!(reloaded.trains[0].status, TrainStatus::Running);
    assert_eq!(reloaded.trains[0].next_place_index, Some(1));

    reloaded.initialize();
    assert!(reloaded.infra.has_train("2"));
    assert_eq!(reloaded.infra.active_route("6"), Some(&"1".to_string()));
    assert_eq!(reloaded.infra.signal_status("5").unwrap().active_aspect, "UK_CAUTION");
}

#[test]
fn same_seed_same_delays() {
    let delays = |seed| {
        let sim = Simulation::load(DEMO, ManagerRegistry::new(), Some(seed)).unwrap();
        sim.trains.iter().map(|t| (t.eff_initial_delay, t.min_stop_time)).collect::<Vec<_>>()
    };
    let first = delays(42);
    assert_eq!(first, delays(42));
    // S003 enters between one minute early and five minutes late.
    assert!(first[1].0 >= -60.0 && first[1].0 <= 300.0);
    assert_eq!(first[0].0, 0.0);
    assert!(first[0].1 >= 20.0 && first[0].1 <= 120.0);
}

#[test]
fn options_through_commands() {
    let mut sim = Simulation::from_json(DEMO).unwrap();
    let events = sim.subscribe();

    sim.execute(Command::SetOption { name: "timeFactor".to_string(), value: json!(2) }).unwrap();
    assert_eq!(sim.options.time_factor, 2.0);
    sim.execute(Command::SetOption { name: "defaultMaxSpeed".to_string(), value: json!(12.5) }).unwrap();
    assert_eq!(sim.infra.max_speed("4"), 12.5);
    assert!(has_event(&drain(&events), EventName::OptionsChanged, ""));

    match sim.execute(Command::SetOption { name: "gravity".to_string(), value: json!(9.81) }) {
        Err(e @ CommandError::Option(_)) => assert_eq!(e.to_string(), "unknown option gravity"),
        x => panic!("unexpected {:?}", x),
    }

    sim.tick(1.0);
    assert_eq!(sim.options.current_time, Time::from_hms(6, 0, 2));
}

#[test]
fn object_lookup() {
    let sim = Simulation::from_json(DEMO).unwrap();
    assert_eq!(sim.object_value(ObjectKind::Route, "1").unwrap()["beginSignal"], "5");
    assert_eq!(sim.object_value(ObjectKind::Train, "0").unwrap()["serviceCode"], "S001");
    assert!(sim.object_value(ObjectKind::Train, "7").is_none());
    assert!(sim.object_value(ObjectKind::Train, "first").is_none());
    assert_eq!(sim.object_value(ObjectKind::Place, "STN").unwrap()["name"], "STATION");
    assert_eq!(sim.object_value(ObjectKind::TrackItem, "10").unwrap()["trackCode"], "1");
    assert_eq!(sim.object_value(ObjectKind::Service, "S001").unwrap()["id"], "S001");
    assert_eq!(sim.object_value(ObjectKind::TrainType, "UT").unwrap()["length"], 70.0);
    assert!(sim.object_value(ObjectKind::TrackItem, "99").is_none());
}

#[test]
fn load_errors() {
    let mut doc = demo();
    doc["options"]["version"] = json!("0.6");
    match load(doc) {
        Err(e @ LoadError::VersionMismatch { .. }) => assert_eq!(e.to_string(), "version mismatch: server: 0.7 / file: 0.6"),
        x => panic!("unexpected {:?}", x.err()),
    }

    let mut doc = demo();
    doc["trackItems"]["4"]["nextTiId"] = json!("");
    match load(doc) {
        Err(LoadError::Topology(TopologyError::NotLinkedAt { item, .. })) => assert_eq!(item, "4"),
        x => panic!("unexpected {:?}", x.err()),
    }

    let mut doc = demo();
    doc["routes"]["9"] = json!({"beginSignal": "3", "endSignal": "15", "directions": {"7": 0}});
    match load(doc) {
        Err(e @ LoadError::Route { .. }) => {
            assert_eq!(e.to_string(), "error initializing route 9: unable to link signal 3 to signal 15")
        }
        x => panic!("unexpected {:?}", x.err()),
    }

    let mut doc = demo();
    doc["routes"]["9"] = json!({"beginSignal": "4", "endSignal": "5"});
    match load(doc) {
        Err(LoadError::Route { cause: RouteError::NotASignal(id), .. }) => assert_eq!(id, "4"),
        x => panic!("unexpected {:?}", x.err()),
    }

    let mut doc = demo();
    doc["signalLibrary"]["signalTypes"]["UK_3_ASPECTS"]["states"][0]["conditions"]["TRAIN_NOT_PRESENT_ON_ITEMS"] = json!([]);
    doc["trackItems"]["3"]["customProperties"] = json!({"TRAIN_NOT_PRESENT_ON_ITEMS": {"UK_CLEAR": ["99"]}});
    match load(doc) {
        Err(e @ LoadError::UnknownReference { .. }) => assert_eq!(
            e.to_string(),
            "condition TRAIN_NOT_PRESENT_ON_ITEMS of signal 3 references unknown TrackItem 99"
        ),
        x => panic!("unexpected {:?}", x.err()),
    }

    let mut doc = demo();
    doc["trackItems"]["T1"]["__type__"] = json!("BridgeItem");
    match load(doc) {
        Err(e @ LoadError::UnknownTrackItemType(_)) => assert_eq!(e.to_string(), "unknown TrackItem type: BridgeItem"),
        x => panic!("unexpected {:?}", x.err()),
    }

    let mut doc = demo();
    doc["signalLibrary"]["signalTypes"]["UK_3_ASPECTS"]["states"][1]["aspectName"] = json!("UK_FLASHING");
    match load(doc) {
        Err(e @ LoadError::SignalLibrary(_)) => {
            assert_eq!(e.to_string(), "error initializing signal Library: no aspect with code UK_FLASHING found")
        }
        x => panic!("unexpected {:?}", x.err()),
    }

    let mut doc = demo();
    doc["trackItems"]["11"]["signalType"] = json!("UK_4_ASPECTS");
    match load(doc) {
        Err(LoadError::UnknownSignalType { signal, signal_type }) => {
            assert_eq!((signal.as_str(), signal_type.as_str()), ("11", "UK_4_ASPECTS"))
        }
        x => panic!("unexpected {:?}", x.err()),
    }

    let mut doc = demo();
    doc["trains"][0]["trainTypeCode"] = json!("XX");
    match load(doc) {
        Err(LoadError::UnknownTrainType { train, train_type }) => assert_eq!((train, train_type.as_str()), (2, "XX")),
        x => panic!("unexpected {:?}", x.err()),
    }

    let mut doc = demo();
    doc["trains"][1]["serviceCode"] = json!("S999");
    match load(doc) {
        Err(LoadError::UnknownService { service, .. }) => assert_eq!(service, "S999"),
        x => panic!("unexpected {:?}", x.err()),
    }

    match Simulation::from_json("{\"options\": ") {
        Err(LoadError::Json(_)) => {}
        x => panic!("unexpected {:?}", x.err()),
    }
}

struct SidingLock;

impl RoutesManager for SidingLock {
    fn name(&self) -> &str {
        "Siding lock"
    }

    fn can_activate(&self, _sim: &Simulation, route: &Route) -> Result<(), String> {
        if route.end_signal == "15" {
            Err("the siding is closed".to_string())
        } else {
            Ok(())
        }
    }

    fn can_deactivate(&self, _sim: &Simulation, route: &Route) -> Result<(), String> {
        if route.state == RouteState::Persistent {
            Err("persistent routes stay".to_string())
        } else {
            Ok(())
        }
    }
}

/// Never moves.
struct Stubborn;

impl TrainsManager for Stubborn {
    fn name(&self) -> &str {
        "Stubborn"
    }

    fn speed(&self, _sim: &Simulation, _train: &Train, _elapsed: f64) -> f64 {
        0.0
    }
}

#[test]
fn custom_routes_manager() {
    let registry = ManagerRegistry::new().register_routes_manager(Box::new(SidingLock));
    let mut sim = Simulation::load(DEMO, registry, None).unwrap();
    sim.initialize();

    match sim.activate_route("3", false) {
        Err(e) => assert_eq!(e.to_string(), "Siding lock refused route 3: the siding is closed"),
        Ok(()) => panic!("route 3 should be refused"),
    }
    sim.activate_route("5", true).unwrap();
    assert!(sim.deactivate_route("5").is_err());
    assert_eq!(sim.routes["5"].state, RouteState::Persistent);
}

#[test]
fn train_driven_by_named_manager() {
    let mut doc = demo();
    doc["trains"][2]["trainsManager"] = json!("Stubborn");
    let registry = ManagerRegistry::new()
        .register_trains_manager(Box::new(StandardTrainsManager))
        .register_trains_manager(Box::new(Stubborn))
        .with_points_manager(Box::new(StandardPointsManager::immediate()));
    let mut sim = Simulation::from_value(doc, registry, None).unwrap();
    sim.initialize();
    sim.activate_route("2", false).unwrap();
    sim.activate_route("3", false).unwrap();
    assert_eq!(sim.infra.points_direction("7"), PointDirection::Reversed);

    for _ in 0..20 {
        sim.tick(0.5);
    }
    let t = &sim.trains[0];
    assert_eq!(t.trains_manager, Some("Stubborn".to_string()));
    assert_eq!(t.speed, 0.0);
    assert_eq!(t.train_head, Position::new("2", Some("1"), 300.0));
    assert_eq!(t.status, TrainStatus::Waiting);
}

#[test]
fn clock_runs_simulation_in_background() {
    let sim = Simulation::from_json(DEMO).unwrap();
    let mut clock = Clock::new(Duration::from_millis(5));
    let events = clock.initialize(sim);

    clock.execute(Command::ActivateRoute { id: "2".to_string(), persistent: false }).unwrap();
    assert!(clock.execute(Command::ActivateRoute { id: "42".to_string(), persistent: false }).is_err());

    clock.start();
    assert!(clock.is_started());
    thread::sleep(Duration::from_millis(100));
    clock.pause();

    let now = clock.query(|sim| sim.current_time()).unwrap();
    assert!(now > Time::from_hms(6, 0, 0));
    let state = clock.query(|sim| sim.routes["2"].state).unwrap();
    assert_eq!(state, RouteState::Activated);

    let sim = clock.shutdown().unwrap();
    assert_eq!(sim.current_time(), now);

    let evs: Vec<Event> = events.try_iter().collect();
    assert!(has_event(&evs, EventName::RouteActivated, "2"));
    assert!(evs.iter().any(|e| e.name == EventName::Clock));
    let states: Vec<&Value> = evs
        .iter()
        .filter(|e| e.name == EventName::StateChanged)
        .map(|e| &e.object)
        .collect();
    assert_eq!(states, vec![&json!(true), &json!(false)]);
}
