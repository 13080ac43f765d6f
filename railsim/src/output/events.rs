use crate::simulation::Simulation;
use log::debug;
use serde::Serialize;
use serde_json::Value;
use std::sync::mpsc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    Clock,
    StateChanged,
    OptionsChanged,
    RouteActivated,
    RouteDeactivated,
    TrainStoppedAtStation,
    TrainDepartedFromStation,
    TrainChanged,
    SignalAspectChanged,
    TrackItemChanged,
    MessageReceived,
    ScoreChanged,
}

/// A notification with a snapshot of the object that changed. The
/// identifier is empty for objects that have none, like the clock.
#[derive(Clone, Debug, Serialize)]
pub struct Event {
    pub name: EventName,
    pub id: String,
    pub object: Value,
}

/// Sending end of the event stream. Events are dropped while nobody is
/// connected, or once the receiver is gone.
#[derive(Default)]
pub struct EventSink {
    sender: Option<mpsc::Sender<Event>>,
}

impl EventSink {
    /// Replaces any previous receiver.
    pub fn connect(&mut self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.sender = Some(tx);
        rx
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_some()
    }

    pub fn emit(&self, event: Event) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                debug!("event receiver hung up");
            }
        }
    }
}

impl Simulation {
    pub fn emit(&self, name: EventName, id: &str, object: Value) {
        self.events.emit(Event { name, id: id.to_string(), object });
    }

    /// Starts a fresh event stream.
    pub fn subscribe(&mut self) -> mpsc::Receiver<Event> {
        self.events.connect()
    }
}
