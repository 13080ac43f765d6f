use super::trackitem::{ItemId, Place, PointDirection, TopologyError, TrackItem};
use super::{RouteId, TrainId};
use crate::managers::PointsManager;
use std::collections::{BTreeMap, BTreeSet};

/// Live state of a signal item.
#[derive(Clone, Debug, Default)]
pub struct SignalStatus {
    pub active_aspect: String,
    pub previous_active_route: Option<RouteId>,
    pub next_active_route: Option<RouteId>,
    /// Train descriptor shown at the signal.
    pub train_id: String,
}

/// Live state of a track item.
#[derive(Clone, Debug, Default)]
pub struct ItemState {
    pub active_route: Option<RouteId>,
    pub active_route_previous: Option<ItemId>,
    pub trains: BTreeSet<TrainId>,
    pub signal: Option<SignalStatus>,
}

/// The scenery: static items, places and their live state. Items are
/// looked up by identifier; nothing holds references into the tables.
pub struct Infrastructure {
    pub items: BTreeMap<ItemId, TrackItem>,
    pub places: BTreeMap<String, Place>,
    pub state: BTreeMap<ItemId, ItemState>,
    pub points: Box<dyn PointsManager>,
    pub default_max_speed: f64,
}

impl Infrastructure {
    pub fn new(items: BTreeMap<ItemId, TrackItem>,
               places: BTreeMap<String, Place>,
               points: Box<dyn PointsManager>,
               default_max_speed: f64) -> Self {
        let state = items
            .iter()
            .map(|(id, item)| {
                let signal = item.as_signal().map(|s| SignalStatus {
                    train_id: s.train_id.clone(),
                    ..Default::default()
                });
                (id.clone(), ItemState { signal, ..Default::default() })
            })
            .collect();
        Infrastructure { items, places, state, points, default_max_speed }
    }

    pub fn item(&self, id: &str) -> Result<&TrackItem, TopologyError> {
        self.items.get(id).ok_or_else(|| TopologyError::UnknownItem(id.to_string()))
    }

    pub fn state(&self, id: &str) -> Option<&ItemState> {
        self.state.get(id)
    }

    pub fn state_mut(&mut self, id: &str) -> Option<&mut ItemState> {
        self.state.get_mut(id)
    }

    pub fn signal_status(&self, id: &str) -> Option<&SignalStatus> {
        self.state.get(id).and_then(|s| s.signal.as_ref())
    }

    pub fn signal_status_mut(&mut self, id: &str) -> Option<&mut SignalStatus> {
        self.state.get_mut(id).and_then(|s| s.signal.as_mut())
    }

    pub fn real_length(&self, id: &str) -> Result<f64, TopologyError> {
        Ok(self.item(id)?.real_length())
    }

    /// Item speed limit, falling back to the scenery default.
    pub fn max_speed(&self, id: &str) -> f64 {
        match self.items.get(id).map(|i| i.base().max_speed) {
            Some(v) if v > 0.0 => v,
            _ => self.default_max_speed,
        }
    }

    pub fn place_of(&self, id: &str) -> Option<&Place> {
        let code = self.items.get(id)?.base().place_code.as_ref()?;
        self.places.get(code)
    }

    pub fn has_train(&self, id: &str) -> bool {
        self.state.get(id).map(|s| !s.trains.is_empty()).unwrap_or(false)
    }

    pub fn active_route(&self, id: &str) -> Option<&RouteId> {
        self.state.get(id).and_then(|s| s.active_route.as_ref())
    }

    pub fn points_direction(&self, id: &str) -> PointDirection {
        self.points.direction(id)
    }

    /// `TrackItem::following_item` with `Current` resolved against the
    /// live points state.
    pub fn following_item(&self, id: &str, preceding: Option<&str>, dir: PointDirection)
        -> Result<Option<ItemId>, TopologyError> {
        let item = self.item(id)?;
        let dir = match (dir, item) {
            (PointDirection::Current, TrackItem::Points(_)) => self.points_direction(id),
            (d, _) => d,
        };
        item.following_item(preceding, dir)
    }
}
