use super::RoutesManager;
use crate::railway::route::Route;
use crate::railway::trackitem::TrackItem;
use crate::simulation::Simulation;

/// Standard interlocking: a route can only be set over items that are free
/// of conflicting routes, and may only extend a route that is already set
/// on the same track in the same direction.
pub struct StandardRoutesManager;

impl RoutesManager for StandardRoutesManager {
    fn name(&self) -> &str {
        "Standard routes manager"
    }

    fn can_activate(&self, sim: &Simulation, route: &Route) -> Result<(), String> {
        let mut flag: Option<&str> = None;
        for pos in &route.positions {
            let id = pos.track_item.as_str();
            if id == route.begin_signal || id == route.end_signal {
                continue;
            }
            let item = match sim.infra.items.get(id) {
                Some(item) => item,
                None => continue,
            };
            if let Some(conflict) = &item.base().conflict_ti_id {
                if let Some(other) = sim.infra.active_route(conflict) {
                    return Err(format!("conflicting route {} is active", other));
                }
            }
            let state = match sim.infra.state(id) {
                Some(state) => state,
                None => continue,
            };
            let active = match &state.active_route {
                Some(active) => active,
                None => {
                    if let Some(other) = flag {
                        return Err(format!("conflicting route {} is active", other));
                    }
                    continue;
                }
            };
            if let (TrackItem::Points(_), None) = (item, flag) {
                return Err(format!("conflicting route {} is active", active));
            }
            if state.active_route_previous != pos.previous_item {
                return Err(format!("conflicting route {} is active", active));
            }
            if *active == route.id {
                // Setting the same route again
                return Ok(());
            }
            // Same direction: allows setting a route behind a train that
            // still occupies the end of another one.
            flag = Some(active.as_str());
        }
        Ok(())
    }

    fn can_deactivate(&self, _sim: &Simulation, _route: &Route) -> Result<(), String> {
        Ok(())
    }
}
