use super::PointsManager;
use crate::eventsim::scheduler::Scheduler;
use crate::railway::trackitem::{ItemId, PointDirection, PointsItem};
use crate::time::Time;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

const POINTS_SEED: u64 = 0x5057;

/// Points take a few simulated seconds to move and read `Unknown` in the
/// meantime. Paired points always move together.
pub struct StandardPointsManager {
    directions: HashMap<ItemId, PointDirection>,
    moving: Scheduler<(ItemId, PointDirection)>,
    min_delay: f64,
    max_delay: f64,
    rng: StdRng,
}

impl StandardPointsManager {
    pub fn new() -> Self {
        StandardPointsManager::with_delay(3.0, 5.0)
    }

    /// Points that switch as soon as they are commanded.
    pub fn immediate() -> Self {
        StandardPointsManager::with_delay(0.0, 0.0)
    }

    pub fn with_delay(min_delay: f64, max_delay: f64) -> Self {
        StandardPointsManager {
            directions: HashMap::new(),
            moving: Scheduler::new(),
            min_delay,
            max_delay,
            rng: StdRng::seed_from_u64(POINTS_SEED),
        }
    }

    fn move_points(&mut self, id: &str, dir: PointDirection, now: Time) {
        let pending = {
            let mut found = false;
            self.moving.retain(|(p, _)| {
                let same = p == id;
                found |= same;
                !same
            });
            found
        };
        if !pending && self.direction(id) == dir {
            return;
        }
        let delay = if self.max_delay > self.min_delay {
            self.rng.gen_range(self.min_delay, self.max_delay)
        } else {
            self.min_delay
        };
        if delay <= 0.0 {
            self.directions.insert(id.to_string(), dir);
            return;
        }
        debug!("Points {} moving to {:?}, ready in {:.1}s", id, dir, delay);
        self.directions.insert(id.to_string(), PointDirection::Unknown);
        self.moving.schedule(now.add_seconds(delay), (id.to_string(), dir));
    }
}

impl Default for StandardPointsManager {
    fn default() -> Self {
        StandardPointsManager::new()
    }
}

impl PointsManager for StandardPointsManager {
    fn name(&self) -> &str {
        "Standard points manager"
    }

    fn direction(&self, points: &str) -> PointDirection {
        self.directions.get(points).cloned().unwrap_or(PointDirection::Normal)
    }

    fn set_direction(&mut self, points: &PointsItem, dir: PointDirection, now: Time) {
        match dir {
            PointDirection::Normal | PointDirection::Reversed => {}
            _ => return,
        }
        self.move_points(&points.base.id, dir, now);
        if let Some(paired) = &points.paired_ti_id {
            self.move_points(paired, dir, now);
        }
    }

    fn update(&mut self, now: Time) -> Vec<ItemId> {
        let mut changed = Vec::new();
        for (id, dir) in self.moving.pop_due(now) {
            debug!("Points {} set to {:?}", id, dir);
            self.directions.insert(id.clone(), dir);
            changed.push(id);
        }
        changed
    }
}
