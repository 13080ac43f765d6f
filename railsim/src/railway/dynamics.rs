//! Train performance and per-step speed control.

use smallvec::SmallVec;

/// Hard stops are aimed this many meters short, so that rounding never
/// carries the head past them.
const STOP_MARGIN: f64 = 0.01;

#[derive(Copy, Clone, Debug)]
pub struct TrainParams {
    pub length: f64,
    pub max_acc: f64,
    pub max_brk: f64,
    pub emergency_brk: f64,
    pub max_vel: f64,
}

/// A speed `v` to be reached `dx` meters ahead of the train head.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DistanceVelocity {
    pub dx: f64,
    pub v: f64,
}

impl DistanceVelocity {
    /// Restrictions to zero speed must never be overrun.
    pub fn is_hard_stop(&self) -> bool {
        self.v == 0.0
    }
}

#[derive(Clone, Debug)]
pub struct StaticMaximumVelocityProfile {
    pub local_max_velocity: f64,
    pub max_velocity_ahead: SmallVec<[DistanceVelocity; 4]>,
}

impl StaticMaximumVelocityProfile {
    pub fn new(local_max_velocity: f64) -> Self {
        StaticMaximumVelocityProfile { local_max_velocity, max_velocity_ahead: SmallVec::new() }
    }

    pub fn restrict(&mut self, dx: f64, v: f64) {
        self.max_velocity_ahead.push(DistanceVelocity { dx, v });
    }

    pub fn cap(&mut self, v: f64) {
        self.local_max_velocity = self.local_max_velocity.min(v);
    }
}

pub fn braking_distance(train: &TrainParams, velocity: f64) -> f64 {
    velocity * velocity / (2.0 * train.max_brk)
}

/// Highest speed from which `restriction` can be met with standard braking.
fn braking_curve(train: &TrainParams, max_velocity: f64, dx: f64, v: f64) -> f64 {
    max_velocity.min((2.0 * dx.max(0.0) * train.max_brk + v * v).sqrt())
}

/// Speed to aim for during the next `dt` seconds so as to meet
/// `restriction`. The braking curve is sampled at the middle of the step.
pub fn target_velocity(train: &TrainParams,
                       current_velocity: f64,
                       max_velocity: f64,
                       restriction: DistanceVelocity,
                       dt: f64)
                       -> f64 {
    // Distance that can be braked away within the last step.
    let last_step = 0.5 * train.max_brk * dt * dt;
    if restriction.dx < last_step {
        return restriction.v.min(max_velocity);
    }
    let theoretical = braking_curve(train, max_velocity, restriction.dx, restriction.v);
    let half_step = if theoretical < current_velocity {
        current_velocity * dt / 2.0
    } else {
        theoretical * dt / 2.0
    };
    let mut target = braking_curve(train, max_velocity, restriction.dx - half_step, restriction.v);
    if restriction.is_hard_stop() {
        target = target.min((restriction.dx - STOP_MARGIN).max(0.0) / dt);
    }
    target
}

/// Speed of the train after `dt` seconds under the given profile.
pub fn next_velocity(train: &TrainParams,
                     current_velocity: f64,
                     profile: &StaticMaximumVelocityProfile,
                     dt: f64)
                     -> f64 {
    if dt <= 0.0 {
        return current_velocity;
    }
    let max_velocity = profile.local_max_velocity.min(train.max_vel);
    let target = profile
        .max_velocity_ahead
        .iter()
        .map(|r| target_velocity(train, current_velocity, max_velocity, *r, dt))
        .fold(max_velocity, f64::min);

    let mut acc = ((target - current_velocity) / dt)
        .min(train.max_acc)
        .max(-train.emergency_brk);
    let must_brake = profile
        .max_velocity_ahead
        .iter()
        .any(|r| r.is_hard_stop() && braking_distance(train, current_velocity) >= r.dx);
    if must_brake && acc < 0.0 {
        acc = acc.min(-train.max_brk);
    }
    (current_velocity + acc * dt).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TrainParams {
        TrainParams { length: 70.0, max_acc: 0.5, max_brk: 0.5, emergency_brk: 1.5, max_vel: 25.0 }
    }

    #[test]
    fn accelerates_to_line_speed() {
        let p = params();
        let profile = StaticMaximumVelocityProfile::new(18.0);
        let mut v = 0.0;
        for _ in 0..100 {
            let next = next_velocity(&p, v, &profile, 2.5);
            assert!(next - v <= p.max_acc * 2.5 + 1e-9);
            v = next;
        }
        assert!((v - 18.0).abs() < 1e-9);
    }

    #[test]
    fn stops_before_hard_stop() {
        let p = params();
        let dt = 2.5;
        let mut x = 0.0;
        let mut v = 15.0;
        let mut profile = StaticMaximumVelocityProfile::new(18.0);
        for _ in 0..400 {
            profile.max_velocity_ahead.clear();
            profile.restrict(400.0 - x, 0.0);
            v = next_velocity(&p, v, &profile, dt);
            x += v * dt;
            assert!(x <= 400.0 + 1e-9, "overran the stop: {}", x);
        }
        assert_eq!(v, 0.0);
        assert!(x > 390.0, "stopped too early: {}", x);
    }

    #[test]
    fn slows_down_for_speed_limit() {
        let p = params();
        let dt = 0.5;
        let mut x = 0.0;
        let mut v = 18.0;
        let mut profile = StaticMaximumVelocityProfile::new(18.0);
        while x < 500.0 {
            profile.max_velocity_ahead.clear();
            profile.restrict(500.0 - x, 10.0);
            v = next_velocity(&p, v, &profile, dt);
            x += v * dt;
        }
        assert!(v <= 10.0 + p.max_brk * dt, "too fast at the limit: {}", v);
    }

    #[test]
    fn braking_distance_formula() {
        assert_eq!(braking_distance(&params(), 10.0), 100.0);
    }
}
