//! Time: the scheduler for delayed changes and the real-time clock that
//! drives the simulation.

pub mod clock;
pub mod scheduler;

pub use self::clock::{Clock, TIME_STEP};
pub use self::scheduler::Scheduler;
