//! What the simulation tells the outside world: the event stream and the
//! in-game message log.

pub mod events;
pub mod messages;
