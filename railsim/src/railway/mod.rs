//! Railway simulation: scenery, interlocking and trains.

pub mod conditions;
pub mod driver;
pub mod dynamics;
pub mod infrastructure;
pub mod position;
pub mod route;
pub mod service;
pub mod signal;
pub mod trackitem;
pub mod train;
pub mod triggers;

pub type RouteId = String;
pub type TrainId = usize;
