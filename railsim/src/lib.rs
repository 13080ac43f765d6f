//! Railway scenery simulation.
//!
//! A scenario document describes the track, the signals and their
//! logic, the routes of the interlocking and a timetabled set of trains.
//! `Simulation` holds all of it and advances in ticks; `eventsim::Clock`
//! drives the ticks in real time on its own thread and serializes client
//! commands into that timeline.

extern crate failure;
#[macro_use]
extern crate failure_derive;

pub mod commands;
pub mod eventsim;
pub mod input;
pub mod managers;
pub mod options;
pub mod output;
pub mod primitives;
pub mod railway;
pub mod simulation;
pub mod time;

#[cfg(test)]
mod tests;

pub use crate::commands::{Command, CommandError};
pub use crate::eventsim::Clock;
pub use crate::managers::ManagerRegistry;
pub use crate::output::events::{Event, EventName};
pub use crate::simulation::Simulation;

use std::path::Path;

pub type AppResult<T> = Result<T, failure::Error>;

pub fn read_file(f: &Path) -> AppResult<String> {
    use std::fs::File;
    use std::io::prelude::*;
    use std::io::BufReader;

    let file = File::open(f)?;
    let mut file = BufReader::new(&file);
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Reads a scenario file, with the standard managers.
pub fn load_scenario(f: &Path, seed: Option<u64>) -> AppResult<Simulation> {
    let contents = read_file(f)?;
    let sim = Simulation::load(&contents, ManagerRegistry::new(), seed)?;
    Ok(sim)
}

pub fn save_scenario(sim: &Simulation, f: &Path) -> AppResult<()> {
    use std::fs::File;
    use std::io::{BufWriter, Write};

    let file = File::create(f)?;
    let mut writer = BufWriter::new(&file);
    serde_json::to_writer_pretty(&mut writer, &sim.to_value())?;
    writer.flush()?;
    Ok(())
}
