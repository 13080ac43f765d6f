//! Commands sent by clients to a running simulation.

use crate::options::OptionError;
use crate::railway::route::RouteError;
use crate::simulation::Simulation;
use log::warn;
use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    ActivateRoute {
        id: String,
        #[serde(default)]
        persistent: bool,
    },
    DeactivateRoute {
        id: String,
    },
    SetOption {
        name: String,
        value: Value,
    },
}

#[derive(Debug, Fail)]
pub enum CommandError {
    #[fail(display = "{}", _0)]
    Route(#[cause] RouteError),
    #[fail(display = "{}", _0)]
    Option(#[cause] OptionError),
    #[fail(display = "simulation is not running")]
    Disconnected,
}

impl From<RouteError> for CommandError {
    fn from(e: RouteError) -> Self {
        CommandError::Route(e)
    }
}

impl From<OptionError> for CommandError {
    fn from(e: OptionError) -> Self {
        CommandError::Option(e)
    }
}

impl Simulation {
    /// Applies a command. A failed command leaves the simulation unchanged.
    pub fn execute(&mut self, command: Command) -> Result<(), CommandError> {
        let result = match &command {
            Command::ActivateRoute { id, persistent } => self.activate_route(id, *persistent).map_err(CommandError::from),
            Command::DeactivateRoute { id } => self.deactivate_route(id).map_err(CommandError::from),
            Command::SetOption { name, value } => self.set_option(name, value).map_err(CommandError::from),
        };
        if let Err(e) = &result {
            warn!("{:?} failed: {}", command, e);
        }
        result
    }
}
