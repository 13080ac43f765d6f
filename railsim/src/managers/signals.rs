use super::SignalManager;
use crate::railway::signal::SignalError;
use crate::simulation::Simulation;

/// Signals that never fail: the aspect is the one their type resolves to.
pub struct StandardSignalManager;

impl SignalManager for StandardSignalManager {
    fn name(&self) -> &str {
        "Standard signal manager"
    }

    fn get_aspect(&self, sim: &Simulation, signal: &str) -> Result<String, SignalError> {
        sim.signal_type(signal)?
            .get_aspect(sim, signal)
            .map(String::from)
    }
}
