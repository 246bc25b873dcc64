//! Acquisition handler resolution
//!
//! A pure decision over device connectivity and roll configuration that
//! picks the acquisition strategy for the next `process()` call. Callers
//! re-resolve on every relevant state change (connectivity, simulator
//! toggle, stored-template availability, sector mode) and record the result
//! where the UI layer can observe it.

use crate::roll::SectorMode;
use serde::{Deserialize, Serialize};

/// The resolved acquisition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerMode {
    /// Device unreachable or its backing process not ready.
    Offline,
    CameraTrigger,
    CameraDetect,
    CameraRestore,
    SimulatorTrigger,
    SimulatorDetect,
    SimulatorRestore,
}

impl HandlerMode {
    /// Restore modes replay the stored template document to the device
    /// instead of re-detecting sector definitions.
    pub fn is_restore(&self) -> bool {
        matches!(self, Self::CameraRestore | Self::SimulatorRestore)
    }

    pub fn is_simulator(&self) -> bool {
        matches!(
            self,
            Self::SimulatorTrigger | Self::SimulatorDetect | Self::SimulatorRestore
        )
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }
}

/// Inputs to handler resolution, gathered from the device connector and
/// the selected image roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerInputs {
    pub connected: bool,
    pub process_ready: bool,
    pub simulator: bool,
    pub sector_mode: SectorMode,
    pub has_stored_template: bool,
}

/// Resolve the acquisition handler for the given device/roll state.
pub fn resolve_handler(inputs: HandlerInputs) -> HandlerMode {
    if !inputs.connected || !inputs.process_ready {
        return HandlerMode::Offline;
    }

    match (inputs.simulator, inputs.sector_mode, inputs.has_stored_template) {
        (true, SectorMode::Dynamic, true) => HandlerMode::SimulatorRestore,
        (true, SectorMode::Dynamic, false) => HandlerMode::SimulatorDetect,
        (true, SectorMode::Fixed, _) => HandlerMode::SimulatorTrigger,
        (false, SectorMode::Dynamic, true) => HandlerMode::CameraRestore,
        (false, SectorMode::Dynamic, false) => HandlerMode::CameraDetect,
        (false, SectorMode::Fixed, _) => HandlerMode::CameraTrigger,
    }
}
