//! # LVB Common Library
//!
//! Shared code for the label verification workbench:
//! - Canonical sector model (template + measured report)
//! - Symbology and grade types
//! - Acquisition handler resolution
//! - Sector reconciliation (stored vs. current diff engine)
//! - Workbench configuration loading
//! - Event types broadcast by the results layer

pub mod config;
pub mod device;
pub mod diff;
pub mod error;
pub mod events;
pub mod geometry;
pub mod handler;
pub mod roll;
pub mod sector;
pub mod symbology;

pub use device::DeviceKind;
pub use error::{Error, Result};
pub use handler::{resolve_handler, HandlerInputs, HandlerMode};
pub use sector::CanonicalSector;
