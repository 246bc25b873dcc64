//! Verification device families driven by the workbench

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three device families a result entry can hold reports for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Vision-inspection node (in-line print inspection camera).
    Vision,
    /// Scanner/verifier appliance (tool-list driven fixed-mount reader).
    Scanner,
    /// Handheld-style verifier (one sector per trigger pull).
    Handheld,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 3] = [Self::Vision, Self::Scanner, Self::Handheld];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Scanner => "scanner",
            Self::Handheld => "handheld",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vision" => Ok(Self::Vision),
            "scanner" => Ok(Self::Scanner),
            "handheld" => Ok(Self::Handheld),
            other => Err(crate::Error::NotFound(format!(
                "unknown device kind: {other}"
            ))),
        }
    }
}
