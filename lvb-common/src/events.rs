//! Events broadcast by the results layer
//!
//! The UI shell subscribes to these instead of being called back directly;
//! an acquisition finishing always produces exactly one completion or fault
//! event, whatever path it took.

use crate::device::DeviceKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why an acquisition faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultReason {
    /// Deadline elapsed with no report.
    Timeout,
    /// Report arrived but was null/empty.
    EmptyReport,
    /// Report arrived but failed to normalize.
    Parse,
}

/// Workbench-level notifications, fanned out over a broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultsEvent {
    AcquisitionStarted {
        device: DeviceKind,
        image_uid: Uuid,
    },
    AcquisitionCompleted {
        device: DeviceKind,
        image_uid: Uuid,
        sector_count: usize,
    },
    AcquisitionFaulted {
        device: DeviceKind,
        image_uid: Uuid,
        reason: FaultReason,
    },
    StoredReplaced {
        device: DeviceKind,
        image_uid: Uuid,
    },
    CurrentCleared {
        device: DeviceKind,
        image_uid: Uuid,
    },
}

impl ResultsEvent {
    pub fn device(&self) -> DeviceKind {
        match self {
            Self::AcquisitionStarted { device, .. }
            | Self::AcquisitionCompleted { device, .. }
            | Self::AcquisitionFaulted { device, .. }
            | Self::StoredReplaced { device, .. }
            | Self::CurrentCleared { device, .. } => *device,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ResultsEvent::AcquisitionFaulted {
            device: DeviceKind::Vision,
            image_uid: Uuid::nil(),
            reason: FaultReason::Timeout,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"acquisition_faulted\""));
        assert!(json.contains("\"reason\":\"timeout\""));
        let back: ResultsEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
