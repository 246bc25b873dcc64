//! Image roll configuration and image entries
//!
//! An image roll is the ordered set of source images a run works through;
//! its configuration decides how sectors are defined and which image bytes
//! are sent to a device.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How sectors are defined for images in a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorMode {
    /// Sector layout is fixed by the loaded job; the device triggers on it.
    Fixed,
    /// Sectors are detected (or restored from a stored template) per image.
    Dynamic,
}

/// Which image bytes are sent with an acquisition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSourcePolicy {
    /// Always the original source image.
    Source,
    /// The image persisted with the stored baseline, when one exists.
    Stored,
}

/// One image with its pixel density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub uid: Uuid,
    pub bytes: Vec<u8>,
    pub dpi: u32,
}

impl ImageEntry {
    pub fn new(uid: Uuid, bytes: Vec<u8>, dpi: u32) -> Self {
        Self { uid, bytes, dpi }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Per-roll acquisition configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRollConfig {
    pub uid: Uuid,
    pub sector_mode: SectorMode,
    pub image_source: ImageSourcePolicy,
    /// DPI applied when an image carries no density of its own.
    pub target_dpi: u32,
}

impl ImageRollConfig {
    pub fn new(uid: Uuid, sector_mode: SectorMode, image_source: ImageSourcePolicy, target_dpi: u32) -> Self {
        Self {
            uid,
            sector_mode,
            image_source,
            target_dpi,
        }
    }

    /// Reconcile an image's DPI against the roll target: the image's own
    /// density wins, the roll target is the fallback.
    pub fn effective_dpi(&self, image: &ImageEntry) -> u32 {
        if image.dpi > 0 {
            image.dpi
        } else {
            self.target_dpi
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_dpi_fallback() {
        let roll = ImageRollConfig::new(Uuid::new_v4(), SectorMode::Dynamic, ImageSourcePolicy::Source, 600);
        let with_dpi = ImageEntry::new(Uuid::new_v4(), vec![1], 300);
        let without_dpi = ImageEntry::new(Uuid::new_v4(), vec![1], 0);
        assert_eq!(roll.effective_dpi(&with_dpi), 300);
        assert_eq!(roll.effective_dpi(&without_dpi), 600);
    }
}
