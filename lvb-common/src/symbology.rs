//! Symbology and grading types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Barcode / 2D symbol type of an inspected sector.
///
/// Serialized as the display name so vendor documents and persisted rows
/// round-trip through the same strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Symbology {
    DataMatrix,
    QrCode,
    Code128,
    Code39,
    UpcA,
    Ean13,
    Pdf417,
    /// A symbology this workbench does not model; the vendor name is kept
    /// verbatim so reconciliation can still match on it.
    Unknown(String),
}

impl Symbology {
    /// Parse a vendor symbology name. Matching is case-insensitive and
    /// ignores spaces and dashes; a `GS1` prefix is stripped the way the
    /// handheld verifier reports it.
    pub fn from_name(name: &str) -> Self {
        let trimmed = name.trim().trim_start_matches("GS1 ");
        let folded: String = trimmed
            .chars()
            .filter(|c| !matches!(*c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "datamatrix" => Self::DataMatrix,
            "qrcode" | "qr" => Self::QrCode,
            "code128" => Self::Code128,
            "code39" => Self::Code39,
            "upca" => Self::UpcA,
            "ean13" => Self::Ean13,
            "pdf417" => Self::Pdf417,
            _ => Self::Unknown(trimmed.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::DataMatrix => "DataMatrix",
            Self::QrCode => "QRCode",
            Self::Code128 => "Code128",
            Self::Code39 => "Code39",
            Self::UpcA => "UPC-A",
            Self::Ean13 => "EAN-13",
            Self::Pdf417 => "PDF417",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for Symbology {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<Symbology> for String {
    fn from(value: Symbology) -> Self {
        value.name().to_string()
    }
}

/// Overall grade of one inspected sector: ISO letter plus numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub letter: String,
    pub value: f64,
}

impl Grade {
    pub fn new(letter: impl Into<String>, value: f64) -> Self {
        Self {
            letter: letter.into(),
            value,
        }
    }

    /// Derive the ISO letter from a numeric grade (4.0 scale).
    pub fn from_value(value: f64) -> Self {
        let letter = if value >= 3.5 {
            "A"
        } else if value >= 2.5 {
            "B"
        } else if value >= 1.5 {
            "C"
        } else if value >= 0.5 {
            "D"
        } else {
            "F"
        };
        Self::new(letter, value)
    }

    /// Zero-confidence grade recorded when a device reported no symbol
    /// and the configuration keeps such sectors.
    pub fn no_read() -> Self {
        Self::new("F", 0.0)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.1})", self.letter, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbology_from_name() {
        assert_eq!(Symbology::from_name("Data Matrix"), Symbology::DataMatrix);
        assert_eq!(Symbology::from_name("datamatrix"), Symbology::DataMatrix);
        assert_eq!(Symbology::from_name("GS1 DataMatrix"), Symbology::DataMatrix);
        assert_eq!(Symbology::from_name("QR Code"), Symbology::QrCode);
        assert_eq!(Symbology::from_name("UPC-A"), Symbology::UpcA);
        assert_eq!(
            Symbology::from_name("MaxiCode"),
            Symbology::Unknown("MaxiCode".to_string())
        );
    }

    #[test]
    fn test_symbology_serde_round_trip() {
        let json = serde_json::to_string(&Symbology::DataMatrix).unwrap();
        assert_eq!(json, "\"DataMatrix\"");
        let back: Symbology = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Symbology::DataMatrix);
    }

    #[test]
    fn test_grade_from_value() {
        assert_eq!(Grade::from_value(4.0).letter, "A");
        assert_eq!(Grade::from_value(2.5).letter, "B");
        assert_eq!(Grade::from_value(1.9).letter, "C");
        assert_eq!(Grade::from_value(0.5).letter, "D");
        assert_eq!(Grade::from_value(0.2).letter, "F");
    }

    #[test]
    fn test_grade_display() {
        assert_eq!(Grade::new("A", 4.0).to_string(), "A (4.0)");
    }
}
