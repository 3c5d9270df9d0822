//! Observation geometry families of instrument states.

use serde::{Deserialize, Serialize};

/// Viewing geometry of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Nadir,
    Limb,
    Occultation,
    Monitor,
}

impl SourceKind {
    /// Classify a state id.
    ///
    /// Nadir: 1-7 and 65. Limb: 27-44. Occultation: 47-51 and 55.
    /// Everything else (dark, lamp and diffuser states) is monitoring.
    pub fn from_state_id(state_id: u8) -> Self {
        match state_id {
            1..=7 | 65 => Self::Nadir,
            27..=44 => Self::Limb,
            47..=51 | 55 => Self::Occultation,
            _ => Self::Monitor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nadir => "nadir",
            Self::Limb => "limb",
            Self::Occultation => "occultation",
            Self::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
