//! Alert levels

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete alert level, totally ordered from cleanest to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    #[default]
    Green,
    Yellow,
    Orange,
    Red,
}

impl AlertLevel {
    /// All levels in ascending order
    pub const ALL: [AlertLevel; 4] = [
        AlertLevel::Green,
        AlertLevel::Yellow,
        AlertLevel::Orange,
        AlertLevel::Red,
    ];

    /// Levels that carry thresholds (everything above Green)
    pub const ELEVATED: [AlertLevel; 3] = [AlertLevel::Yellow, AlertLevel::Orange, AlertLevel::Red];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Green => "green",
            AlertLevel::Yellow => "yellow",
            AlertLevel::Orange => "orange",
            AlertLevel::Red => "red",
        }
    }

    /// Stable numeric rank (Green = 0)
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
