use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical season identifier used to bucket historical records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

/// Display names offered to the user, in selector order.
pub const DISPLAY_NAMES: [&str; 4] = ["Зима", "Весна", "Осень", "Лето"];

const LEXICON: [(&str, Season); 4] = [
    ("Зима", Season::Winter),
    ("Весна", Season::Spring),
    ("Осень", Season::Autumn),
    ("Лето", Season::Summer),
];

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Autumn];

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }

    /// Resolves a display name from the season selector.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::UnknownSeason` for any name outside [`DISPLAY_NAMES`].
    pub fn from_display_name(name: &str) -> Result<Season> {
        LEXICON
            .iter()
            .find(|(display, _)| *display == name)
            .map(|(_, season)| *season)
            .ok_or_else(|| PipelineError::UnknownSeason(name.to_string()))
    }

    pub fn display_name(&self) -> &'static str {
        LEXICON
            .iter()
            .find(|(_, season)| season == self)
            .map(|(display, _)| *display)
            .unwrap_or_else(|| self.as_str())
    }
}

impl FromStr for Season {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "winter" => Ok(Season::Winter),
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "autumn" => Ok(Season::Autumn),
            other => Err(PipelineError::DataFormat(format!(
                "unrecognized season identifier: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
