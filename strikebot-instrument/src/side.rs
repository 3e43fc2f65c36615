use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Side of a binary contract (YES or NO).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Probability this side pays out, given the probability of the YES outcome.
    pub fn probability(&self, yes_probability: f64) -> f64 {
        match self {
            Side::Yes => yes_probability,
            Side::No => 1.0 - yes_probability,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
