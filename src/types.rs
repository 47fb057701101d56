use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Exclusion policy used when deriving a recursive (draining) dataset
/// definition from a base definition.
///
/// - `None`: the base definition as is.
/// - `Snapshot`: minus files already snapshotted by a sibling project.
/// - `Consumed`: minus files consumed by a sibling project.
/// - `Child`: minus files that already have a physical child on the
///   primary data tier.
/// - `AnaChild`: same as `Child`, using the analysis data tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurType {
    None,
    Snapshot,
    Consumed,
    Child,
    AnaChild,
}

impl Default for RecurType {
    fn default() -> Self {
        RecurType::None
    }
}

impl FromStr for RecurType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(RecurType::None),
            "snapshot" => Ok(RecurType::Snapshot),
            "consumed" => Ok(RecurType::Consumed),
            "child" => Ok(RecurType::Child),
            "anachild" => Ok(RecurType::AnaChild),
            other => Err(format!(
                "invalid recur_type: {other} (expected none, snapshot, consumed, child or anachild)"
            )),
        }
    }
}

impl fmt::Display for RecurType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecurType::None => "none",
            RecurType::Snapshot => "snapshot",
            RecurType::Consumed => "consumed",
            RecurType::Child => "child",
            RecurType::AnaChild => "anachild",
        };
        f.write_str(s)
    }
}

/// Program used by the merge actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeTool {
    /// `hadd -T`: histograms only.
    Histograms,
    /// `hadd`: full ntuple merge.
    Ntuples,
    /// The stage's configured `merge` command.
    Custom,
}

/// Whether a check runs over the primary output or the analysis output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputTier {
    #[default]
    Primary,
    Analysis,
}

impl OutputTier {
    pub fn is_analysis(self) -> bool {
        matches!(self, OutputTier::Analysis)
    }
}
