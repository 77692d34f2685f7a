//! Engine strength parameters.

use serde::{Deserialize, Serialize};

use crate::protocol::EngineCommand;

/// An engine skill level, always within `0..=20`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(from = "i64", into = "u8")]
pub struct SkillLevel(u8);

impl SkillLevel {
    pub const MIN: SkillLevel = SkillLevel(0);
    pub const MAX: SkillLevel = SkillLevel(20);

    /// Clamp `level` into range.
    pub fn new(level: i64) -> Self {
        SkillLevel(level.clamp(Self::MIN.0 as i64, Self::MAX.0 as i64) as u8)
    }

    pub(crate) const fn new_const(level: u8) -> Self {
        if level > Self::MAX.0 {
            Self::MAX
        } else {
            SkillLevel(level)
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Value of the `Skill Level Probability` option: `round(6.35 * s + 1)`.
    pub fn error_probability(self) -> u32 {
        (6.35 * f64::from(self.0) + 1.0).round() as u32
    }

    /// Value of the `Skill Level Maximum Error` option: `round(10 - 0.5 * s)`.
    pub fn max_error(self) -> u32 {
        (10.0 - 0.5 * f64::from(self.0)).round() as u32
    }
}

impl From<i64> for SkillLevel {
    fn from(level: i64) -> Self {
        SkillLevel::new(level)
    }
}

impl From<SkillLevel> for u8 {
    fn from(level: SkillLevel) -> Self {
        level.0
    }
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Option sets sent ahead of a search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineOptions {
    /// Weakened play at the given skill.
    Skill(SkillLevel),
    /// Report this many ranked lines while searching.
    MultiPv { lines: u32 },
}

impl EngineOptions {
    pub fn commands(&self) -> Vec<EngineCommand> {
        match *self {
            EngineOptions::Skill(level) => vec![
                EngineCommand::set_option("Skill Level", level),
                EngineCommand::set_option("Skill Level Maximum Error", level.max_error()),
                EngineCommand::set_option("Skill Level Probability", level.error_probability()),
            ],
            EngineOptions::MultiPv { lines } => {
                vec![EngineCommand::set_option("MultiPV", lines.max(1))]
            }
        }
    }
}
