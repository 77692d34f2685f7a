use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::skill::SkillLevel;

/// Who plays the side the human is not playing.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Nobody: the human moves for both sides.
    Human,
    /// The engine, at this skill.
    Engine(SkillLevel),
}

impl Difficulty {
    pub const EASY: Difficulty = Difficulty::Engine(SkillLevel::MIN);
    pub const NORMAL: Difficulty = Difficulty::Engine(SkillLevel::new_const(7));
    pub const HARD: Difficulty = Difficulty::Engine(SkillLevel::new_const(13));
    pub const EXTREME: Difficulty = Difficulty::Engine(SkillLevel::MAX);

    /// The named presets offered in the level menu.
    pub fn preset(name: &str) -> Option<Difficulty> {
        match name {
            "human" => Some(Difficulty::Human),
            "easy" => Some(Difficulty::EASY),
            "normal" => Some(Difficulty::NORMAL),
            "hard" => Some(Difficulty::HARD),
            "extreme" => Some(Difficulty::EXTREME),
            _ => None,
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::NORMAL
    }
}

/// Who makes the next move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mover {
    Human,
    Engine(SkillLevel),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub difficulty: Difficulty,
    #[serde(with = "crate::chess_serde::color_serde")]
    pub human_side: Color,
    pub hints: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            difficulty: Difficulty::default(),
            human_side: Color::White,
            hints: true,
        }
    }
}

impl Settings {
    pub fn mover(&self, turn: Color) -> Mover {
        match self.difficulty {
            Difficulty::Engine(skill) if turn != self.human_side => Mover::Engine(skill),
            _ => Mover::Human,
        }
    }

    /// Apply the fields present in `update`. Returns whether anything changed.
    pub fn apply(&mut self, update: &SettingsUpdate) -> bool {
        let before = *self;
        if let Some(difficulty) = update.difficulty {
            self.difficulty = difficulty;
        }
        if let Some(side) = update.human_side {
            self.human_side = side;
        }
        if let Some(hints) = update.hints {
            self.hints = hints;
        }
        *self != before
    }
}

/// A partial change to [`Settings`].
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SettingsUpdate {
    pub difficulty: Option<Difficulty>,
    #[serde(deserialize_with = "crate::chess_serde::color_serde::option::deserialize")]
    pub human_side: Option<Color>,
    pub hints: Option<bool>,
}

impl SettingsUpdate {
    pub fn difficulty(difficulty: Difficulty) -> Self {
        SettingsUpdate {
            difficulty: Some(difficulty),
            ..Default::default()
        }
    }

    pub fn human_side(side: Color) -> Self {
        SettingsUpdate {
            human_side: Some(side),
            ..Default::default()
        }
    }

    pub fn hints(enabled: bool) -> Self {
        SettingsUpdate {
            hints: Some(enabled),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_moves_only_for_the_other_side() {
        let settings = Settings::default();
        assert_eq!(settings.mover(Color::White), Mover::Human);
        assert_eq!(
            settings.mover(Color::Black),
            Mover::Engine(SkillLevel::new(7))
        );

        let both = Settings {
            difficulty: Difficulty::Human,
            ..settings
        };
        assert_eq!(both.mover(Color::Black), Mover::Human);
    }

    #[test]
    fn presets() {
        assert_eq!(Difficulty::preset("human"), Some(Difficulty::Human));
        assert_eq!(
            Difficulty::preset("hard"),
            Some(Difficulty::Engine(SkillLevel::new(13)))
        );
        assert_eq!(Difficulty::preset("grandmaster"), None);
    }

    #[test]
    fn partial_updates() {
        let mut settings = Settings::default();
        assert!(!settings.apply(&SettingsUpdate::hints(true)));
        assert!(settings.apply(&SettingsUpdate::human_side(Color::Black)));
        assert_eq!(settings.human_side, Color::Black);
        assert!(settings.hints);

        let update: SettingsUpdate =
            serde_json::from_str(r#"{"difficulty":{"engine":20},"human_side":"white"}"#).unwrap();
        assert!(settings.apply(&update));
        assert_eq!(settings.difficulty, Difficulty::EXTREME);
        assert_eq!(settings.human_side, Color::White);
    }

    #[test]
    fn persisted_form() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert_eq!(
            json,
            r#"{"difficulty":{"engine":7},"human_side":"white","hints":true}"#
        );
        let restored: Settings = serde_json::from_str(r#"{"difficulty":"human"}"#).unwrap();
        assert_eq!(restored.difficulty, Difficulty::Human);
        assert!(restored.hints);
    }
}
