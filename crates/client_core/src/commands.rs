//! Maps keyboard, voice, and menu triggers onto controller actions.

use std::str::FromStr;

use thiserror::Error;

pub const PRODUCT_NAME: &str = "eyemouse";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerAction {
    Activate,
    Deactivate,
    Toggle,
    Recalibrate,
    Tune,
}

impl ControllerAction {
    pub fn name(self) -> &'static str {
        match self {
            ControllerAction::Activate => "activate",
            ControllerAction::Deactivate => "deactivate",
            ControllerAction::Toggle => "toggle",
            ControllerAction::Recalibrate => "recalibrate",
            ControllerAction::Tune => "tune",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown controller action: {0}")]
pub struct UnknownAction(pub String);

/// Menu/host action names.
impl FromStr for ControllerAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "toggle" => Ok(ControllerAction::Toggle),
            "tune" => Ok(ControllerAction::Tune),
            "recalibrate" => Ok(ControllerAction::Recalibrate),
            "activate" => Ok(ControllerAction::Activate),
            "deactivate" => Ok(ControllerAction::Deactivate),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Rules are tested in order and the first match wins, so a phrase that
/// mentions the product and contains "activate" (even inside "deactivate")
/// resolves to `Activate`.
pub fn action_for_phrase(phrase: &str) -> Option<ControllerAction> {
    let normalized = phrase.to_lowercase();
    let compact: String = normalized.split_whitespace().collect();

    if normalized.contains("activate") && compact.contains(PRODUCT_NAME) {
        Some(ControllerAction::Activate)
    } else if normalized.contains("recalibrate") {
        Some(ControllerAction::Recalibrate)
    } else if normalized.contains("deactivate") || normalized.contains("stop") {
        Some(ControllerAction::Deactivate)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub key: char,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyChord {
    pub const fn ctrl_shift(key: char) -> Self {
        Self {
            key,
            ctrl: true,
            shift: true,
            alt: false,
        }
    }

    fn matches(&self, other: &KeyChord) -> bool {
        self.key.eq_ignore_ascii_case(&other.key)
            && self.ctrl == other.ctrl
            && self.shift == other.shift
            && self.alt == other.alt
    }
}

pub const TOGGLE_SHORTCUT: KeyChord = KeyChord::ctrl_shift('E');

pub fn action_for_shortcut(chord: &KeyChord) -> Option<ControllerAction> {
    TOGGLE_SHORTCUT
        .matches(chord)
        .then_some(ControllerAction::Toggle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_phrase_needs_product_name() {
        assert_eq!(
            action_for_phrase("Activate EyeMouse"),
            Some(ControllerAction::Activate)
        );
        assert_eq!(
            action_for_phrase("please activate eye mouse now"),
            Some(ControllerAction::Activate)
        );
        assert_eq!(action_for_phrase("activate the lights"), None);
    }

    #[test]
    fn recalibrate_and_deactivate_phrases() {
        assert_eq!(
            action_for_phrase("Recalibrate please"),
            Some(ControllerAction::Recalibrate)
        );
        assert_eq!(
            action_for_phrase("STOP"),
            Some(ControllerAction::Deactivate)
        );
        assert_eq!(
            action_for_phrase("deactivate"),
            Some(ControllerAction::Deactivate)
        );
        assert_eq!(action_for_phrase("scroll down"), None);
    }

    #[test]
    fn ambiguous_phrases_follow_rule_order() {
        assert_eq!(
            action_for_phrase("deactivate eyemouse"),
            Some(ControllerAction::Activate)
        );
        assert_eq!(
            action_for_phrase("stop and recalibrate"),
            Some(ControllerAction::Recalibrate)
        );
    }

    #[test]
    fn shortcut_is_case_insensitive_and_exact() {
        assert_eq!(
            action_for_shortcut(&KeyChord::ctrl_shift('e')),
            Some(ControllerAction::Toggle)
        );
        assert_eq!(
            action_for_shortcut(&KeyChord {
                alt: true,
                ..KeyChord::ctrl_shift('E')
            }),
            None
        );
        assert_eq!(
            action_for_shortcut(&KeyChord {
                shift: false,
                ..KeyChord::ctrl_shift('E')
            }),
            None
        );
    }

    #[test]
    fn menu_actions_parse() {
        assert_eq!("toggle".parse::<ControllerAction>(), Ok(ControllerAction::Toggle));
        assert_eq!(" Tune ".parse::<ControllerAction>(), Ok(ControllerAction::Tune));
        assert_eq!("recalibrate".parse::<ControllerAction>(), Ok(ControllerAction::Recalibrate));
        assert_eq!(
            "reboot".parse::<ControllerAction>(),
            Err(UnknownAction("reboot".into()))
        );
    }
}
