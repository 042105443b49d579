use std::fmt;
use std::str::FromStr;

use quiz_core::model::ViolationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Character(char),
    Escape,
    Tab,
    Function(u8),
    Enter,
    Other,
}

/// A key press with its modifier state, as seen at capture phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub key: Key,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl KeyChord {
    #[must_use]
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
        }
    }

    #[must_use]
    pub fn ctrl(key: char) -> Self {
        Self {
            ctrl: true,
            ..Self::plain(Key::Character(key))
        }
    }

    #[must_use]
    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    fn command(&self) -> bool {
        self.ctrl || self.meta
    }

    fn letter(&self) -> Option<char> {
        match self.key {
            Key::Character(c) => Some(c.to_ascii_lowercase()),
            _ => None,
        }
    }
}

/// Whether the host must prevent the key's default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyVerdict {
    Allow,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Allowed,
    /// Anti-copy shortcuts: blocked, not counted.
    Suppressed,
    Violation(ViolationKind),
}

impl KeyClass {
    #[must_use]
    pub fn verdict(self) -> KeyVerdict {
        match self {
            KeyClass::Allowed => KeyVerdict::Allow,
            KeyClass::Suppressed | KeyClass::Violation(_) => KeyVerdict::Block,
        }
    }
}

#[must_use]
pub fn classify(chord: &KeyChord) -> KeyClass {
    let letter = chord.letter();

    if chord.command() && matches!(letter, Some('t' | 'n')) {
        return KeyClass::Violation(ViolationKind::NewWindowShortcut);
    }
    match chord.key {
        Key::Escape => return KeyClass::Violation(ViolationKind::EscapeKey),
        Key::Tab if chord.alt || chord.meta => return KeyClass::Violation(ViolationKind::AltTab),
        Key::Function(12) => return KeyClass::Violation(ViolationKind::DevtoolsShortcut),
        _ => {}
    }
    let devtools_modifiers = (chord.ctrl && chord.shift) || (chord.meta && chord.alt);
    if devtools_modifiers && matches!(letter, Some('i' | 'j' | 'c')) {
        return KeyClass::Violation(ViolationKind::DevtoolsShortcut);
    }
    if chord.command() {
        match letter {
            Some('s') => return KeyClass::Violation(ViolationKind::SaveShortcut),
            Some('p') => return KeyClass::Violation(ViolationKind::PrintShortcut),
            Some('u') => return KeyClass::Violation(ViolationKind::ViewSourceShortcut),
            Some('c' | 'x' | 'v' | 'a') => return KeyClass::Suppressed,
            _ => {}
        }
    }
    KeyClass::Allowed
}

// ─── Parsing ───────────────────────────────────────────────────────────────────

/// Error type for parsing a chord such as `ctrl+shift+i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChordError {
    raw: String,
}

impl fmt::Display for ParseChordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized key chord: {}", self.raw)
    }
}

impl std::error::Error for ParseChordError {}

impl FromStr for KeyChord {
    type Err = ParseChordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseChordError { raw: s.to_string() };
        let mut chord = KeyChord::plain(Key::Other);
        let mut key = None;
        for part in s.split('+').map(|p| p.trim().to_ascii_lowercase()) {
            match part.as_str() {
                "ctrl" | "control" => chord.ctrl = true,
                "alt" | "option" => chord.alt = true,
                "shift" => chord.shift = true,
                "meta" | "cmd" | "super" => chord.meta = true,
                "esc" | "escape" => key = Some(Key::Escape),
                "tab" => key = Some(Key::Tab),
                "enter" => key = Some(Key::Enter),
                other => {
                    let mut chars = other.chars();
                    key = Some(match (chars.next(), chars.next()) {
                        (Some(c), None) => Key::Character(c),
                        (Some('f'), Some(_)) => Key::Function(other[1..].parse().map_err(|_| err())?),
                        _ => return Err(err()),
                    });
                }
            }
        }
        chord.key = key.ok_or_else(err)?;
        Ok(chord)
    }
}
