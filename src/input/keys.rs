//! Canonical key model.
//!
//! Remote controls deliver the same action in several spellings: a numeric
//! key code, a symbolic key name (with vendor synonyms), or a hardware key
//! name arriving on a side channel. [`normalize`] folds all of them into one
//! [`KeyEvent`] whose `{logical_key, code}` pair is identical for every
//! accepted spelling of the same action.

use std::fmt;

use crossterm::event::{KeyCode, KeyEvent as TerminalKeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};

/// Key codes that platforms emit when they do not actually know the key.
const UNRELIABLE_CODES: [u32; 2] = [0, 229];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalKey {
    Up,
    Down,
    Left,
    Right,
    Confirm,
    Back,
    VolumeUp,
    VolumeDown,
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    Unidentified,
}

const DIGITS: [LogicalKey; 10] = [
    LogicalKey::Digit0,
    LogicalKey::Digit1,
    LogicalKey::Digit2,
    LogicalKey::Digit3,
    LogicalKey::Digit4,
    LogicalKey::Digit5,
    LogicalKey::Digit6,
    LogicalKey::Digit7,
    LogicalKey::Digit8,
    LogicalKey::Digit9,
];

impl LogicalKey {
    /// Canonical numeric code reported for this key.
    pub fn code(self) -> u32 {
        match self {
            Self::Left => 37,
            Self::Up => 38,
            Self::Right => 39,
            Self::Down => 40,
            Self::Confirm => 13,
            Self::Back => 10009,
            Self::VolumeUp => 447,
            Self::VolumeDown => 448,
            Self::Unidentified => 0,
            digit => 48 + digit.digit().map(u32::from).unwrap_or(0),
        }
    }

    pub fn from_digit(value: u8) -> Option<Self> {
        DIGITS.get(value as usize).copied()
    }

    pub fn digit(self) -> Option<u8> {
        DIGITS.iter().position(|d| *d == self).map(|idx| idx as u8)
    }

    pub fn is_directional(self) -> bool {
        matches!(self, Self::Up | Self::Down | Self::Left | Self::Right)
    }

    /// Keys whose platform default behaviour must be suppressed.
    pub fn is_navigation(self) -> bool {
        self.is_directional() || matches!(self, Self::Confirm | Self::Back)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Confirm => "Confirm",
            Self::Back => "Back",
            Self::VolumeUp => "VolumeUp",
            Self::VolumeDown => "VolumeDown",
            Self::Digit0 => "Digit0",
            Self::Digit1 => "Digit1",
            Self::Digit2 => "Digit2",
            Self::Digit3 => "Digit3",
            Self::Digit4 => "Digit4",
            Self::Digit5 => "Digit5",
            Self::Digit6 => "Digit6",
            Self::Digit7 => "Digit7",
            Self::Digit8 => "Digit8",
            Self::Digit9 => "Digit9",
            Self::Unidentified => "Unidentified",
        }
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric codes accepted from platforms, including vendor-specific ones.
const CODE_TABLE: &[(u32, LogicalKey)] = &[
    (37, LogicalKey::Left),
    (38, LogicalKey::Up),
    (39, LogicalKey::Right),
    (40, LogicalKey::Down),
    (13, LogicalKey::Confirm),
    (8, LogicalKey::Back),
    (27, LogicalKey::Back),
    (166, LogicalKey::Back),
    (461, LogicalKey::Back),
    (10009, LogicalKey::Back),
    (175, LogicalKey::VolumeUp),
    (447, LogicalKey::VolumeUp),
    (174, LogicalKey::VolumeDown),
    (448, LogicalKey::VolumeDown),
];

/// Symbolic and hardware key names, with vendor synonyms.
const NAME_TABLE: &[(&str, LogicalKey)] = &[
    ("ArrowUp", LogicalKey::Up),
    ("Up", LogicalKey::Up),
    ("ArrowDown", LogicalKey::Down),
    ("Down", LogicalKey::Down),
    ("ArrowLeft", LogicalKey::Left),
    ("Left", LogicalKey::Left),
    ("ArrowRight", LogicalKey::Right),
    ("Right", LogicalKey::Right),
    ("Enter", LogicalKey::Confirm),
    ("OK", LogicalKey::Confirm),
    ("Accept", LogicalKey::Confirm),
    ("Select", LogicalKey::Confirm),
    ("Escape", LogicalKey::Back),
    ("Esc", LogicalKey::Back),
    ("Backspace", LogicalKey::Back),
    ("Back", LogicalKey::Back),
    ("GoBack", LogicalKey::Back),
    ("BrowserBack", LogicalKey::Back),
    ("XF86Back", LogicalKey::Back),
    ("AudioVolumeUp", LogicalKey::VolumeUp),
    ("VolumeUp", LogicalKey::VolumeUp),
    ("XF86AudioRaiseVolume", LogicalKey::VolumeUp),
    ("AudioVolumeDown", LogicalKey::VolumeDown),
    ("VolumeDown", LogicalKey::VolumeDown),
    ("XF86AudioLowerVolume", LogicalKey::VolumeDown),
];

/// Where a raw key arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawSource {
    /// Standard key events (code and/or name).
    Keyboard,
    /// Platform hardware-key side channel delivering vendor key names.
    Hardware,
    /// Terminal input, used by development shells.
    Terminal,
}

/// A key as delivered by the platform, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub code: Option<u32>,
    pub name: Option<String>,
    pub source: RawSource,
}

impl RawKeyEvent {
    pub fn keyboard(code: Option<u32>, name: Option<&str>) -> Self {
        Self {
            code,
            name: name.map(str::to_string),
            source: RawSource::Keyboard,
        }
    }

    pub fn code(code: u32) -> Self {
        Self::keyboard(Some(code), None)
    }

    pub fn named(name: &str) -> Self {
        Self::keyboard(None, Some(name))
    }

    pub fn hardware(name: &str) -> Self {
        Self {
            code: None,
            name: Some(name.to_string()),
            source: RawSource::Hardware,
        }
    }
}

impl From<TerminalKeyEvent> for RawKeyEvent {
    fn from(key: TerminalKeyEvent) -> Self {
        let name = match key.code {
            KeyCode::Up => Some("ArrowUp".to_string()),
            KeyCode::Down => Some("ArrowDown".to_string()),
            KeyCode::Left => Some("ArrowLeft".to_string()),
            KeyCode::Right => Some("ArrowRight".to_string()),
            KeyCode::Enter => Some("Enter".to_string()),
            KeyCode::Esc => Some("Escape".to_string()),
            KeyCode::Backspace => Some("Backspace".to_string()),
            KeyCode::Char('+') => Some("AudioVolumeUp".to_string()),
            KeyCode::Char('-') => Some("AudioVolumeDown".to_string()),
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(ch.to_string())
            }
            _ => None,
        };
        Self {
            code: None,
            name,
            source: RawSource::Terminal,
        }
    }
}

/// Canonical key event consumed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub logical_key: LogicalKey,
    pub code: u32,
    pub raw_source: RawSource,
}

impl KeyEvent {
    pub fn canonical(&self) -> (LogicalKey, u32) {
        (self.logical_key, self.code)
    }
}

fn lookup_code(code: u32) -> Option<LogicalKey> {
    if let Some((_, key)) = CODE_TABLE.iter().find(|(c, _)| *c == code) {
        return Some(*key);
    }
    match code {
        48..=57 => LogicalKey::from_digit((code - 48) as u8),
        96..=105 => LogicalKey::from_digit((code - 96) as u8),
        _ => None,
    }
}

fn lookup_name(name: &str) -> Option<LogicalKey> {
    if let Some((_, key)) = NAME_TABLE.iter().find(|(n, _)| *n == name) {
        return Some(*key);
    }
    let digit_name = name.strip_prefix("Digit").unwrap_or(name);
    let mut chars = digit_name.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => ch
            .to_digit(10)
            .and_then(|d| LogicalKey::from_digit(d as u8)),
        _ => None,
    }
}

/// Fold a raw platform key into the canonical model. Pure.
pub fn normalize(raw: &RawKeyEvent) -> KeyEvent {
    let trusted_code = raw
        .code
        .filter(|code| !UNRELIABLE_CODES.contains(code));

    let resolved = trusted_code
        .and_then(lookup_code)
        .or_else(|| raw.name.as_deref().and_then(lookup_name));

    match resolved {
        Some(logical_key) => KeyEvent {
            logical_key,
            code: logical_key.code(),
            raw_source: raw.source,
        },
        None => KeyEvent {
            logical_key: LogicalKey::Unidentified,
            code: trusted_code.unwrap_or(0),
            raw_source: raw.source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventKind;

    fn spellings(key: LogicalKey) -> Vec<RawKeyEvent> {
        let mut raws: Vec<RawKeyEvent> = CODE_TABLE
            .iter()
            .filter(|(_, k)| *k == key)
            .map(|(code, _)| RawKeyEvent::code(*code))
            .collect();
        raws.extend(
            NAME_TABLE
                .iter()
                .filter(|(_, k)| *k == key)
                .flat_map(|(name, _)| {
                    [
                        RawKeyEvent::named(name),
                        RawKeyEvent::hardware(name),
                        RawKeyEvent::keyboard(Some(0), Some(name)),
                        RawKeyEvent::keyboard(Some(229), Some(name)),
                    ]
                }),
        );
        raws
    }

    #[test]
    fn every_spelling_normalizes_identically() {
        let keys = [
            LogicalKey::Up,
            LogicalKey::Down,
            LogicalKey::Left,
            LogicalKey::Right,
            LogicalKey::Confirm,
            LogicalKey::Back,
            LogicalKey::VolumeUp,
            LogicalKey::VolumeDown,
        ];
        for key in keys {
            let raws = spellings(key);
            assert!(!raws.is_empty());
            for raw in raws {
                assert_eq!(
                    normalize(&raw).canonical(),
                    (key, key.code()),
                    "spelling {raw:?}"
                );
            }
        }
    }

    #[test]
    fn back_sentinel_and_escape_are_one_key() {
        let tizen = normalize(&RawKeyEvent::code(10009));
        let escape = normalize(&RawKeyEvent::code(27));
        let webos = normalize(&RawKeyEvent::code(461));
        let hardware = normalize(&RawKeyEvent::hardware("XF86Back"));
        assert_eq!(tizen.canonical(), escape.canonical());
        assert_eq!(tizen.canonical(), webos.canonical());
        assert_eq!(tizen.canonical(), hardware.canonical());
        assert_eq!(tizen.logical_key, LogicalKey::Back);
    }

    #[test]
    fn digits_from_row_numpad_and_names() {
        for d in 0u8..10 {
            let expected = LogicalKey::from_digit(d).unwrap();
            let row = normalize(&RawKeyEvent::code(48 + d as u32));
            let pad = normalize(&RawKeyEvent::code(96 + d as u32));
            let name = normalize(&RawKeyEvent::named(&d.to_string()));
            let digit_name = normalize(&RawKeyEvent::named(&format!("Digit{d}")));
            for event in [row, pad, name, digit_name] {
                assert_eq!(event.canonical(), (expected, expected.code()));
            }
            assert_eq!(expected.digit(), Some(d));
        }
    }

    #[test]
    fn trusted_code_wins_over_name() {
        let event = normalize(&RawKeyEvent::keyboard(Some(38), Some("ArrowDown")));
        assert_eq!(event.logical_key, LogicalKey::Up);
    }

    #[test]
    fn unreliable_code_falls_back_to_name() {
        let event = normalize(&RawKeyEvent::keyboard(Some(229), Some("ArrowLeft")));
        assert_eq!(event.logical_key, LogicalKey::Left);
    }

    #[test]
    fn unknown_input_is_unidentified() {
        let event = normalize(&RawKeyEvent::keyboard(Some(112), Some("F1")));
        assert_eq!(event.logical_key, LogicalKey::Unidentified);
        assert_eq!(event.code, 112);

        let nothing = normalize(&RawKeyEvent::keyboard(None, None));
        assert_eq!(nothing.canonical(), (LogicalKey::Unidentified, 0));
    }

    #[test]
    fn terminal_keys_map_through_names() {
        let up = TerminalKeyEvent::new(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(normalize(&up.into()).logical_key, LogicalKey::Up);

        let esc = TerminalKeyEvent::new_with_kind(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Press);
        let event = normalize(&esc.into());
        assert_eq!(event.canonical(), (LogicalKey::Back, 10009));
        assert_eq!(event.raw_source, RawSource::Terminal);

        let seven = TerminalKeyEvent::new(KeyCode::Char('7'), KeyModifiers::NONE);
        assert_eq!(normalize(&seven.into()).logical_key, LogicalKey::Digit7);
    }

    #[test]
    fn classification() {
        assert!(LogicalKey::Left.is_directional());
        assert!(LogicalKey::Back.is_navigation());
        assert!(LogicalKey::Confirm.is_navigation());
        assert!(!LogicalKey::Digit3.is_navigation());
        assert!(!LogicalKey::VolumeUp.is_navigation());
    }
}
