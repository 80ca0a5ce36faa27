//! Global keyboard controls, backed by `rdev`.
//!
//! `rdev::listen()` blocks forever, so [`HotkeyListener::start`] runs it on a
//! dedicated OS thread.  Each key event goes through a [`KeyMapper`], which
//! turns it into a [`SessionCommand`] for the orchestrator.
//!
//! The hold key maps press to [`SessionCommand::HoldPressed`] and release to
//! [`SessionCommand::HoldReleased`].  OS auto-repeat presses are swallowed so
//! one physical hold is one gesture.
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use pov_kids::config::KeyConfig;
//! use pov_kids::hotkey::{HotkeyListener, KeyBindings};
//!
//! let (tx, mut rx) = mpsc::channel(16);
//! let _listener = HotkeyListener::start(KeyBindings::from_config(&KeyConfig::default()), tx);
//! // while let Some(command) = rx.recv().await { ... }
//! ```

pub mod listener;

pub use listener::HotkeyListener;

use crate::config::KeyConfig;
use crate::session::SessionCommand;

// ---------------------------------------------------------------------------
// KeyBindings
// ---------------------------------------------------------------------------

/// Resolved key for every control.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBindings {
    pub hold: rdev::Key,
    pub start: rdev::Key,
    pub capture: rdev::Key,
    pub replay: rdev::Key,
    pub next_language: rdev::Key,
    pub next_word: rdev::Key,
    pub retry: rdev::Key,
    pub go_home: rdev::Key,
    pub quit: rdev::Key,
}

impl KeyBindings {
    /// Resolve every configured key name.  Unknown names fall back to the
    /// default binding for that control.
    pub fn from_config(keys: &KeyConfig) -> Self {
        let defaults = KeyConfig::default();
        let resolve = |name: &str, fallback: &str, control: &str| {
            parse_key(name).unwrap_or_else(|| {
                log::warn!("hotkey: unknown key {name:?} for {control}, using {fallback}");
                parse_key(fallback).unwrap_or(rdev::Key::Escape)
            })
        };

        Self {
            hold: resolve(&keys.hold, &defaults.hold, "hold"),
            start: resolve(&keys.start, &defaults.start, "start"),
            capture: resolve(&keys.capture, &defaults.capture, "capture"),
            replay: resolve(&keys.replay, &defaults.replay, "replay"),
            next_language: resolve(&keys.next_language, &defaults.next_language, "next_language"),
            next_word: resolve(&keys.next_word, &defaults.next_word, "next_word"),
            retry: resolve(&keys.retry, &defaults.retry, "retry"),
            go_home: resolve(&keys.go_home, &defaults.go_home, "go_home"),
            quit: resolve(&keys.quit, &defaults.quit, "quit"),
        }
    }

    /// The command a single key press triggers; the hold key is excluded.
    fn press_command(&self, key: rdev::Key) -> Option<SessionCommand> {
        let command = if key == self.start {
            SessionCommand::Start
        } else if key == self.capture {
            SessionCommand::Capture
        } else if key == self.replay {
            SessionCommand::Replay
        } else if key == self.next_language {
            SessionCommand::NextLanguage
        } else if key == self.next_word {
            SessionCommand::NextWord
        } else if key == self.retry {
            SessionCommand::Retry
        } else if key == self.go_home {
            SessionCommand::GoHome
        } else if key == self.quit {
            SessionCommand::Shutdown
        } else {
            return None;
        };
        Some(command)
    }
}

// ---------------------------------------------------------------------------
// KeyMapper
// ---------------------------------------------------------------------------

/// Turns raw key events into session commands.
#[derive(Debug)]
pub struct KeyMapper {
    bindings: KeyBindings,
    holding: bool,
}

impl KeyMapper {
    pub fn new(bindings: KeyBindings) -> Self {
        Self {
            bindings,
            holding: false,
        }
    }

    pub fn map(&mut self, event: &rdev::EventType) -> Option<SessionCommand> {
        match event {
            rdev::EventType::KeyPress(key) if *key == self.bindings.hold => {
                if self.holding {
                    return None;
                }
                self.holding = true;
                Some(SessionCommand::HoldPressed)
            }
            rdev::EventType::KeyRelease(key) if *key == self.bindings.hold => {
                if !self.holding {
                    return None;
                }
                self.holding = false;
                Some(SessionCommand::HoldReleased)
            }
            rdev::EventType::KeyPress(key) => self.bindings.press_command(*key),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// parse_key
// ---------------------------------------------------------------------------

/// Parse a key name from the config file into an [`rdev::Key`].
///
/// Supports F1–F12, common named keys, digits and single ASCII letters in
/// either case.
///
/// ```
/// use pov_kids::hotkey::parse_key;
///
/// assert_eq!(parse_key("Space"), Some(rdev::Key::Space));
/// assert_eq!(parse_key("c"),     Some(rdev::Key::KeyC));
/// assert_eq!(parse_key("xyz"),   None);
/// ```
pub fn parse_key(key_str: &str) -> Option<rdev::Key> {
    match key_str {
        "F1" => Some(rdev::Key::F1),
        "F2" => Some(rdev::Key::F2),
        "F3" => Some(rdev::Key::F3),
        "F4" => Some(rdev::Key::F4),
        "F5" => Some(rdev::Key::F5),
        "F6" => Some(rdev::Key::F6),
        "F7" => Some(rdev::Key::F7),
        "F8" => Some(rdev::Key::F8),
        "F9" => Some(rdev::Key::F9),
        "F10" => Some(rdev::Key::F10),
        "F11" => Some(rdev::Key::F11),
        "F12" => Some(rdev::Key::F12),

        "Escape" | "Esc" => Some(rdev::Key::Escape),
        "Space" => Some(rdev::Key::Space),
        "Return" | "Enter" => Some(rdev::Key::Return),
        "Tab" => Some(rdev::Key::Tab),
        "Backspace" => Some(rdev::Key::Backspace),
        "Home" => Some(rdev::Key::Home),
        "End" => Some(rdev::Key::End),
        "UpArrow" | "Up" => Some(rdev::Key::UpArrow),
        "DownArrow" | "Down" => Some(rdev::Key::DownArrow),
        "LeftArrow" | "Left" => Some(rdev::Key::LeftArrow),
        "RightArrow" | "Right" => Some(rdev::Key::RightArrow),

        "0" => Some(rdev::Key::Num0),
        "1" => Some(rdev::Key::Num1),
        "2" => Some(rdev::Key::Num2),
        "3" => Some(rdev::Key::Num3),
        "4" => Some(rdev::Key::Num4),
        "5" => Some(rdev::Key::Num5),
        "6" => Some(rdev::Key::Num6),
        "7" => Some(rdev::Key::Num7),
        "8" => Some(rdev::Key::Num8),
        "9" => Some(rdev::Key::Num9),

        "A" | "a" => Some(rdev::Key::KeyA),
        "B" | "b" => Some(rdev::Key::KeyB),
        "C" | "c" => Some(rdev::Key::KeyC),
        "D" | "d" => Some(rdev::Key::KeyD),
        "E" | "e" => Some(rdev::Key::KeyE),
        "F" | "f" => Some(rdev::Key::KeyF),
        "G" | "g" => Some(rdev::Key::KeyG),
        "H" | "h" => Some(rdev::Key::KeyH),
        "I" | "i" => Some(rdev::Key::KeyI),
        "J" | "j" => Some(rdev::Key::KeyJ),
        "K" | "k" => Some(rdev::Key::KeyK),
        "L" | "l" => Some(rdev::Key::KeyL),
        "M" | "m" => Some(rdev::Key::KeyM),
        "N" | "n" => Some(rdev::Key::KeyN),
        "O" | "o" => Some(rdev::Key::KeyO),
        "P" | "p" => Some(rdev::Key::KeyP),
        "Q" | "q" => Some(rdev::Key::KeyQ),
        "R" | "r" => Some(rdev::Key::KeyR),
        "S" | "s" => Some(rdev::Key::KeyS),
        "T" | "t" => Some(rdev::Key::KeyT),
        "U" | "u" => Some(rdev::Key::KeyU),
        "V" | "v" => Some(rdev::Key::KeyV),
        "W" | "w" => Some(rdev::Key::KeyW),
        "X" | "x" => Some(rdev::Key::KeyX),
        "Y" | "y" => Some(rdev::Key::KeyY),
        "Z" | "z" => Some(rdev::Key::KeyZ),

        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rdev::EventType::{KeyPress, KeyRelease};
    use rdev::Key;

    fn mapper() -> KeyMapper {
        KeyMapper::new(KeyBindings::from_config(&KeyConfig::default()))
    }

    #[test]
    fn parse_named_and_letter_keys() {
        assert_eq!(parse_key("Esc"), Some(Key::Escape));
        assert_eq!(parse_key("Enter"), Some(Key::Return));
        assert_eq!(parse_key("z"), Some(Key::KeyZ));
        assert_eq!(parse_key("7"), Some(Key::Num7));
        assert_eq!(parse_key("Ctrl+V"), None);
        assert_eq!(parse_key(""), None);
    }

    #[test]
    fn unknown_key_falls_back_to_default() {
        let keys = KeyConfig {
            capture: "Hyper".into(),
            ..KeyConfig::default()
        };
        assert_eq!(KeyBindings::from_config(&keys).capture, Key::KeyC);
    }

    #[test]
    fn hold_key_maps_to_one_press_and_release() {
        let mut m = mapper();
        assert_eq!(m.map(&KeyPress(Key::Space)), Some(SessionCommand::HoldPressed));
        assert_eq!(m.map(&KeyPress(Key::Space)), None, "auto-repeat swallowed");
        assert_eq!(m.map(&KeyRelease(Key::Space)), Some(SessionCommand::HoldReleased));
        assert_eq!(m.map(&KeyRelease(Key::Space)), None);
    }

    #[test]
    fn control_keys_map_on_press_only() {
        let mut m = mapper();
        assert_eq!(m.map(&KeyPress(Key::KeyS)), Some(SessionCommand::Start));
        assert_eq!(m.map(&KeyPress(Key::KeyC)), Some(SessionCommand::Capture));
        assert_eq!(m.map(&KeyPress(Key::KeyL)), Some(SessionCommand::NextLanguage));
        assert_eq!(m.map(&KeyPress(Key::KeyQ)), Some(SessionCommand::Shutdown));
        assert_eq!(m.map(&KeyRelease(Key::KeyC)), None);
        assert_eq!(m.map(&KeyPress(Key::KeyZ)), None);
    }
}
