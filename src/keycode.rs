use serde::{Deserialize, Serialize};

/// Coarse classification of a key, used by bindings and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCategory {
    Modifier,
    Letter,
    Number,
    Function,
    Special,
    Navigation,
    Media,
}

/// Builds [`KeyCode`] from category blocks of `NAME = evdev_code` entries.
///
/// Grouping by category keeps the table readable and lets the macro derive
/// `category()` without annotating every key. Lookup tables (`from_name`,
/// `from_evdev_code`) fall out of the same entries.
macro_rules! keycodes {
    (
        $(
            $category:ident {
                $( $name:ident = $code:expr ),* $(,)?
            }
        )*
    ) => {
        /// A key the sink can press, identified by its evdev code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u16)]
        #[allow(non_camel_case_types)]
        pub enum KeyCode {
            $($( $name = $code, )*)*
        }

        impl KeyCode {
            /// The evdev code this key presses.
            #[must_use]
            pub const fn code(self) -> u16 {
                self as u16
            }

            /// Reverse lookup from an evdev code; None if unmapped.
            #[must_use]
            pub const fn from_evdev_code(code: u16) -> Option<Self> {
                match code {
                    $($( $code => Some(Self::$name), )*)*
                    _ => None,
                }
            }

            #[must_use]
            pub const fn category(self) -> KeyCategory {
                match self {
                    $($( Self::$name => keycodes!(@cat $category), )*)*
                }
            }

            #[must_use]
            pub const fn is_modifier(self) -> bool {
                matches!(self.category(), KeyCategory::Modifier)
            }

            /// Canonical name, e.g. "KC_A".
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $($( Self::$name => stringify!($name), )*)*
                }
            }

            /// Parse a key from its name as written in keymap and config
            /// files; the "KC_" prefix and letter case are optional.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                let upper = name.to_ascii_uppercase();
                let canonical = if upper.starts_with("KC_") {
                    upper
                } else {
                    format!("KC_{upper}")
                };
                match canonical.as_str() {
                    $($( stringify!($name) => Some(Self::$name), )*)*
                    _ => None,
                }
            }
        }
    };

    (@cat modifiers) => { KeyCategory::Modifier };
    (@cat letters) => { KeyCategory::Letter };
    (@cat numbers) => { KeyCategory::Number };
    (@cat function) => { KeyCategory::Function };
    (@cat specials) => { KeyCategory::Special };
    (@cat navigation) => { KeyCategory::Navigation };
    (@cat media) => { KeyCategory::Media };
}

keycodes! {
    letters {
        KC_A = 30, KC_B = 48, KC_C = 46, KC_D = 32, KC_E = 18,
        KC_F = 33, KC_G = 34, KC_H = 35, KC_I = 23, KC_J = 36,
        KC_K = 37, KC_L = 38, KC_M = 50, KC_N = 49, KC_O = 24,
        KC_P = 25, KC_Q = 16, KC_R = 19, KC_S = 31, KC_T = 20,
        KC_U = 22, KC_V = 47, KC_W = 17, KC_X = 45, KC_Y = 21,
        KC_Z = 44,
    }
    numbers {
        KC_1 = 2, KC_2 = 3, KC_3 = 4, KC_4 = 5, KC_5 = 6,
        KC_6 = 7, KC_7 = 8, KC_8 = 9, KC_9 = 10, KC_0 = 11,
    }
    modifiers {
        KC_LCTL = 29, KC_LSFT = 42, KC_LALT = 56, KC_LGUI = 125,
        KC_RCTL = 97, KC_RSFT = 54, KC_RALT = 100, KC_RGUI = 126,
    }
    specials {
        KC_ESC = 1, KC_TAB = 15, KC_SPC = 57, KC_ENT = 28,
        KC_BSPC = 14, KC_DEL = 111, KC_CAPS = 58, KC_GRV = 41,
        KC_MINS = 12, KC_EQL = 13, KC_LBRC = 26, KC_RBRC = 27,
        KC_BSLS = 43, KC_SCLN = 39, KC_QUOT = 40, KC_COMM = 51,
        KC_DOT = 52, KC_SLSH = 53,
    }
    navigation {
        KC_LEFT = 105, KC_DOWN = 108, KC_UP = 103, KC_RGHT = 106,
        KC_PGUP = 104, KC_PGDN = 109, KC_HOME = 102, KC_END = 107,
        KC_INS = 110,
    }
    function {
        KC_F1 = 59, KC_F2 = 60, KC_F3 = 61, KC_F4 = 62,
        KC_F5 = 63, KC_F6 = 64, KC_F7 = 65, KC_F8 = 66,
        KC_F9 = 67, KC_F10 = 68, KC_F11 = 87, KC_F12 = 88,
    }
    media {
        KC_MUTE = 113, KC_VOLD = 114, KC_VOLU = 115,
        KC_MPLY = 164, KC_MNXT = 163, KC_MPRV = 165,
    }
}

impl KeyCode {
    /// Map a character to the keycode that produces it, plus whether shift
    /// is required. Returns None for characters with no direct key.
    #[must_use]
    pub const fn from_char(ch: char) -> Option<(Self, bool)> {
        match ch {
            'a' => Some((Self::KC_A, false)),
            'b' => Some((Self::KC_B, false)),
            'c' => Some((Self::KC_C, false)),
            'd' => Some((Self::KC_D, false)),
            'e' => Some((Self::KC_E, false)),
            'f' => Some((Self::KC_F, false)),
            'g' => Some((Self::KC_G, false)),
            'h' => Some((Self::KC_H, false)),
            'i' => Some((Self::KC_I, false)),
            'j' => Some((Self::KC_J, false)),
            'k' => Some((Self::KC_K, false)),
            'l' => Some((Self::KC_L, false)),
            'm' => Some((Self::KC_M, false)),
            'n' => Some((Self::KC_N, false)),
            'o' => Some((Self::KC_O, false)),
            'p' => Some((Self::KC_P, false)),
            'q' => Some((Self::KC_Q, false)),
            'r' => Some((Self::KC_R, false)),
            's' => Some((Self::KC_S, false)),
            't' => Some((Self::KC_T, false)),
            'u' => Some((Self::KC_U, false)),
            'v' => Some((Self::KC_V, false)),
            'w' => Some((Self::KC_W, false)),
            'x' => Some((Self::KC_X, false)),
            'y' => Some((Self::KC_Y, false)),
            'z' => Some((Self::KC_Z, false)),
            'A' => Some((Self::KC_A, true)),
            'B' => Some((Self::KC_B, true)),
            'C' => Some((Self::KC_C, true)),
            'D' => Some((Self::KC_D, true)),
            'E' => Some((Self::KC_E, true)),
            'F' => Some((Self::KC_F, true)),
            'G' => Some((Self::KC_G, true)),
            'H' => Some((Self::KC_H, true)),
            'I' => Some((Self::KC_I, true)),
            'J' => Some((Self::KC_J, true)),
            'K' => Some((Self::KC_K, true)),
            'L' => Some((Self::KC_L, true)),
            'M' => Some((Self::KC_M, true)),
            'N' => Some((Self::KC_N, true)),
            'O' => Some((Self::KC_O, true)),
            'P' => Some((Self::KC_P, true)),
            'Q' => Some((Self::KC_Q, true)),
            'R' => Some((Self::KC_R, true)),
            'S' => Some((Self::KC_S, true)),
            'T' => Some((Self::KC_T, true)),
            'U' => Some((Self::KC_U, true)),
            'V' => Some((Self::KC_V, true)),
            'W' => Some((Self::KC_W, true)),
            'X' => Some((Self::KC_X, true)),
            'Y' => Some((Self::KC_Y, true)),
            'Z' => Some((Self::KC_Z, true)),
            '0' => Some((Self::KC_0, false)),
            '1' => Some((Self::KC_1, false)),
            '2' => Some((Self::KC_2, false)),
            '3' => Some((Self::KC_3, false)),
            '4' => Some((Self::KC_4, false)),
            '5' => Some((Self::KC_5, false)),
            '6' => Some((Self::KC_6, false)),
            '7' => Some((Self::KC_7, false)),
            '8' => Some((Self::KC_8, false)),
            '9' => Some((Self::KC_9, false)),
            '!' => Some((Self::KC_1, true)),
            '@' => Some((Self::KC_2, true)),
            '#' => Some((Self::KC_3, true)),
            '$' => Some((Self::KC_4, true)),
            '%' => Some((Self::KC_5, true)),
            '^' => Some((Self::KC_6, true)),
            '&' => Some((Self::KC_7, true)),
            '*' => Some((Self::KC_8, true)),
            '(' => Some((Self::KC_9, true)),
            ')' => Some((Self::KC_0, true)),
            ' ' => Some((Self::KC_SPC, false)),
            '-' => Some((Self::KC_MINS, false)),
            '_' => Some((Self::KC_MINS, true)),
            '=' => Some((Self::KC_EQL, false)),
            '+' => Some((Self::KC_EQL, true)),
            '[' => Some((Self::KC_LBRC, false)),
            '{' => Some((Self::KC_LBRC, true)),
            ']' => Some((Self::KC_RBRC, false)),
            '}' => Some((Self::KC_RBRC, true)),
            '\\' => Some((Self::KC_BSLS, false)),
            '|' => Some((Self::KC_BSLS, true)),
            ';' => Some((Self::KC_SCLN, false)),
            ':' => Some((Self::KC_SCLN, true)),
            '\'' => Some((Self::KC_QUOT, false)),
            '"' => Some((Self::KC_QUOT, true)),
            ',' => Some((Self::KC_COMM, false)),
            '<' => Some((Self::KC_COMM, true)),
            '.' => Some((Self::KC_DOT, false)),
            '>' => Some((Self::KC_DOT, true)),
            '/' => Some((Self::KC_SLSH, false)),
            '?' => Some((Self::KC_SLSH, true)),
            '`' => Some((Self::KC_GRV, false)),
            '~' => Some((Self::KC_GRV, true)),
            _ => None,
        }
    }
}

/// Modifier bitmask used by modifier bindings.
/// Bit layout follows the USB HID modifier byte.
pub mod modmask {
    pub const LCTL: u8 = 1 << 0;
    pub const LSFT: u8 = 1 << 1;
    pub const LALT: u8 = 1 << 2;
    pub const LGUI: u8 = 1 << 3;
    pub const RCTL: u8 = 1 << 4;
    pub const RSFT: u8 = 1 << 5;
    pub const RALT: u8 = 1 << 6;
    pub const RGUI: u8 = 1 << 7;

    use super::KeyCode;

    /// Expand a mask into the keycodes it names, in bit order.
    pub fn keycodes(mask: u8) -> impl Iterator<Item = KeyCode> {
        const TABLE: [(u8, KeyCode); 8] = [
            (LCTL, KeyCode::KC_LCTL),
            (LSFT, KeyCode::KC_LSFT),
            (LALT, KeyCode::KC_LALT),
            (LGUI, KeyCode::KC_LGUI),
            (RCTL, KeyCode::KC_RCTL),
            (RSFT, KeyCode::KC_RSFT),
            (RALT, KeyCode::KC_RALT),
            (RGUI, KeyCode::KC_RGUI),
        ];
        TABLE
            .into_iter()
            .filter_map(move |(bit, kc)| (mask & bit != 0).then_some(kc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evdev_roundtrip() {
        for kc in [KeyCode::KC_A, KeyCode::KC_ESC, KeyCode::KC_LSFT, KeyCode::KC_F12] {
            assert_eq!(KeyCode::from_evdev_code(kc.code()), Some(kc));
        }
    }

    #[test]
    fn name_parsing_accepts_bare_and_prefixed() {
        assert_eq!(KeyCode::from_name("KC_K"), Some(KeyCode::KC_K));
        assert_eq!(KeyCode::from_name("k"), Some(KeyCode::KC_K));
        assert_eq!(KeyCode::from_name("spc"), Some(KeyCode::KC_SPC));
        assert_eq!(KeyCode::from_name("bogus"), None);
    }

    #[test]
    fn char_mapping_shift_pairs() {
        assert_eq!(KeyCode::from_char('k'), Some((KeyCode::KC_K, false)));
        assert_eq!(KeyCode::from_char('K'), Some((KeyCode::KC_K, true)));
        assert_eq!(KeyCode::from_char('?'), Some((KeyCode::KC_SLSH, true)));
        assert_eq!(KeyCode::from_char('\u{1F600}'), None);
    }

    #[test]
    fn modmask_expansion_order() {
        let keys: Vec<_> = modmask::keycodes(modmask::LSFT | modmask::RALT).collect();
        assert_eq!(keys, vec![KeyCode::KC_LSFT, KeyCode::KC_RALT]);
    }

    #[test]
    fn categories_follow_their_block() {
        assert!(KeyCode::KC_LCTL.is_modifier());
        assert!(!KeyCode::KC_A.is_modifier());
        assert_eq!(KeyCode::KC_UP.category(), KeyCategory::Navigation);
        assert_eq!(KeyCode::KC_MPLY.category(), KeyCategory::Media);
    }
}
