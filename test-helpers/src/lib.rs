//! Common helper functions and key constants for tests.

use easy_switcher::converter::{Action, Converter, KeyEvent};

// --- Key codes used across the test suite ---

pub const KEY_BACKSPACE: u16 = 14;
pub const KEY_E: u16 = 18;
pub const KEY_H: u16 = 35;
pub const KEY_I: u16 = 23;
pub const KEY_N: u16 = 49;
pub const KEY_O: u16 = 24;
pub const KEY_R: u16 = 19;
pub const KEY_T: u16 = 20;
pub const KEY_W: u16 = 17;
pub const KEY_X: u16 = 45;
pub const KEY_A: u16 = 30;
pub const KEY_ENTER: u16 = 28;
pub const KEY_SPACE: u16 = 57;
pub const KEY_LEFTSHIFT: u16 = 42;
pub const KEY_RIGHTSHIFT: u16 = 54;
pub const KEY_SCROLLLOCK: u16 = 70;
pub const BTN_LEFT: u16 = 272;

pub const UP: i32 = 0;
pub const DOWN: i32 = 1;
pub const REPEAT: i32 = 2;

// --- Event helpers ---

/// Shorthand for a replay event.
pub fn ev(code: u16, value: i32) -> KeyEvent {
    KeyEvent::new(code, value)
}

/// A down+up pair for `code`, the shape every replayed non-shift key and
/// every backspace takes.
pub fn tap(code: u16) -> [KeyEvent; 2] {
    [KeyEvent::new(code, DOWN), KeyEvent::new(code, UP)]
}

/// Pushes a `(code, value)` sequence without evaluating the matcher.
pub fn push_seq(conv: &mut Converter, events: &[(u16, i32)]) {
    for &(code, value) in events {
        conv.push(code, value);
    }
}

/// Pushes a sequence the way the daemon does, evaluating the matcher
/// after every event, and returns the last action it produced.
pub fn drive(conv: &mut Converter, events: &[(u16, i32)]) -> Option<Action> {
    let mut action = None;
    for &(code, value) in events {
        conv.push(code, value);
        if let Some(a) = conv.process() {
            action = Some(a);
        }
    }
    action
}

/// The "press and release" event pair for typing one key.
pub fn typed(code: u16) -> [(u16, i32); 2] {
    [(code, DOWN), (code, UP)]
}

/// Flattens key taps into the event sequence of typing them in order.
pub fn typing(codes: &[u16]) -> Vec<(u16, i32)> {
    codes.iter().flat_map(|&code| typed(code)).collect()
}

/// A complete double tap of `shift`.
pub fn double_tap(shift: u16) -> [(u16, i32); 4] {
    [(shift, DOWN), (shift, UP), (shift, DOWN), (shift, UP)]
}
