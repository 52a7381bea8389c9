//! The conversion core: a rolling buffer of recently typed keys, the
//! trigger matcher that decides when the user asked for a layout fix, and
//! the replay generator that undoes and retypes the affected text.
//!
//! The buffer holds `(code, value)` pairs only; no character or layout
//! knowledge exists here. Text keys are normalised to a single DOWN entry
//! per keystroke, shift keys are recorded verbatim (their DOWN and UP
//! matter to the trigger templates), and anything that moves the cursor or
//! focus invalidates the whole buffer.


use std::borrow::Cow;

use input_linux_sys as sys;

use crate::keys;

pub const KEY_UP: i32 = 0;
pub const KEY_DOWN: i32 = 1;
pub const KEY_REPEAT: i32 = 2;

pub const KEY_BACKSPACE: u16 = sys::KEY_BACKSPACE as u16;
pub const KEY_SPACE: u16 = sys::KEY_SPACE as u16;
pub const KEY_ENTER: u16 = sys::KEY_ENTER as u16;
pub const KEY_KPENTER: u16 = sys::KEY_KPENTER as u16;
pub const KEY_LEFTSHIFT: u16 = sys::KEY_LEFTSHIFT as u16;
pub const KEY_RIGHTSHIFT: u16 = sys::KEY_RIGHTSHIFT as u16;

/// Character-producing keys. Anything here is worth buffering and
/// replaying; the set mirrors the main block plus the numpad.
const TEXT_KEYS: &[u16] = &[
    sys::KEY_1 as u16,
    sys::KEY_2 as u16,
    sys::KEY_3 as u16,
    sys::KEY_4 as u16,
    sys::KEY_5 as u16,
    sys::KEY_6 as u16,
    sys::KEY_7 as u16,
    sys::KEY_8 as u16,
    sys::KEY_9 as u16,
    sys::KEY_0 as u16,
    sys::KEY_MINUS as u16,
    sys::KEY_EQUAL as u16,
    sys::KEY_Q as u16,
    sys::KEY_W as u16,
    sys::KEY_E as u16,
    sys::KEY_R as u16,
    sys::KEY_T as u16,
    sys::KEY_Y as u16,
    sys::KEY_U as u16,
    sys::KEY_I as u16,
    sys::KEY_O as u16,
    sys::KEY_P as u16,
    sys::KEY_LEFTBRACE as u16,
    sys::KEY_RIGHTBRACE as u16,
    sys::KEY_A as u16,
    sys::KEY_S as u16,
    sys::KEY_D as u16,
    sys::KEY_F as u16,
    sys::KEY_G as u16,
    sys::KEY_H as u16,
    sys::KEY_J as u16,
    sys::KEY_K as u16,
    sys::KEY_L as u16,
    sys::KEY_SEMICOLON as u16,
    sys::KEY_APOSTROPHE as u16,
    sys::KEY_GRAVE as u16,
    sys::KEY_BACKSLASH as u16,
    sys::KEY_Z as u16,
    sys::KEY_X as u16,
    sys::KEY_C as u16,
    sys::KEY_V as u16,
    sys::KEY_B as u16,
    sys::KEY_N as u16,
    sys::KEY_M as u16,
    sys::KEY_COMMA as u16,
    sys::KEY_DOT as u16,
    sys::KEY_SLASH as u16,
    sys::KEY_KPASTERISK as u16,
    sys::KEY_SPACE as u16,
    sys::KEY_KP7 as u16,
    sys::KEY_KP8 as u16,
    sys::KEY_KP9 as u16,
    sys::KEY_KPMINUS as u16,
    sys::KEY_KP4 as u16,
    sys::KEY_KP5 as u16,
    sys::KEY_KP6 as u16,
    sys::KEY_KPPLUS as u16,
    sys::KEY_KP1 as u16,
    sys::KEY_KP2 as u16,
    sys::KEY_KP3 as u16,
    sys::KEY_KP0 as u16,
    sys::KEY_KPDOT as u16,
    sys::KEY_KPSLASH as u16,
    sys::KEY_ENTER as u16,
    sys::KEY_KPENTER as u16,
];

const SHIFT_KEYS: &[u16] = &[sys::KEY_LEFTSHIFT as u16, sys::KEY_RIGHTSHIFT as u16];

/// Keys whose press means the user has left the current run of text:
/// mouse buttons, modifiers, navigation. Any of these empties the buffer.
const BUFFER_KILLERS: &[u16] = &[
    sys::BTN_LEFT as u16,
    sys::BTN_RIGHT as u16,
    sys::BTN_MIDDLE as u16,
    sys::KEY_TAB as u16,
    sys::KEY_LEFTCTRL as u16,
    sys::KEY_LEFTALT as u16,
    sys::KEY_RIGHTCTRL as u16,
    sys::KEY_RIGHTALT as u16,
    sys::KEY_HOME as u16,
    sys::KEY_UP as u16,
    sys::KEY_PAGEUP as u16,
    sys::KEY_LEFT as u16,
    sys::KEY_RIGHT as u16,
    sys::KEY_END as u16,
    sys::KEY_DOWN as u16,
    sys::KEY_PAGEDOWN as u16,
    sys::KEY_INSERT as u16,
];

pub fn is_text_key(code: u16) -> bool {
    TEXT_KEYS.contains(&code)
}

pub fn is_shift(code: u16) -> bool {
    SHIFT_KEYS.contains(&code)
}

pub fn is_killer(code: u16) -> bool {
    BUFFER_KILLERS.contains(&code)
}

/// One buffered or replayed key event.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct KeyEvent {
    pub code: u16,
    pub value: i32,
}

impl KeyEvent {
    pub const fn new(code: u16, value: i32) -> Self {
        KeyEvent { code, value }
    }
}

/// What the trigger matcher decided.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Action {
    /// Convert the last word only.
    ConvertWord,
    /// Convert everything back to the previous line break.
    ConvertAll,
}

/// Code selector of a template entry. `AnyShift` matches either shift key
/// without colliding with the numeric code space.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum CodeSel {
    Code(u16),
    AnyShift,
}

/// One entry of a trigger template. `expect` is the required outcome of
/// the match predicate, so an entry can demand that an event does *not*
/// look like, say, a held shift.
#[derive(Clone, Copy, Debug)]
struct Pattern {
    sel: CodeSel,
    value: i32,
    expect: bool,
}

const fn pat(sel: CodeSel, value: i32, expect: bool) -> Pattern {
    Pattern { sel, value, expect }
}

/// Double tap of a shift key, with no other shift already held: the entry
/// before the two taps must not be a shift press.
const DOUBLE_SHIFT_WORD: [Pattern; 5] = [
    pat(CodeSel::AnyShift, KEY_DOWN, false),
    pat(CodeSel::AnyShift, KEY_DOWN, true),
    pat(CodeSel::AnyShift, KEY_UP, true),
    pat(CodeSel::AnyShift, KEY_DOWN, true),
    pat(CodeSel::AnyShift, KEY_UP, true),
];

/// One shift held while the other is double-tapped, then released.
const DOUBLE_SHIFT_ALL: [Pattern; 6] = [
    pat(CodeSel::AnyShift, KEY_DOWN, true),
    pat(CodeSel::AnyShift, KEY_DOWN, true),
    pat(CodeSel::AnyShift, KEY_UP, true),
    pat(CodeSel::AnyShift, KEY_DOWN, true),
    pat(CodeSel::AnyShift, KEY_UP, true),
    pat(CodeSel::AnyShift, KEY_UP, true),
];

/// The rolling buffer plus trigger configuration.
///
/// `conv_key == 0` selects the default double-shift trigger; otherwise
/// `conv_key` is the dedicated trigger key. `ls_keys` is the layout-switch
/// shortcut; a zero second element means a single-key shortcut.
pub struct Converter {
    buffer: Vec<KeyEvent>,
    pub conv_key: u16,
    pub ls_keys: [u16; 2],
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter {
    #[must_use]
    pub fn new() -> Self {
        Converter {
            buffer: Vec::new(),
            conv_key: 0,
            ls_keys: [0, 0],
        }
    }

    /// Feeds one key event into the buffer.
    ///
    /// Rules apply in order; the first match wins:
    /// 1. buffer killer: clear everything;
    /// 2. the configured trigger key: recorded verbatim, repeats dropped;
    /// 3. shift: recorded verbatim (down, up and repeat);
    /// 4. backspace press: remove the most recent non-shift entry;
    /// 5. text key press/repeat: recorded as a single DOWN entry.
    ///
    /// Everything else is discarded.
    pub fn push(&mut self, code: u16, value: i32) {
        if is_killer(code) {
            self.buffer.clear();
            return;
        }

        if self.conv_key != 0 && code == self.conv_key && value != KEY_REPEAT {
            self.buffer.push(KeyEvent::new(code, value));
            return;
        }

        if is_shift(code) {
            self.buffer.push(KeyEvent::new(code, value));
            return;
        }

        if code == KEY_BACKSPACE && value != KEY_UP {
            if let Some(i) = self.buffer.iter().rposition(|ev| !is_shift(ev.code)) {
                self.buffer.remove(i);
            }
            return;
        }

        if is_text_key(code) && value != KEY_UP {
            self.buffer.push(KeyEvent::new(code, KEY_DOWN));
        }
    }

    /// Checks the buffer tail against the trigger catalogue. On a match
    /// the trigger's own footprint is trimmed off the tail and the action
    /// is returned.
    pub fn process(&mut self) -> Option<Action> {
        if self.buffer.is_empty() {
            return None;
        }

        if self.conv_key == 0 {
            if self.matches_tail(&DOUBLE_SHIFT_WORD) {
                self.trim_buffer();
                return Some(Action::ConvertWord);
            }
            if self.matches_tail(&DOUBLE_SHIFT_ALL) {
                self.trim_buffer();
                return Some(Action::ConvertAll);
            }
        } else {
            let trigger = CodeSel::Code(self.conv_key);

            // Trigger tapped with no shift held just before it.
            let word = [
                pat(CodeSel::AnyShift, KEY_DOWN, false),
                pat(trigger, KEY_DOWN, true),
                pat(trigger, KEY_UP, true),
            ];
            if self.matches_tail(&word) {
                self.trim_buffer();
                return Some(Action::ConvertWord);
            }

            // Shift held across the trigger tap.
            let all_shift_held = [
                pat(CodeSel::AnyShift, KEY_DOWN, true),
                pat(trigger, KEY_DOWN, true),
                pat(trigger, KEY_UP, true),
                pat(CodeSel::AnyShift, KEY_UP, true),
            ];
            if self.matches_tail(&all_shift_held) {
                self.trim_buffer();
                return Some(Action::ConvertAll);
            }

            // Shift released between trigger press and release.
            let all_shift_released = [
                pat(CodeSel::AnyShift, KEY_DOWN, true),
                pat(trigger, KEY_DOWN, true),
                pat(CodeSel::AnyShift, KEY_UP, true),
                pat(trigger, KEY_UP, true),
            ];
            if self.matches_tail(&all_shift_released) {
                self.trim_buffer();
                return Some(Action::ConvertAll);
            }
        }

        None
    }

    /// Builds the replay program for `action` from the current buffer.
    ///
    /// The output is: the layout-switch shortcut, a backspace pair per
    /// non-shift entry in the affected region, then the region replayed
    /// with an UP synthesised after every non-shift entry. The buffer is
    /// not modified; calling this twice yields the same program.
    #[must_use]
    pub fn convert(&self, action: Action) -> Vec<KeyEvent> {
        let mut out = Vec::new();

        out.push(KeyEvent::new(self.ls_keys[0], KEY_DOWN));
        out.push(KeyEvent::new(self.ls_keys[0], KEY_UP));
        if self.ls_keys[1] != 0 {
            out.push(KeyEvent::new(self.ls_keys[1], KEY_DOWN));
            out.push(KeyEvent::new(self.ls_keys[1], KEY_UP));
        }

        // For a word, spaces bound the region; for a whole line only
        // enters do.
        let separators: &[u16] = match action {
            Action::ConvertWord => &[KEY_SPACE, KEY_ENTER, KEY_KPENTER],
            Action::ConvertAll => &[KEY_ENTER, KEY_KPENTER],
        };

        // Walk back over trailing separators, then to the previous
        // separator (or the buffer start); the region begins just past it.
        let mut start = self.buffer.len();
        while start > 0 && separators.contains(&self.buffer[start - 1].code) {
            start -= 1;
        }
        while start > 0 && !separators.contains(&self.buffer[start - 1].code) {
            start -= 1;
        }

        for ev in &self.buffer[start..] {
            if !is_shift(ev.code) {
                out.push(KeyEvent::new(KEY_BACKSPACE, KEY_DOWN));
                out.push(KeyEvent::new(KEY_BACKSPACE, KEY_UP));
            }
        }

        for ev in &self.buffer[start..] {
            out.push(*ev);
            if !is_shift(ev.code) {
                out.push(KeyEvent::new(ev.code, KEY_UP));
            }
        }

        out
    }

    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Renders the buffer as `<KEY_NAME STATE>` tokens for diagnostics.
    #[must_use]
    pub fn buffer_dump(&self) -> String {
        if self.buffer.is_empty() {
            return "(empty)".to_string();
        }

        let mut out = String::new();
        for ev in &self.buffer {
            let name: Cow<'_, str> = keys::key_name(ev.code);
            let state: Cow<'_, str> = keys::key_state_name(ev.value);
            out.push('<');
            out.push_str(&name);
            out.push(' ');
            out.push_str(&state);
            out.push('>');
        }
        out
    }

    /// Compares the last `pattern.len()` buffered events with a template.
    /// Each entry's predicate (code selector and value both match) must
    /// evaluate to that entry's `expect`.
    fn matches_tail(&self, pattern: &[Pattern]) -> bool {
        if self.buffer.len() < pattern.len() {
            return false;
        }

        let tail = &self.buffer[self.buffer.len() - pattern.len()..];
        tail.iter().zip(pattern).all(|(ev, p)| {
            let code_matches = match p.sel {
                CodeSel::AnyShift => is_shift(ev.code),
                CodeSel::Code(code) => ev.code == code,
            };
            (code_matches && ev.value == p.value) == p.expect
        })
    }

    /// Removes the trigger's own events from the tail so they cannot
    /// re-match, popping until a text key is on top. The exception: a shift
    /// release directly above a text key stays, so a replayed trailing
    /// capital keeps its balancing shift-up.
    fn trim_buffer(&mut self) {
        while let Some(last) = self.buffer.last() {
            if is_text_key(last.code) {
                break;
            }
            if is_shift(last.code) && last.value == KEY_UP {
                let len = self.buffer.len();
                if len > 1 && is_text_key(self.buffer[len - 2].code) {
                    break;
                }
            }
            self.buffer.pop();
        }
    }

    /// Current buffer contents, oldest first.
    #[must_use]
    pub fn events(&self) -> &[KeyEvent] {
        &self.buffer
    }
}
